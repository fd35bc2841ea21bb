use super::R307Driver;
use crate::error::{HardwareError, Result};
use crate::traits::Connector;
use ridgeline_core::SensorConfig;
use serialport::SerialPort;
use std::time::Duration;
use tracing::info;

/// Default per-read timeout on the serial line.
///
/// Searches over a full database are the slowest command and finish well
/// inside this bound.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens the system serial port named in [`SensorConfig::port`].
#[derive(Debug, Clone)]
pub struct SerialConnector {
    read_timeout: Duration,
}

impl SerialConnector {
    pub fn new() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set how long a single read may wait before the sensor counts as silent.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for SerialConnector {
    type Driver = R307Driver<Box<dyn SerialPort>>;

    async fn open(&self, config: &SensorConfig) -> Result<Self::Driver> {
        info!("Opening {} at {} baud", config.port, config.baud_rate);
        let path = config.port.clone();
        let baud_rate = config.baud_rate;
        let timeout = self.read_timeout;

        let port = tokio::task::spawn_blocking(move || {
            serialport::new(path, baud_rate).timeout(timeout).open()
        })
        .await
        .map_err(|e| HardwareError::initialization_failed(e.to_string()))?
        .map_err(|e| {
            HardwareError::initialization_failed(format!("{}: {}", config.port, e))
        })?;

        Ok(R307Driver::new(port, config))
    }
}
