//! Enum wrappers for sensor dispatch.
//!
//! Native `async fn` in traits are not object-safe, so a driver picked at
//! runtime (real serial port or simulator) cannot live behind
//! `Box<dyn FingerprintDriver>`. These enums forward each call to the
//! concrete type instead.
//!
//! # Examples
//!
//! ```
//! use ridgeline_core::SensorConfig;
//! use ridgeline_hardware::devices::AnyConnector;
//! use ridgeline_hardware::mock::MockConnector;
//! use ridgeline_hardware::traits::{Connector, FingerprintDriver};
//!
//! #[tokio::main]
//! async fn main() -> ridgeline_hardware::Result<()> {
//!     let (connector, _handle) = MockConnector::new();
//!     let connector = AnyConnector::Mock(connector);
//!
//!     let mut driver = connector.open(&SensorConfig::new("sim")).await?;
//!     assert!(driver.verify_password().await?);
//!     Ok(())
//! }
//! ```

use crate::error::Result;
use crate::mock::{MockConnector, MockSensor};
#[cfg(feature = "hardware-serial")]
use crate::r307::{R307Driver, SerialConnector};
use crate::traits::{Connector, FingerprintDriver};
use crate::types::{CharBuffer, DriverCapabilities, FingerprintImage, SearchHit, SlotOccupancy};
use ridgeline_core::SensorConfig;

/// Any supported sensor driver.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnySensorDriver {
    /// R307 on a system serial port.
    #[cfg(feature = "hardware-serial")]
    Serial(R307Driver<Box<dyn serialport::SerialPort>>),
    /// Simulated sensor for development and testing.
    Mock(MockSensor),
}

macro_rules! dispatch {
    ($self:ident, $driver:ident => $call:expr) => {
        match $self {
            #[cfg(feature = "hardware-serial")]
            Self::Serial($driver) => $call,
            Self::Mock($driver) => $call,
        }
    };
}

impl FingerprintDriver for AnySensorDriver {
    fn capabilities(&self) -> DriverCapabilities {
        dispatch!(self, driver => driver.capabilities())
    }

    async fn verify_password(&mut self) -> Result<bool> {
        dispatch!(self, driver => driver.verify_password().await)
    }

    async fn read_image(&mut self) -> Result<bool> {
        dispatch!(self, driver => driver.read_image().await)
    }

    async fn convert_image(&mut self, buffer: CharBuffer) -> Result<()> {
        dispatch!(self, driver => driver.convert_image(buffer).await)
    }

    async fn compare_characteristics(&mut self) -> Result<u16> {
        dispatch!(self, driver => driver.compare_characteristics().await)
    }

    async fn create_template(&mut self) -> Result<()> {
        dispatch!(self, driver => driver.create_template().await)
    }

    async fn store_template(&mut self, position: u16, buffer: CharBuffer) -> Result<()> {
        dispatch!(self, driver => driver.store_template(position, buffer).await)
    }

    async fn search_template(
        &mut self,
        buffer: CharBuffer,
        start: u16,
        count: u16,
    ) -> Result<SearchHit> {
        dispatch!(self, driver => driver.search_template(buffer, start, count).await)
    }

    async fn template_count(&mut self) -> Result<u16> {
        dispatch!(self, driver => driver.template_count().await)
    }

    async fn load_template(&mut self, position: u16, buffer: CharBuffer) -> Result<()> {
        dispatch!(self, driver => driver.load_template(position, buffer).await)
    }

    async fn delete_template(&mut self, position: u16) -> Result<()> {
        dispatch!(self, driver => driver.delete_template(position).await)
    }

    async fn clear_database(&mut self) -> Result<()> {
        dispatch!(self, driver => driver.clear_database().await)
    }

    async fn download_image(&mut self) -> Result<FingerprintImage> {
        dispatch!(self, driver => driver.download_image().await)
    }

    fn close(&mut self) {
        dispatch!(self, driver => driver.close())
    }

    async fn probe_slot(&mut self, position: u16, scratch: CharBuffer) -> SlotOccupancy {
        dispatch!(self, driver => driver.probe_slot(position, scratch).await)
    }
}

/// Any supported connector, producing an [`AnySensorDriver`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyConnector {
    #[cfg(feature = "hardware-serial")]
    Serial(SerialConnector),
    Mock(MockConnector),
}

impl Connector for AnyConnector {
    type Driver = AnySensorDriver;

    async fn open(&self, config: &SensorConfig) -> Result<AnySensorDriver> {
        match self {
            #[cfg(feature = "hardware-serial")]
            Self::Serial(connector) => connector.open(config).await.map(AnySensorDriver::Serial),
            Self::Mock(connector) => connector.open(config).await.map(AnySensorDriver::Mock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HardwareError;

    #[tokio::test]
    async fn test_mock_dispatch() {
        let (connector, handle) = MockConnector::new();
        handle.present_finger(vec![1, 2]);
        let connector = AnyConnector::Mock(connector);

        let mut driver = connector.open(&SensorConfig::new("sim")).await.unwrap();
        assert!(driver.verify_password().await.unwrap());
        assert!(driver.read_image().await.unwrap());
        assert_eq!(driver.capabilities(), DriverCapabilities::FULL);

        driver.close();
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_passes_through() {
        let (connector, handle) = MockConnector::new();
        handle.set_available(false);

        let result = AnyConnector::Mock(connector)
            .open(&SensorConfig::new("sim"))
            .await;
        assert!(matches!(result, Err(HardwareError::InitializationFailed { .. })));
    }
}
