//! Connection lifecycle for one sensor.

use ridgeline_core::{Error, Result, SensorConfig};
use ridgeline_hardware::{CharBuffer, Connector, FingerprintDriver};
use tracing::{debug, info, warn};

/// One authenticated connection to a sensor, scoped to a single operation.
///
/// # Connection Lifecycle
///
/// 1. Create with [`new`](Self::new) (not connected).
/// 2. [`connect`](Self::connect): open the transport and verify the password.
/// 3. Hand `&mut session` to exactly one workflow.
/// 4. [`disconnect`](Self::disconnect), or just drop the session.
///
/// Workflows borrow the session mutably, so only one capture or command can
/// be in flight on it at a time.
///
/// # Examples
///
/// ```
/// use ridgeline_biometric::SensorSession;
/// use ridgeline_core::SensorConfig;
/// use ridgeline_hardware::mock::MockConnector;
///
/// # #[tokio::main]
/// # async fn main() -> ridgeline_core::Result<()> {
/// let (connector, handle) = MockConnector::new();
///
/// let mut session = SensorSession::new(SensorConfig::new("sim"));
/// session.connect(&connector).await?;
/// assert!(session.is_authenticated());
///
/// session.disconnect();
/// session.disconnect();
/// assert_eq!(handle.close_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct SensorSession<D: FingerprintDriver> {
    config: SensorConfig,
    driver: Option<D>,
    authenticated: bool,
    loaded: [bool; 2],
    last_template_count: Option<u16>,
}

impl<D: FingerprintDriver> SensorSession<D> {
    pub fn new(config: SensorConfig) -> Self {
        Self {
            config,
            driver: None,
            authenticated: false,
            loaded: [false; 2],
            last_template_count: None,
        }
    }

    /// Create a session and connect it in one step.
    pub async fn open<C>(connector: &C, config: SensorConfig) -> Result<Self>
    where
        C: Connector<Driver = D>,
    {
        let mut session = Self::new(config);
        session.connect(connector).await?;
        Ok(session)
    }

    /// Open the transport and run the password handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the sensor configuration is invalid
    /// - [`Error::HardwareUnavailable`] if the port cannot be opened or the
    ///   sensor does not answer the handshake
    /// - [`Error::AuthenticationFailed`] if the sensor refuses the password
    pub async fn connect<C>(&mut self, connector: &C) -> Result<()>
    where
        C: Connector<Driver = D>,
    {
        if self.authenticated {
            return Ok(());
        }
        self.config.validate()?;
        self.disconnect();

        info!("Connecting to sensor on {}", self.config.port);
        let mut driver = connector
            .open(&self.config)
            .await
            .map_err(|e| Error::HardwareUnavailable(format!("{}: {}", self.config.port, e)))?;

        match driver.verify_password().await {
            Ok(true) => {
                debug!("Sensor on {} authenticated", self.config.port);
                self.driver = Some(driver);
                self.authenticated = true;
                Ok(())
            }
            Ok(false) => {
                warn!("Sensor on {} rejected the password", self.config.port);
                driver.close();
                Err(Error::AuthenticationFailed)
            }
            Err(e) => {
                warn!("Handshake with {} failed: {}", self.config.port, e);
                driver.close();
                Err(Error::HardwareUnavailable(format!(
                    "{}: no answer to handshake ({})",
                    self.config.port, e
                )))
            }
        }
    }

    /// Release the transport. Safe to call any number of times, including on
    /// a session that never connected.
    pub fn disconnect(&mut self) {
        self.release_buffers();
        self.authenticated = false;
        if let Some(mut driver) = self.driver.take() {
            driver.close();
            info!("Disconnected from sensor on {}", self.config.port);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.driver.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// The authenticated driver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HardwareUnavailable`] before a successful
    /// [`connect`](Self::connect).
    pub fn driver(&mut self) -> Result<&mut D> {
        match self.driver.as_mut() {
            Some(driver) if self.authenticated => Ok(driver),
            _ => Err(Error::HardwareUnavailable(format!(
                "Session for {} is not connected",
                self.config.port
            ))),
        }
    }

    pub(crate) fn mark_loaded(&mut self, buffer: CharBuffer) {
        self.loaded[buffer.index()] = true;
    }

    /// Characteristic buffers holding data from this session.
    pub fn loaded_buffers(&self) -> Vec<CharBuffer> {
        [CharBuffer::Primary, CharBuffer::Secondary]
            .into_iter()
            .filter(|buffer| self.loaded[buffer.index()])
            .collect()
    }

    /// Forget whatever the characteristic buffers hold.
    pub fn release_buffers(&mut self) {
        if self.loaded.iter().any(|loaded| *loaded) {
            debug!("Releasing characteristic buffers");
        }
        self.loaded = [false; 2];
    }

    pub(crate) fn record_template_count(&mut self, count: u16) {
        self.last_template_count = Some(count);
    }

    /// Template count from the last successful count query on this session.
    pub fn last_template_count(&self) -> Option<u16> {
        self.last_template_count
    }
}

impl<D: FingerprintDriver> Drop for SensorSession<D> {
    fn drop(&mut self) {
        if self.driver.is_some() {
            debug!("SensorSession dropped while connected - closing transport");
        }
        self.disconnect();
    }
}

impl<D: FingerprintDriver> std::fmt::Debug for SensorSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSession")
            .field("config", &self.config)
            .field("connected", &self.driver.is_some())
            .field("authenticated", &self.authenticated)
            .field("loaded", &self.loaded_buffers())
            .finish()
    }
}
