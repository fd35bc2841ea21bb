//! Scanner-wide configuration.

use ridgeline_core::constants::{
    ALLOCATION_CAPACITY, CAPTURE_POLL_INTERVAL_MS, DEFAULT_CAPTURE_TIMEOUT_SECS,
    DEFAULT_IMAGE_DIR, ENROLLMENT_SETTLE_DELAY_MS, PROBE_LOOKBACK, SCAN_CAPACITY,
};
use ridgeline_core::{Error, ProbeFaultPolicy, Result, SensorConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Everything a [`FingerprintScanner`](crate::FingerprintScanner) needs besides
/// the connector.
///
/// Built from an explicit [`SensorConfig`]; nothing here falls back to a
/// process-wide port.
///
/// # Examples
///
/// ```
/// use ridgeline_biometric::ScannerConfig;
/// use ridgeline_core::SensorConfig;
/// use std::time::Duration;
///
/// let config = ScannerConfig::new(SensorConfig::new("/dev/ttyUSB0"))
///     .with_capture_timeout(Duration::from_secs(5))
///     .with_slot_zero_fallback(false);
///
/// assert_eq!(config.allocation_capacity, 1000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub sensor: SensorConfig,

    /// How long a capture waits for a finger.
    pub capture_timeout: Duration,

    /// Pause between image polls.
    pub poll_interval: Duration,

    /// Pause between the two enrollment captures.
    pub settle_delay: Duration,

    /// Slots enrollment may allocate from, `[0, allocation_capacity)`.
    ///
    /// Also the range of the 1:N search, so it must not exceed the module's
    /// library size or every search is rejected as out of range.
    pub allocation_capacity: u16,

    /// Slots maintenance scans, `[0, scan_capacity)`.
    pub scan_capacity: u16,

    /// How far below the last known count slot probing starts.
    pub probe_lookback: u16,

    pub probe_fault_policy: ProbeFaultPolicy,

    /// Whether slot 0 is the last store candidate during enrollment.
    ///
    /// Slot 0 is written without checking it is free.
    pub allow_slot_zero_fallback: bool,

    /// Directory captured images are written to.
    pub images_dir: PathBuf,
}

impl ScannerConfig {
    pub fn new(sensor: SensorConfig) -> Self {
        Self {
            sensor,
            capture_timeout: Duration::from_secs(DEFAULT_CAPTURE_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(CAPTURE_POLL_INTERVAL_MS),
            settle_delay: Duration::from_millis(ENROLLMENT_SETTLE_DELAY_MS),
            allocation_capacity: ALLOCATION_CAPACITY,
            scan_capacity: SCAN_CAPACITY,
            probe_lookback: PROBE_LOOKBACK,
            probe_fault_policy: ProbeFaultPolicy::default(),
            allow_slot_zero_fallback: true,
            images_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
        }
    }

    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    /// Capture timeout in whole seconds, the unit operators use.
    pub fn with_capture_timeout_secs(self, secs: u64) -> Self {
        self.with_capture_timeout(Duration::from_secs(secs))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_allocation_capacity(mut self, capacity: u16) -> Self {
        self.allocation_capacity = capacity;
        self
    }

    pub fn with_scan_capacity(mut self, capacity: u16) -> Self {
        self.scan_capacity = capacity;
        self
    }

    pub fn with_probe_fault_policy(mut self, policy: ProbeFaultPolicy) -> Self {
        self.probe_fault_policy = policy;
        self
    }

    pub fn with_slot_zero_fallback(mut self, allow: bool) -> Self {
        self.allow_slot_zero_fallback = allow;
        self
    }

    pub fn with_images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.images_dir = dir.into();
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid sensor configuration, a zero
    /// poll interval or a zero capacity.
    pub fn validate(&self) -> Result<()> {
        self.sensor.validate()?;
        if self.poll_interval.is_zero() {
            return Err(Error::Config("Poll interval must be positive".to_string()));
        }
        if self.allocation_capacity == 0 || self.scan_capacity == 0 {
            return Err(Error::Config(format!(
                "Slot capacities must be positive (allocation {}, scan {})",
                self.allocation_capacity, self.scan_capacity
            )));
        }
        Ok(())
    }
}
