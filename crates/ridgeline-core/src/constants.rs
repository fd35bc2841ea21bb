//! Device facts and reference defaults for R307-class fingerprint sensors.
//!
//! Values here describe the sensor family, not policy. Anything an operator
//! may want to change is exposed again through [`SensorConfig`] or the
//! scanner configuration, using these constants only as defaults.
//!
//! # Usage
//!
//! ```
//! use ridgeline_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(DEFAULT_BAUD_RATE, 57_600);
//! let poll = Duration::from_millis(CAPTURE_POLL_INTERVAL_MS);
//! assert!(poll < Duration::from_secs(DEFAULT_CAPTURE_TIMEOUT_SECS));
//! ```
//!
//! [`SensorConfig`]: crate::SensorConfig

// ============================================================================
// Connection
// ============================================================================

/// Serial speed the sensor ships with (9600 × 6).
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Broadcast module address accepted by every factory-fresh sensor.
pub const DEFAULT_ADDRESS: u32 = 0xFFFF_FFFF;

/// Factory handshake password.
pub const DEFAULT_PASSWORD: u32 = 0x0000_0000;

// ============================================================================
// Capture timing
// ============================================================================

/// Default deadline, in whole seconds, for a finger to be presented.
pub const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 10;

/// Interval between two "is an image ready" polls.
///
/// The sensor has no event-driven readiness signal, so captures are polled.
pub const CAPTURE_POLL_INTERVAL_MS: u64 = 100;

/// Pause between the two enrollment captures so the finger can be lifted.
pub const ENROLLMENT_SETTLE_DELAY_MS: u64 = 2_000;

// ============================================================================
// Template database
// ============================================================================

/// Slot range searched when allocating a slot for a new template.
pub const ALLOCATION_CAPACITY: u16 = 1_000;

/// Slot range scanned by maintenance operations (list, delete).
pub const SCAN_CAPACITY: u16 = 162;

/// How far below the last known template count the slot probe starts.
pub const PROBE_LOOKBACK: u16 = 10;

/// Position reported by a 1:N search when no template matched.
pub const NO_MATCH_POSITION: i32 = -1;

// ============================================================================
// Image export
// ============================================================================

/// Sensor image width in pixels.
pub const IMAGE_WIDTH: u16 = 256;

/// Sensor image height in pixels.
pub const IMAGE_HEIGHT: u16 = 288;

/// Directory captured images are written to unless configured otherwise.
pub const DEFAULT_IMAGE_DIR: &str = "Images";

/// File name prefix for exported captures.
pub const IMAGE_FILE_PREFIX: &str = "fingerprint_";

/// `chrono` format of the timestamp embedded in exported file names.
pub const IMAGE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Extension of exported captures.
pub const IMAGE_EXTENSION: &str = "bmp";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_range_fits_inside_allocation_range() {
        assert!(SCAN_CAPACITY <= ALLOCATION_CAPACITY);
        assert!(PROBE_LOOKBACK < SCAN_CAPACITY);
    }

    #[test]
    fn test_poll_interval_is_shorter_than_default_timeout() {
        assert!(CAPTURE_POLL_INTERVAL_MS < DEFAULT_CAPTURE_TIMEOUT_SECS * 1_000);
    }

    #[test]
    fn test_image_dimensions_match_sensor() {
        assert_eq!(u32::from(IMAGE_WIDTH) * u32::from(IMAGE_HEIGHT), 73_728);
    }
}
