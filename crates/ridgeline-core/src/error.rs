use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced at the workflow boundary.
///
/// Every sensor-level fault is normalized into exactly one of these variants
/// before it reaches a caller. Callers match on the variant (or on
/// [`ErrorKind`]), never on the message text.
#[derive(Error, Debug)]
pub enum Error {
    // Connection
    #[error("Sensor unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("Sensor rejected the configured password")]
    AuthenticationFailed,

    // Capture
    #[error("No fingerprint captured within {timeout_ms}ms")]
    CaptureTimeout { timeout_ms: u64 },

    // Enrollment
    #[error("Enrollment captures do not match")]
    EnrollmentMismatch,

    #[error("No free template slot below {capacity}")]
    NoSlotAvailable { capacity: u16 },

    #[error("Template could not be stored, slots tried: {attempted:?}")]
    EnrollmentStoreFailed { attempted: Vec<u16> },

    // Maintenance
    #[error("No template stored at slot {0}")]
    SlotNotFound(u16),

    // Anything else the sensor reports
    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Image store error: {0}")]
    ImageStore(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Field-less mirror of [`Error`], convenient for reporting and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    HardwareUnavailable,
    AuthenticationFailed,
    CaptureTimeout,
    EnrollmentMismatch,
    NoSlotAvailable,
    EnrollmentStoreFailed,
    SlotNotFound,
    DeviceError,
    ImageStore,
    Config,
}

/// How an outer layer should present a failure to its own client.
///
/// The core never maps errors to transport status codes itself; it only
/// guarantees every error falls into one of these buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// The sensor or host cannot serve the request right now.
    ServiceUnavailable,
    /// Same request may succeed if simply resubmitted.
    ClientRetryable,
    /// The request itself needs to change (different finger, slot, input).
    ClientCorrectable,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HardwareUnavailable(_) => ErrorKind::HardwareUnavailable,
            Self::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            Self::CaptureTimeout { .. } => ErrorKind::CaptureTimeout,
            Self::EnrollmentMismatch => ErrorKind::EnrollmentMismatch,
            Self::NoSlotAvailable { .. } => ErrorKind::NoSlotAvailable,
            Self::EnrollmentStoreFailed { .. } => ErrorKind::EnrollmentStoreFailed,
            Self::SlotNotFound(_) => ErrorKind::SlotNotFound,
            Self::DeviceError(_) => ErrorKind::DeviceError,
            Self::ImageStore(_) => ErrorKind::ImageStore,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub fn disposition(&self) -> Disposition {
        self.kind().disposition()
    }
}

impl ErrorKind {
    pub fn disposition(self) -> Disposition {
        match self {
            Self::CaptureTimeout => Disposition::ClientRetryable,
            Self::EnrollmentMismatch | Self::SlotNotFound | Self::Config => {
                Disposition::ClientCorrectable
            }
            Self::HardwareUnavailable
            | Self::AuthenticationFailed
            | Self::NoSlotAvailable
            | Self::EnrollmentStoreFailed
            | Self::DeviceError
            | Self::ImageStore => Disposition::ServiceUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Error::HardwareUnavailable("no port".into()), Disposition::ServiceUnavailable)]
    #[case(Error::DeviceError("flash".into()), Disposition::ServiceUnavailable)]
    #[case(Error::CaptureTimeout { timeout_ms: 1_000 }, Disposition::ClientRetryable)]
    #[case(Error::EnrollmentMismatch, Disposition::ClientCorrectable)]
    #[case(Error::SlotNotFound(4), Disposition::ClientCorrectable)]
    fn test_disposition_contract(#[case] error: Error, #[case] expected: Disposition) {
        assert_eq!(error.disposition(), expected);
    }

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(
            Error::NoSlotAvailable { capacity: 1000 }.kind(),
            ErrorKind::NoSlotAvailable
        );
        assert_eq!(
            Error::EnrollmentStoreFailed { attempted: vec![5, 6, 0] }.kind(),
            ErrorKind::EnrollmentStoreFailed
        );
        assert_eq!(Error::AuthenticationFailed.kind(), ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::CaptureTimeout { timeout_ms: 2_000 }.to_string(),
            "No fingerprint captured within 2000ms"
        );
        assert_eq!(
            Error::EnrollmentStoreFailed { attempted: vec![5, 6, 0] }.to_string(),
            "Template could not be stored, slots tried: [5, 6, 0]"
        );
        assert_eq!(Error::SlotNotFound(7).to_string(), "No template stored at slot 7");
    }

    #[test]
    fn test_io_error_converts_to_image_store() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let error: Error = io.into();
        assert_eq!(error.kind(), ErrorKind::ImageStore);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::CaptureTimeout).unwrap();
        assert_eq!(json, "\"capture_timeout\"");
    }
}
