//! Error types for sensor driver operations.
//!
//! These errors describe what went wrong between the host and the sensor:
//! transport loss, malformed packets, unsupported primitives and non-zero
//! confirmation codes. Workflows never hand them to callers directly; the
//! `From<HardwareError> for ridgeline_core::Error` conversion normalizes
//! them at the workflow boundary.

use crate::types::ConfirmationCode;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to a fingerprint sensor.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The driver does not implement this primitive.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Device communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Transport could not be opened.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// The sensor answered with a non-zero confirmation code.
    #[error("{operation} rejected by sensor: {code}")]
    Rejected {
        operation: &'static str,
        code: ConfirmationCode,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Create a new rejection carrying the sensor's confirmation code.
    pub fn rejected(operation: &'static str, code: ConfirmationCode) -> Self {
        Self::Rejected { operation, code }
    }

    /// Confirmation code, if the sensor itself refused the request.
    pub fn confirmation_code(&self) -> Option<ConfirmationCode> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The sensor reported that no template exists at the addressed slot.
    pub fn is_empty_slot(&self) -> bool {
        self.confirmation_code() == Some(ConfirmationCode::INVALID_TEMPLATE)
    }

    /// The host lost (or never had) a working transport to the sensor.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. }
                | Self::Timeout { .. }
                | Self::InitializationFailed { .. }
                | Self::Io(_)
        )
    }
}

impl From<HardwareError> for ridgeline_core::Error {
    fn from(error: HardwareError) -> Self {
        if error.is_transport_failure() {
            Self::HardwareUnavailable(error.to_string())
        } else {
            Self::DeviceError(error.to_string())
        }
    }
}
