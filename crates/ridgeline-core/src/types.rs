use crate::{
    Result,
    constants::{DEFAULT_ADDRESS, DEFAULT_BAUD_RATE, DEFAULT_PASSWORD},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameters needed to reach and authenticate one physical sensor.
///
/// There is deliberately no default port: every session is built from an
/// explicit configuration value supplied by the caller.
///
/// # Examples
///
/// ```
/// use ridgeline_core::SensorConfig;
///
/// let config = SensorConfig::new("/dev/ttyUSB0")
///     .baud_rate(115_200)
///     .password(0x1234_5678);
///
/// assert_eq!(config.port, "/dev/ttyUSB0");
/// assert_eq!(config.address, 0xFFFF_FFFF);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Serial port identifier (e.g. `/dev/ttyUSB0`, `COM7`).
    pub port: String,

    /// Serial speed in bits per second.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// 32-bit module address.
    #[serde(default = "default_address")]
    pub address: u32,

    /// 32-bit handshake password.
    #[serde(default = "default_password")]
    pub password: u32,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_address() -> u32 {
    DEFAULT_ADDRESS
}

fn default_password() -> u32 {
    DEFAULT_PASSWORD
}

impl SensorConfig {
    /// Create a configuration for `port` with the factory defaults.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            address: DEFAULT_ADDRESS,
            password: DEFAULT_PASSWORD,
        }
    }

    /// Set the serial speed.
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the module address.
    pub fn address(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    /// Set the handshake password.
    pub fn password(mut self, password: u32) -> Self {
        self.password = password;
        self
    }

    /// Check the configuration before a transport is opened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the port is blank or the baud rate is
    /// not a multiple of 9600 (the only speeds the sensor family accepts).
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(Error::Config("Sensor port must not be empty".to_string()));
        }
        if self.baud_rate == 0 || self.baud_rate % 9_600 != 0 {
            return Err(Error::Config(format!(
                "Baud rate must be a non-zero multiple of 9600, got {}",
                self.baud_rate
            )));
        }
        Ok(())
    }
}

// The password stays out of logs.
impl fmt::Debug for SensorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorConfig")
            .field("port", &self.port)
            .field("baud_rate", &self.baud_rate)
            .field("address", &format_args!("{:#010X}", self.address))
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parse a 32-bit address or password written in decimal or `0x` hex.
///
/// # Examples
///
/// ```
/// use ridgeline_core::parse_u32_literal;
///
/// assert_eq!(parse_u32_literal("0xFFFFFFFF").unwrap(), u32::MAX);
/// assert_eq!(parse_u32_literal("42").unwrap(), 42);
/// assert!(parse_u32_literal("0xZZ").is_err());
/// ```
pub fn parse_u32_literal(input: &str) -> Result<u32> {
    let trimmed = input.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|_| Error::Config(format!("Invalid 32-bit value: {input}")))
}

/// What slot probing does when the sensor reports a fault that is not a
/// clean "no template here".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFaultPolicy {
    /// Count the slot as free, as the sensor tooling always has.
    #[default]
    TreatAsEmpty,
    /// Stop and surface the fault as a device error.
    Abort,
}

/// A template successfully written to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    /// Slot the merged template now occupies.
    pub slot: u16,

    /// The driver could not cross-match the two captures, so they were
    /// merged without verification.
    pub verification_skipped: bool,

    /// Cross-match score, when one was computed.
    pub match_score: Option<u16>,
}

/// Result of a 1:N search over the onboard database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// A stored template matched. `score` is always greater than zero.
    Found { slot: u16, score: u16 },
    /// No stored template matched.
    NotFound,
}

impl SearchOutcome {
    /// Matched slot, if any.
    pub fn slot(&self) -> Option<u16> {
        match self {
            Self::Found { slot, .. } => Some(*slot),
            Self::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

/// Database status report: count plus enumerated occupied slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatabaseStatus {
    /// Count reported by the sensor itself, `None` when the sensor cannot
    /// report one.
    pub template_count: Option<u16>,

    /// Sorted, duplicate-free list of slots that answered a probe.
    pub occupied: Vec<u16>,
}

impl DatabaseStatus {
    /// The sensor reported zero templates.
    pub fn is_empty(&self) -> bool {
        self.template_count == Some(0)
    }

    /// The enumerated slots disagree with the reported count.
    ///
    /// Happens when templates live above the scanned range. Without a count
    /// there is nothing to check the scan against.
    pub fn is_partial(&self) -> bool {
        self.template_count
            .is_some_and(|count| self.occupied.len() != usize::from(count))
    }
}
