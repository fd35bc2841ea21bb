//! Common types shared by every sensor driver.
//!
//! These are the values that cross the driver seam: buffer identifiers,
//! confirmation codes, capability sets, slot occupancy and raw search hits.

use crate::error::{HardwareError, Result};
use ridgeline_core::constants::NO_MATCH_POSITION;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two device-side characteristic buffers.
///
/// Enrollment converts the first capture into `Primary` and the second into
/// `Secondary`; merging leaves the combined template in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharBuffer {
    /// CharBuffer1.
    Primary,
    /// CharBuffer2.
    Secondary,
}

impl CharBuffer {
    /// Buffer id as it appears on the wire.
    pub fn id(self) -> u8 {
        match self {
            Self::Primary => 0x01,
            Self::Secondary => 0x02,
        }
    }

    /// Zero-based index, for host-side bookkeeping arrays.
    pub fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }
}

/// Status byte carried by every acknowledge packet.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfirmationCode(pub u8);

impl ConfirmationCode {
    pub const OK: Self = Self(0x00);
    pub const PACKET_RECEIVE_ERROR: Self = Self(0x01);
    pub const NO_FINGER: Self = Self(0x02);
    pub const IMAGE_CAPTURE_FAILED: Self = Self(0x03);
    pub const IMAGE_MESSY: Self = Self(0x06);
    pub const TOO_FEW_FEATURES: Self = Self(0x07);
    pub const NO_MATCH: Self = Self(0x08);
    pub const NOT_FOUND: Self = Self(0x09);
    pub const COMBINE_FAILED: Self = Self(0x0A);
    pub const ADDRESS_OUT_OF_RANGE: Self = Self(0x0B);
    pub const INVALID_TEMPLATE: Self = Self(0x0C);
    pub const UPLOAD_TEMPLATE_FAILED: Self = Self(0x0D);
    pub const PACKET_RESPONSE_FAILED: Self = Self(0x0E);
    pub const UPLOAD_IMAGE_FAILED: Self = Self(0x0F);
    pub const DELETE_FAILED: Self = Self(0x10);
    pub const CLEAR_FAILED: Self = Self(0x11);
    pub const WRONG_PASSWORD: Self = Self(0x13);
    pub const INVALID_IMAGE: Self = Self(0x15);
    pub const FLASH_WRITE_ERROR: Self = Self(0x18);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    /// Human-readable meaning of the code.
    pub fn description(self) -> &'static str {
        match self.0 {
            0x00 => "ok",
            0x01 => "error receiving packet",
            0x02 => "no finger on sensor",
            0x03 => "failed to capture image",
            0x06 => "image too disordered",
            0x07 => "too few feature points",
            0x08 => "characteristics do not match",
            0x09 => "no matching template",
            0x0A => "failed to combine characteristics",
            0x0B => "slot out of range",
            0x0C => "invalid or missing template",
            0x0D => "failed to upload template",
            0x0E => "cannot receive data packets",
            0x0F => "failed to upload image",
            0x10 => "failed to delete template",
            0x11 => "failed to clear database",
            0x13 => "wrong password",
            0x15 => "no valid image in buffer",
            0x18 => "error writing flash",
            _ => "unknown error",
        }
    }

    /// Turn a non-OK code into a [`HardwareError::Rejected`].
    pub fn into_result(self, operation: &'static str) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(HardwareError::rejected(operation, self))
        }
    }
}

impl fmt::Display for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} ({})", self.0, self.description())
    }
}

impl fmt::Debug for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfirmationCode({:#04x})", self.0)
    }
}

/// Primitives a driver may or may not implement.
///
/// Workflows consult this instead of probing for missing methods at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverCapabilities {
    /// `compare_characteristics` is available.
    pub cross_match: bool,

    /// `template_count` is available.
    pub template_count: bool,
}

impl DriverCapabilities {
    /// Every primitive available.
    pub const FULL: Self = Self {
        cross_match: true,
        template_count: true,
    };
}

impl Default for DriverCapabilities {
    fn default() -> Self {
        Self::FULL
    }
}

/// Three-way answer to "is there a template in this slot?".
#[derive(Debug)]
pub enum SlotOccupancy {
    Occupied,
    Empty,
    /// The probe failed for a reason other than an empty slot.
    Fault(HardwareError),
}

impl SlotOccupancy {
    pub fn is_occupied(&self) -> bool {
        matches!(self, Self::Occupied)
    }
}

/// Raw `(position, score)` pair returned by the sensor's 1:N search.
///
/// `position == -1` is the sensor's own "no match" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub position: i32,
    pub score: u16,
}

impl SearchHit {
    pub fn new(position: i32, score: u16) -> Self {
        Self { position, score }
    }

    /// The sentinel hit for "nothing matched".
    pub fn no_match() -> Self {
        Self {
            position: NO_MATCH_POSITION,
            score: 0,
        }
    }

    pub fn is_no_match(&self) -> bool {
        self.position == NO_MATCH_POSITION
    }
}

/// 8-bit grayscale image downloaded from the sensor's image buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct FingerprintImage {
    width: u16,
    height: u16,
    pixels: Vec<u8>,
}

impl FingerprintImage {
    /// Wrap row-major pixels, top row first.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::InvalidData`] if `pixels` does not hold
    /// exactly `width * height` bytes.
    pub fn new(width: u16, height: u16, pixels: Vec<u8>) -> Result<Self> {
        let expected = usize::from(width) * usize::from(height);
        if pixels.len() != expected {
            return Err(HardwareError::invalid_data(format!(
                "Image of {width}x{height} needs {expected} pixels, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Expand the sensor's packed 4-bit pixels (two per byte, high nibble
    /// first) into 8-bit grayscale.
    pub fn from_packed_nibbles(width: u16, height: u16, packed: &[u8]) -> Result<Self> {
        let pixels = packed
            .iter()
            .flat_map(|byte| [(byte >> 4) * 17, (byte & 0x0F) * 17])
            .collect();
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixels of row `y`, top row is 0.
    pub fn row(&self, y: u16) -> &[u8] {
        let width = usize::from(self.width);
        let start = usize::from(y) * width;
        &self.pixels[start..start + width]
    }
}

impl fmt::Debug for FingerprintImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerprintImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels", &self.pixels.len())
            .finish()
    }
}
