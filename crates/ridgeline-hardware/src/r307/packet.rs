//! ZFM packet framing.
//!
//! Every packet on the wire has the same layout:
//!
//! ```text
//! ┌────────┬───────────┬─────┬────────┬───────────────┬──────────┐
//! │ EF 01  │ address×4 │ PID │ len×2  │ payload       │ sum×2    │
//! └────────┴───────────┴─────┴────────┴───────────────┴──────────┘
//! ```
//!
//! `len` counts the payload plus the two checksum bytes. The checksum is the
//! 16-bit wrapping sum of PID, both length bytes and every payload byte. All
//! multi-byte fields are big-endian.

use crate::error::{HardwareError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Read;

/// Start-of-packet marker.
pub const HEADER: u16 = 0xEF01;

/// Bytes before the payload: header, address, PID and length.
pub const PREAMBLE_LEN: usize = 9;

/// Largest payload the sensor ever sends (256-byte data packets).
pub const MAX_PAYLOAD_LEN: usize = 256;

/// Packet identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Command,
    Data,
    Ack,
    EndData,
}

impl PacketKind {
    pub fn id(self) -> u8 {
        match self {
            Self::Command => 0x01,
            Self::Data => 0x02,
            Self::Ack => 0x07,
            Self::EndData => 0x08,
        }
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = HardwareError;

    fn try_from(id: u8) -> Result<Self> {
        match id {
            0x01 => Ok(Self::Command),
            0x02 => Ok(Self::Data),
            0x07 => Ok(Self::Ack),
            0x08 => Ok(Self::EndData),
            other => Err(HardwareError::invalid_data(format!(
                "Unknown packet identifier {other:#04x}"
            ))),
        }
    }
}

/// Instruction codes of the command packets the driver sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    GenImg,
    Img2Tz,
    Match,
    Search,
    RegModel,
    Store,
    LoadChar,
    UpImage,
    DeleteChar,
    Empty,
    VfyPwd,
    TemplateNum,
}

impl Instruction {
    pub fn code(self) -> u8 {
        match self {
            Self::GenImg => 0x01,
            Self::Img2Tz => 0x02,
            Self::Match => 0x03,
            Self::Search => 0x04,
            Self::RegModel => 0x05,
            Self::Store => 0x06,
            Self::LoadChar => 0x07,
            Self::UpImage => 0x0A,
            Self::DeleteChar => 0x0C,
            Self::Empty => 0x0D,
            Self::VfyPwd => 0x13,
            Self::TemplateNum => 0x1D,
        }
    }
}

/// One framed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub address: u32,
    pub kind: PacketKind,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(address: u32, kind: PacketKind, payload: impl Into<Bytes>) -> Self {
        Self {
            address,
            kind,
            payload: payload.into(),
        }
    }

    /// Command packet: instruction code followed by its parameters.
    pub fn command(address: u32, instruction: Instruction, params: &[u8]) -> Self {
        let mut payload = BytesMut::with_capacity(1 + params.len());
        payload.put_u8(instruction.code());
        payload.put_slice(params);
        Self::new(address, PacketKind::Command, payload.freeze())
    }

    /// Value of the length field.
    pub fn length_field(&self) -> u16 {
        // Payload is bounded by MAX_PAYLOAD_LEN for everything we build or accept.
        (self.payload.len() + 2) as u16
    }

    pub fn checksum(&self) -> u16 {
        checksum(self.kind.id(), self.length_field(), &self.payload)
    }

    /// Serialize to wire format.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PREAMBLE_LEN + self.payload.len() + 2);
        buf.put_u16(HEADER);
        buf.put_u32(self.address);
        buf.put_u8(self.kind.id());
        buf.put_u16(self.length_field());
        buf.put_slice(&self.payload);
        buf.put_u16(self.checksum());
        buf.freeze()
    }

    /// Read exactly one packet from `reader`, verifying header and checksum.
    ///
    /// # Errors
    ///
    /// I/O errors (including read timeouts) pass through as
    /// [`HardwareError::Io`]; framing problems are
    /// [`HardwareError::InvalidData`].
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut preamble = [0u8; PREAMBLE_LEN];
        reader.read_exact(&mut preamble)?;

        let header = u16::from_be_bytes([preamble[0], preamble[1]]);
        if header != HEADER {
            return Err(HardwareError::invalid_data(format!(
                "Bad packet header {header:#06x}"
            )));
        }
        let address = u32::from_be_bytes([preamble[2], preamble[3], preamble[4], preamble[5]]);
        let kind = PacketKind::try_from(preamble[6])?;
        let length = u16::from_be_bytes([preamble[7], preamble[8]]);

        let length_usize = usize::from(length);
        if !(2..=MAX_PAYLOAD_LEN + 2).contains(&length_usize) {
            return Err(HardwareError::invalid_data(format!(
                "Packet length {length} out of range"
            )));
        }

        let mut body = vec![0u8; length_usize];
        reader.read_exact(&mut body)?;
        let received = u16::from_be_bytes([body[length_usize - 2], body[length_usize - 1]]);
        body.truncate(length_usize - 2);

        let expected = checksum(kind.id(), length, &body);
        if received != expected {
            return Err(HardwareError::invalid_data(format!(
                "Checksum mismatch: expected {expected:#06x}, got {received:#06x}"
            )));
        }

        Ok(Self::new(address, kind, body))
    }
}

fn checksum(kind: u8, length: u16, payload: &[u8]) -> u16 {
    let [hi, lo] = length.to_be_bytes();
    payload
        .iter()
        .chain([kind, hi, lo].iter())
        .fold(0u16, |sum, byte| sum.wrapping_add(u16::from(*byte)))
}
