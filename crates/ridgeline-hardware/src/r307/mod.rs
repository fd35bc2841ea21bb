//! Driver for R307/ZFM-family sensors speaking the packet protocol over a
//! serial line.
//!
//! ```text
//! R307Driver<T: Read + Write>
//!     │
//!     ├─> Packet::encode / Packet::read_from   (framing + checksum)
//!     │
//!     └─> spawn_blocking ──(T)──> sensor
//! ```
//!
//! The driver is generic over the transport so it can be exercised with an
//! in-memory byte stream; [`SerialConnector`] opens the real serial port.

mod driver;
pub mod packet;
#[cfg(feature = "hardware-serial")]
mod serial;

pub use driver::R307Driver;
pub use packet::{Instruction, Packet, PacketKind};
#[cfg(feature = "hardware-serial")]
pub use serial::SerialConnector;
