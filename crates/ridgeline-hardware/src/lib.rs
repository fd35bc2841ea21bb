//! Sensor access layer for Ridgeline.
//!
//! This crate speaks to R307/ZFM-family fingerprint sensors. It knows nothing
//! about enrollment or slot allocation; it exposes the sensor's primitive
//! command set through the [`FingerprintDriver`] trait so the orchestration in
//! `ridgeline-biometric` can run against real hardware or a simulator.
//!
//! # Layout
//!
//! - [`traits`]: [`FingerprintDriver`] and [`Connector`].
//! - [`r307`]: packet codec and the serial driver (feature `hardware-serial`).
//! - [`mock`]: scriptable [`MockSensor`](mock::MockSensor) for tests and
//!   `--simulate` runs.
//! - [`devices`]: enum dispatch over the concrete drivers.
//!
//! # Error Handling
//!
//! Every primitive returns [`Result<T>`][error::Result] with a
//! [`HardwareError`]. Sensor rejections keep their confirmation code so callers
//! can tell an empty slot from a failing one. `HardwareError` converts into
//! [`ridgeline_core::Error`] at the orchestration boundary.
//!
//! ```no_run
//! use ridgeline_hardware::traits::FingerprintDriver;
//! use ridgeline_hardware::Result;
//!
//! async fn stored<D: FingerprintDriver>(driver: &mut D) -> Result<u16> {
//!     driver.template_count().await
//! }
//! ```

pub mod devices;
pub mod error;
pub mod mock;
pub mod r307;
pub mod traits;
pub mod types;

pub use devices::{AnyConnector, AnySensorDriver};
pub use error::{HardwareError, Result};
pub use traits::{Connector, FingerprintDriver};
pub use types::{
    CharBuffer, ConfirmationCode, DriverCapabilities, FingerprintImage, SearchHit, SlotOccupancy,
};
