//! Sensor driver trait definitions.
//!
//! [`FingerprintDriver`] is the seam between the orchestration layer and the
//! code that actually frames packets for a sensor. Each method maps to one
//! primitive of the sensor's command set; none of them block waiting for a
//! finger. [`Connector`] opens a transport and hands back a driver.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use crate::error::{HardwareError, Result};
use crate::types::{CharBuffer, DriverCapabilities, FingerprintImage, SearchHit, SlotOccupancy};
use ridgeline_core::SensorConfig;

/// Primitive command set of an R307-class fingerprint sensor.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. Use generic type parameters, or the enum wrapper in
/// [`devices`](crate::devices) when the concrete driver is chosen at runtime.
///
/// # Capabilities
///
/// Drivers that lack a primitive return [`HardwareError::Unsupported`] from it
/// and say so up front through [`capabilities`](Self::capabilities).
///
/// # Examples
///
/// ```no_run
/// use ridgeline_hardware::traits::FingerprintDriver;
/// use ridgeline_hardware::types::CharBuffer;
/// use ridgeline_hardware::error::Result;
///
/// async fn identify<D: FingerprintDriver>(driver: &mut D) -> Result<Option<u16>> {
///     while !driver.read_image().await? {}
///     driver.convert_image(CharBuffer::Primary).await?;
///     let hit = driver.search_template(CharBuffer::Primary, 0, 1000).await?;
///     Ok(u16::try_from(hit.position).ok())
/// }
/// ```
pub trait FingerprintDriver: Send {
    /// Primitives this driver implements.
    fn capabilities(&self) -> DriverCapabilities;

    /// Run the password handshake. `Ok(false)` means the sensor answered but
    /// refused the password.
    async fn verify_password(&mut self) -> Result<bool>;

    /// Try to take an image. Returns immediately: `Ok(false)` when no finger
    /// is on the sensor.
    async fn read_image(&mut self) -> Result<bool>;

    /// Extract characteristics from the image buffer into `buffer`.
    async fn convert_image(&mut self, buffer: CharBuffer) -> Result<()>;

    /// Compare the two characteristic buffers. `0` means no match.
    async fn compare_characteristics(&mut self) -> Result<u16>;

    /// Merge both characteristic buffers into one template.
    async fn create_template(&mut self) -> Result<()>;

    /// Persist the template held in `buffer` at `position`.
    async fn store_template(&mut self, position: u16, buffer: CharBuffer) -> Result<()>;

    /// 1:N search of `buffer` over `count` slots starting at `start`.
    async fn search_template(&mut self, buffer: CharBuffer, start: u16, count: u16)
    -> Result<SearchHit>;

    /// Number of templates the sensor reports as stored.
    async fn template_count(&mut self) -> Result<u16>;

    /// Copy the template at `position` into `buffer`.
    async fn load_template(&mut self, position: u16, buffer: CharBuffer) -> Result<()>;

    /// Remove the template at `position`.
    async fn delete_template(&mut self, position: u16) -> Result<()>;

    /// Remove every stored template.
    async fn clear_database(&mut self) -> Result<()>;

    /// Read back the image buffer.
    async fn download_image(&mut self) -> Result<FingerprintImage>;

    /// Release the transport. Must be safe to call more than once.
    fn close(&mut self);

    /// Ask whether `position` holds a template, loading it into `scratch`.
    ///
    /// The default implementation derives the answer from `load_template`:
    /// success is `Occupied`, an invalid-template rejection is `Empty`, and
    /// anything else is reported as a `Fault` rather than guessed at.
    async fn probe_slot(&mut self, position: u16, scratch: CharBuffer) -> SlotOccupancy {
        match self.load_template(position, scratch).await {
            Ok(()) => SlotOccupancy::Occupied,
            Err(error) if error.is_empty_slot() => SlotOccupancy::Empty,
            Err(error) => SlotOccupancy::Fault(error),
        }
    }
}

/// Opens the transport to a sensor and produces a driver for it.
///
/// The returned driver has not been authenticated yet.
pub trait Connector: Send + Sync {
    type Driver: FingerprintDriver;

    /// Open the transport described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::InitializationFailed`] (or another transport
    /// error) when the port cannot be opened.
    async fn open(&self, config: &SensorConfig) -> Result<Self::Driver>;
}

/// Convenience for drivers that lack a primitive.
pub fn unsupported<T>(operation: &str) -> Result<T> {
    Err(HardwareError::unsupported(operation))
}
