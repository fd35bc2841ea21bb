//! Shared vocabulary for the Ridgeline fingerprint sensor workspace.
//!
//! This crate holds the pieces every other crate agrees on: the workflow
//! error taxonomy, sensor connection parameters, device-capacity constants
//! and the outcome types handed back to callers.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Disposition, Error, ErrorKind, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
