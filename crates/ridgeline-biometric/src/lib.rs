//! Fingerprint sensor orchestration.
//!
//! This crate drives an R307-class sensor through whole operations: connect
//! and authenticate, wait for a finger, enroll a template, identify a finger
//! and maintain the onboard database. It is written against the
//! [`FingerprintDriver`](ridgeline_hardware::FingerprintDriver) trait, so the
//! same workflows run on a serial port or on the mock sensor.
//!
//! # Components
//!
//! - [`SensorSession`]: connection lifecycle, torn down on every path
//! - [`CaptureCoordinator`]: deadline-bounded polling for a finger
//! - [`SlotAllocator`]: where a new template goes
//! - [`EnrollmentWorkflow`]: two captures, cross-match, merge, store
//! - [`IdentificationWorkflow`]: one capture, 1:N search
//! - [`DatabaseMaintenance`]: status, list, delete, clear
//! - [`FingerprintScanner`]: per-port locking facade with outcome reporting
//!
//! # Errors
//!
//! Every operation returns [`ridgeline_core::Result`]. Sensor faults are
//! normalized into [`ridgeline_core::Error`] before they leave this crate.
//!
//! # Examples
//!
//! ```
//! use ridgeline_biometric::{FingerprintScanner, ScannerConfig};
//! use ridgeline_core::SensorConfig;
//! use ridgeline_hardware::mock::MockConnector;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() -> ridgeline_core::Result<()> {
//! let (connector, handle) = MockConnector::new();
//! handle.rest_finger(Some(vec![3; 8]));
//!
//! let config = ScannerConfig::new(SensorConfig::new("/dev/ttyUSB0"));
//! let scanner = FingerprintScanner::new(config, connector);
//!
//! let enrollment = scanner.enroll(scanner.default_timeout()).await?;
//! assert_eq!(enrollment.slot, 0);
//! assert_eq!(scanner.status().await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod enroll;
pub mod identify;
pub mod image_store;
pub mod maintenance;
pub mod report;
pub mod scanner;
pub mod session;
pub mod slots;

pub use capture::{CaptureCoordinator, CaptureResult};
pub use config::ScannerConfig;
pub use enroll::{EnrollmentState, EnrollmentWorkflow};
pub use identify::IdentificationWorkflow;
pub use image_store::ImageStore;
pub use maintenance::DatabaseMaintenance;
pub use report::{
    CollectingReporter, Operation, OperationOutcome, OperationReport, OutcomePayload,
    OutcomeReporter, TracingReporter,
};
pub use scanner::{FingerprintScanner, PortLocks};
pub use session::SensorSession;
pub use slots::SlotAllocator;
