//! Mock device implementations for testing and development.
//!
//! This module provides a simulated fingerprint sensor that can be controlled
//! programmatically without requiring physical hardware.

pub mod sensor;

// Re-export commonly used types
pub use sensor::{MockCall, MockConnector, MockSensor, MockSensorHandle};
