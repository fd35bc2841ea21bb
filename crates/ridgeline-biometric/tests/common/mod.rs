//! Shared fixtures for workflow integration tests.
//!
//! Every helper builds on the mock sensor. The returned handle controls the
//! simulated device and records each primitive the workflows call.

#![allow(dead_code)]

use ridgeline_biometric::{FingerprintScanner, ScannerConfig, SensorSession};
use ridgeline_core::SensorConfig;
use ridgeline_hardware::mock::{MockConnector, MockSensor, MockSensorHandle};
use std::time::Duration;

pub const PORT: &str = "/dev/ttyMOCK0";

/// Characteristics that cross-match with themselves.
pub fn finger(seed: u8) -> Vec<u8> {
    vec![seed; 16]
}

pub fn scanner_config() -> ScannerConfig {
    ScannerConfig::new(SensorConfig::new(PORT)).with_capture_timeout(Duration::from_secs(5))
}

pub fn scanner() -> (FingerprintScanner<MockConnector>, MockSensorHandle) {
    scanner_with(scanner_config())
}

pub fn scanner_with(config: ScannerConfig) -> (FingerprintScanner<MockConnector>, MockSensorHandle) {
    let (connector, handle) = MockConnector::new();
    (FingerprintScanner::new(config, connector), handle)
}

pub async fn session() -> (SensorSession<MockSensor>, MockSensorHandle) {
    let (connector, handle) = MockConnector::new();
    let session = SensorSession::open(&connector, SensorConfig::new(PORT))
        .await
        .expect("mock session should connect");
    (session, handle)
}

/// Queue the two presentations an enrollment needs.
pub fn present_twice(handle: &MockSensorHandle, features: Vec<u8>) {
    handle.present_finger(features.clone());
    handle.present_finger(features);
}

/// Fill `slots` with distinct templates.
pub fn preload(handle: &MockSensorHandle, slots: impl IntoIterator<Item = u16>) {
    for slot in slots {
        handle.preload(slot, vec![0xA0, (slot >> 8) as u8, slot as u8]);
    }
}

/// Every open was matched by exactly one close.
pub fn assert_balanced(handle: &MockSensorHandle) {
    assert_eq!(
        handle.open_count(),
        handle.close_count(),
        "every connected session must be disconnected exactly once"
    );
}
