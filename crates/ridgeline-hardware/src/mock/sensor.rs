//! Mock fingerprint sensor for testing and development.
//!
//! The mock keeps a small model of the device: an image buffer, the two
//! characteristic buffers and an onboard template database. Tests drive it
//! through a [`MockSensorHandle`], which can present fingers, preload
//! templates and inject faults, and afterwards inspect every primitive the
//! workflows invoked.

use crate::{
    error::{HardwareError, Result},
    traits::{Connector, FingerprintDriver},
    types::{CharBuffer, ConfirmationCode, DriverCapabilities, FingerprintImage, SearchHit},
};
use ridgeline_core::SensorConfig;
use ridgeline_core::constants::{ALLOCATION_CAPACITY, DEFAULT_PASSWORD, IMAGE_HEIGHT, IMAGE_WIDTH};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Score the mock reports when two characteristics are identical.
const MATCH_SCORE: u16 = 100;

/// A primitive invoked on the mock, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    VerifyPassword,
    ReadImage,
    ConvertImage(CharBuffer),
    CompareCharacteristics,
    CreateTemplate,
    StoreTemplate(u16),
    SearchTemplate,
    TemplateCount,
    LoadTemplate(u16),
    DeleteTemplate(u16),
    ClearDatabase,
    DownloadImage,
    Close,
}

/// A finger that shows up after a number of empty polls.
#[derive(Debug, Clone)]
struct Presentation {
    polls_before_ready: u32,
    features: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    device_password: u32,
    capabilities: DriverCapabilities,
    available: bool,
    unresponsive: bool,
    latency: Duration,
    capacity: u16,

    fingers: VecDeque<Presentation>,
    resting_finger: Option<Vec<u8>>,
    polls_on_current: u32,

    image: Option<Vec<u8>>,
    buffers: [Option<Vec<u8>>; 2],
    match_score: Option<u16>,
    search_result: Option<SearchHit>,
    templates: BTreeMap<u16, Vec<u8>>,

    rejected_stores: HashSet<u16>,
    faulty_slots: HashSet<u16>,
    fail_template_count: bool,
    fail_clear: bool,

    calls: Vec<MockCall>,
    opened: usize,
    closed: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            device_password: DEFAULT_PASSWORD,
            capabilities: DriverCapabilities::FULL,
            available: true,
            unresponsive: false,
            latency: Duration::ZERO,
            capacity: ALLOCATION_CAPACITY,
            fingers: VecDeque::new(),
            resting_finger: None,
            polls_on_current: 0,
            image: None,
            buffers: [None, None],
            match_score: None,
            search_result: None,
            templates: BTreeMap::new(),
            rejected_stores: HashSet::new(),
            faulty_slots: HashSet::new(),
            fail_template_count: false,
            fail_clear: false,
            calls: Vec::new(),
            opened: 0,
            closed: 0,
        }
    }
}

type SharedState = Arc<Mutex<MockState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock fingerprint sensor for testing and development.
///
/// # Examples
///
/// ```
/// use ridgeline_hardware::mock::MockSensor;
/// use ridgeline_hardware::traits::FingerprintDriver;
/// use ridgeline_hardware::types::CharBuffer;
///
/// #[tokio::main]
/// async fn main() -> ridgeline_hardware::Result<()> {
///     let (mut sensor, handle) = MockSensor::new();
///     handle.present_finger(vec![1, 2, 3]);
///
///     assert!(sensor.read_image().await?);
///     sensor.convert_image(CharBuffer::Primary).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockSensor {
    state: SharedState,
    password: u32,
    connected: bool,
}

impl MockSensor {
    /// Create a connected mock sensor using the factory password.
    pub fn new() -> (Self, MockSensorHandle) {
        let handle = MockSensorHandle::default();
        let sensor = handle.attach(DEFAULT_PASSWORD);
        (sensor, handle)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    /// Simulated command latency, then the connection check every primitive
    /// performs.
    async fn begin(&self, call: MockCall) -> Result<()> {
        let latency = self.with_state(|state| state.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if !self.connected {
            return Err(HardwareError::disconnected("mock sensor"));
        }
        self.with_state(|state| state.calls.push(call));
        Ok(())
    }
}

impl Default for MockSensor {
    fn default() -> Self {
        Self::new().0
    }
}

fn rejected<T>(operation: &'static str, code: ConfirmationCode) -> Result<T> {
    Err(HardwareError::rejected(operation, code))
}

impl FingerprintDriver for MockSensor {
    fn capabilities(&self) -> DriverCapabilities {
        self.with_state(|state| state.capabilities)
    }

    async fn verify_password(&mut self) -> Result<bool> {
        self.begin(MockCall::VerifyPassword).await?;
        let password = self.password;
        self.with_state(|state| {
            if state.unresponsive {
                return Err(HardwareError::timeout(1_000));
            }
            Ok(state.device_password == password)
        })
    }

    async fn read_image(&mut self) -> Result<bool> {
        self.begin(MockCall::ReadImage).await?;
        self.with_state(|state| {
            if let Some(next) = state.fingers.front() {
                if state.polls_on_current >= next.polls_before_ready {
                    let features = next.features.clone();
                    state.fingers.pop_front();
                    state.polls_on_current = 0;
                    state.image = Some(features);
                    return Ok(true);
                }
                state.polls_on_current += 1;
                return Ok(false);
            }
            match &state.resting_finger {
                Some(features) => {
                    state.image = Some(features.clone());
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    async fn convert_image(&mut self, buffer: CharBuffer) -> Result<()> {
        self.begin(MockCall::ConvertImage(buffer)).await?;
        self.with_state(|state| match state.image.clone() {
            Some(image) => {
                state.buffers[buffer.index()] = Some(image);
                Ok(())
            }
            None => rejected("convert_image", ConfirmationCode::INVALID_IMAGE),
        })
    }

    async fn compare_characteristics(&mut self) -> Result<u16> {
        if !self.capabilities().cross_match {
            return crate::traits::unsupported("compare_characteristics");
        }
        self.begin(MockCall::CompareCharacteristics).await?;
        self.with_state(|state| {
            let [Some(primary), Some(secondary)] = &state.buffers else {
                return rejected("compare_characteristics", ConfirmationCode::INVALID_TEMPLATE);
            };
            let computed = if primary == secondary { MATCH_SCORE } else { 0 };
            Ok(state.match_score.unwrap_or(computed))
        })
    }

    async fn create_template(&mut self) -> Result<()> {
        self.begin(MockCall::CreateTemplate).await?;
        self.with_state(|state| {
            let [Some(primary), Some(_)] = &state.buffers else {
                return rejected("create_template", ConfirmationCode::COMBINE_FAILED);
            };
            let merged = primary.clone();
            state.buffers = [Some(merged.clone()), Some(merged)];
            Ok(())
        })
    }

    async fn store_template(&mut self, position: u16, buffer: CharBuffer) -> Result<()> {
        self.begin(MockCall::StoreTemplate(position)).await?;
        self.with_state(|state| {
            if position >= state.capacity {
                return rejected("store_template", ConfirmationCode::ADDRESS_OUT_OF_RANGE);
            }
            if state.rejected_stores.contains(&position) {
                return rejected("store_template", ConfirmationCode::FLASH_WRITE_ERROR);
            }
            let Some(template) = state.buffers[buffer.index()].clone() else {
                return rejected("store_template", ConfirmationCode::INVALID_TEMPLATE);
            };
            state.templates.insert(position, template);
            Ok(())
        })
    }

    async fn search_template(
        &mut self,
        buffer: CharBuffer,
        start: u16,
        count: u16,
    ) -> Result<SearchHit> {
        self.begin(MockCall::SearchTemplate).await?;
        self.with_state(|state| {
            if u32::from(start) + u32::from(count) > u32::from(state.capacity) {
                return rejected("search_template", ConfirmationCode::ADDRESS_OUT_OF_RANGE);
            }
            if let Some(hit) = state.search_result {
                return Ok(hit);
            }
            let Some(probe) = &state.buffers[buffer.index()] else {
                return rejected("search_template", ConfirmationCode::INVALID_TEMPLATE);
            };
            let end = start.saturating_add(count);
            let hit = state
                .templates
                .range(start..end)
                .find(|(_, template)| *template == probe)
                .map(|(slot, _)| SearchHit::new(i32::from(*slot), MATCH_SCORE));
            Ok(hit.unwrap_or_else(SearchHit::no_match))
        })
    }

    async fn template_count(&mut self) -> Result<u16> {
        if !self.capabilities().template_count {
            return crate::traits::unsupported("template_count");
        }
        self.begin(MockCall::TemplateCount).await?;
        self.with_state(|state| {
            if state.fail_template_count {
                return rejected("template_count", ConfirmationCode::PACKET_RECEIVE_ERROR);
            }
            u16::try_from(state.templates.len())
                .map_err(|_| HardwareError::invalid_data("template count overflow"))
        })
    }

    async fn load_template(&mut self, position: u16, buffer: CharBuffer) -> Result<()> {
        self.begin(MockCall::LoadTemplate(position)).await?;
        self.with_state(|state| {
            if position >= state.capacity {
                return rejected("load_template", ConfirmationCode::ADDRESS_OUT_OF_RANGE);
            }
            if state.faulty_slots.contains(&position) {
                return rejected("load_template", ConfirmationCode::PACKET_RECEIVE_ERROR);
            }
            match state.templates.get(&position).cloned() {
                Some(template) => {
                    state.buffers[buffer.index()] = Some(template);
                    Ok(())
                }
                None => rejected("load_template", ConfirmationCode::INVALID_TEMPLATE),
            }
        })
    }

    async fn delete_template(&mut self, position: u16) -> Result<()> {
        self.begin(MockCall::DeleteTemplate(position)).await?;
        self.with_state(|state| {
            if position >= state.capacity {
                return rejected("delete_template", ConfirmationCode::ADDRESS_OUT_OF_RANGE);
            }
            if state.faulty_slots.contains(&position) {
                return rejected("delete_template", ConfirmationCode::DELETE_FAILED);
            }
            state.templates.remove(&position);
            Ok(())
        })
    }

    async fn clear_database(&mut self) -> Result<()> {
        self.begin(MockCall::ClearDatabase).await?;
        self.with_state(|state| {
            if state.fail_clear {
                return rejected("clear_database", ConfirmationCode::CLEAR_FAILED);
            }
            state.templates.clear();
            Ok(())
        })
    }

    async fn download_image(&mut self) -> Result<FingerprintImage> {
        self.begin(MockCall::DownloadImage).await?;
        let features = self.with_state(|state| state.image.clone());
        let Some(features) = features else {
            return rejected("download_image", ConfirmationCode::UPLOAD_IMAGE_FAILED);
        };
        let len = usize::from(IMAGE_WIDTH) * usize::from(IMAGE_HEIGHT);
        let pixels = if features.is_empty() {
            vec![0; len]
        } else {
            features.iter().copied().cycle().take(len).collect()
        };
        FingerprintImage::new(IMAGE_WIDTH, IMAGE_HEIGHT, pixels)
    }

    fn close(&mut self) {
        if self.connected {
            self.connected = false;
            self.with_state(|state| {
                state.calls.push(MockCall::Close);
                state.closed += 1;
            });
        }
    }
}

/// Handle for controlling a mock sensor.
///
/// Clones share the same simulated device, so a handle kept by a test sees
/// everything done through sensors opened by a [`MockConnector`].
#[derive(Debug, Clone, Default)]
pub struct MockSensorHandle {
    state: SharedState,
}

impl MockSensorHandle {
    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    fn attach(&self, password: u32) -> MockSensor {
        self.with_state(|state| state.opened += 1);
        MockSensor {
            state: Arc::clone(&self.state),
            password,
            connected: true,
        }
    }

    /// Queue a finger that is ready on the next poll.
    pub fn present_finger(&self, features: Vec<u8>) {
        self.present_finger_after(0, features);
    }

    /// Queue a finger that only becomes ready after `polls` empty polls.
    pub fn present_finger_after(&self, polls: u32, features: Vec<u8>) {
        self.with_state(|state| {
            state.fingers.push_back(Presentation {
                polls_before_ready: polls,
                features,
            })
        });
    }

    /// Finger reported on every poll once the queue is empty.
    pub fn rest_finger(&self, features: Option<Vec<u8>>) {
        self.with_state(|state| state.resting_finger = features);
    }

    /// Force the cross-match score instead of comparing buffers.
    pub fn set_match_score(&self, score: Option<u16>) {
        self.with_state(|state| state.match_score = score);
    }

    /// Force the raw result of the next 1:N searches.
    pub fn set_search_result(&self, hit: Option<SearchHit>) {
        self.with_state(|state| state.search_result = hit);
    }

    /// Place a template directly into the onboard database.
    pub fn preload(&self, slot: u16, template: Vec<u8>) {
        self.with_state(|state| {
            state.templates.insert(slot, template);
        });
    }

    /// Make storing at `slot` fail with a flash write error.
    pub fn reject_store(&self, slot: u16) {
        self.with_state(|state| {
            state.rejected_stores.insert(slot);
        });
    }

    /// Make loading or deleting `slot` fail with a communication fault.
    pub fn fail_slot(&self, slot: u16) {
        self.with_state(|state| {
            state.faulty_slots.insert(slot);
        });
    }

    /// Make the template count query fail.
    pub fn fail_template_count(&self, fail: bool) {
        self.with_state(|state| state.fail_template_count = fail);
    }

    /// Make erasing the database fail, leaving every template in place.
    pub fn fail_clear(&self, fail: bool) {
        self.with_state(|state| state.fail_clear = fail);
    }

    pub fn set_capabilities(&self, capabilities: DriverCapabilities) {
        self.with_state(|state| state.capabilities = capabilities);
    }

    /// Password the simulated device expects.
    pub fn set_password(&self, password: u32) {
        self.with_state(|state| state.device_password = password);
    }

    /// Whether a connector can open the transport at all.
    pub fn set_available(&self, available: bool) {
        self.with_state(|state| state.available = available);
    }

    /// Transport opens but the device never answers the handshake.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.with_state(|state| state.unresponsive = unresponsive);
    }

    /// Delay applied to every primitive.
    pub fn set_latency(&self, latency: Duration) {
        self.with_state(|state| state.latency = latency);
    }

    /// Number of slots the simulated database has.
    pub fn set_capacity(&self, capacity: u16) {
        self.with_state(|state| state.capacity = capacity);
    }

    /// Every primitive invoked so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.with_state(|state| state.calls.clone())
    }

    /// Positions passed to `store_template`, in order.
    pub fn store_attempts(&self) -> Vec<u16> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::StoreTemplate(position) => Some(position),
                _ => None,
            })
            .collect()
    }

    pub fn call_count(&self, call: MockCall) -> usize {
        self.with_state(|state| state.calls.iter().filter(|c| **c == call).count())
    }

    pub fn clear_calls(&self) {
        self.with_state(|state| state.calls.clear());
    }

    pub fn template_at(&self, slot: u16) -> Option<Vec<u8>> {
        self.with_state(|state| state.templates.get(&slot).cloned())
    }

    pub fn occupied_slots(&self) -> Vec<u16> {
        self.with_state(|state| state.templates.keys().copied().collect())
    }

    /// Transports opened through a connector (or `MockSensor::new`).
    pub fn open_count(&self) -> usize {
        self.with_state(|state| state.opened)
    }

    /// Transports actually released by `close`.
    pub fn close_count(&self) -> usize {
        self.with_state(|state| state.closed)
    }
}

/// Connector producing [`MockSensor`]s that all share one simulated device.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    handle: MockSensorHandle,
}

impl MockConnector {
    pub fn new() -> (Self, MockSensorHandle) {
        let handle = MockSensorHandle::default();
        (Self::from_handle(handle.clone()), handle)
    }

    pub fn from_handle(handle: MockSensorHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &MockSensorHandle {
        &self.handle
    }
}

impl Connector for MockConnector {
    type Driver = MockSensor;

    async fn open(&self, config: &SensorConfig) -> Result<MockSensor> {
        if !self.handle.with_state(|state| state.available) {
            return Err(HardwareError::initialization_failed(format!(
                "cannot open {}",
                config.port
            )));
        }
        Ok(self.handle.attach(config.password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_finger_ready_after_polls() {
        let (mut sensor, handle) = MockSensor::new();
        handle.present_finger_after(2, vec![7]);

        assert!(!sensor.read_image().await.unwrap());
        assert!(!sensor.read_image().await.unwrap());
        assert!(sensor.read_image().await.unwrap());
        // Queue drained and nothing resting on the sensor.
        assert!(!sensor.read_image().await.unwrap());
    }

    #[tokio::test]
    async fn test_resting_finger_always_ready() {
        let (mut sensor, handle) = MockSensor::new();
        handle.rest_finger(Some(vec![1]));

        for _ in 0..3 {
            assert!(sensor.read_image().await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_enroll_primitives_round_trip() {
        let (mut sensor, handle) = MockSensor::new();
        handle.present_finger(vec![4, 2]);
        handle.present_finger(vec![4, 2]);

        assert!(sensor.read_image().await.unwrap());
        sensor.convert_image(CharBuffer::Primary).await.unwrap();
        assert!(sensor.read_image().await.unwrap());
        sensor.convert_image(CharBuffer::Secondary).await.unwrap();

        assert_eq!(sensor.compare_characteristics().await.unwrap(), MATCH_SCORE);
        sensor.create_template().await.unwrap();
        sensor.store_template(9, CharBuffer::Primary).await.unwrap();

        assert_eq!(handle.template_at(9), Some(vec![4, 2]));
        assert_eq!(sensor.template_count().await.unwrap(), 1);
        let hit = sensor
            .search_template(CharBuffer::Primary, 0, 1000)
            .await
            .unwrap();
        assert_eq!(hit, SearchHit::new(9, MATCH_SCORE));
    }

    #[tokio::test]
    async fn test_different_fingers_do_not_match() {
        let (mut sensor, handle) = MockSensor::new();
        handle.present_finger(vec![1]);
        handle.present_finger(vec![2]);

        sensor.read_image().await.unwrap();
        sensor.convert_image(CharBuffer::Primary).await.unwrap();
        sensor.read_image().await.unwrap();
        sensor.convert_image(CharBuffer::Secondary).await.unwrap();

        assert_eq!(sensor.compare_characteristics().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_convert_without_image_is_rejected() {
        let (mut sensor, _handle) = MockSensor::new();
        let error = sensor.convert_image(CharBuffer::Primary).await.unwrap_err();
        assert_eq!(
            error.confirmation_code(),
            Some(ConfirmationCode::INVALID_IMAGE)
        );
    }

    #[tokio::test]
    async fn test_missing_capabilities_are_unsupported() {
        let (mut sensor, handle) = MockSensor::new();
        handle.set_capabilities(DriverCapabilities {
            cross_match: false,
            template_count: false,
        });

        assert!(matches!(
            sensor.compare_characteristics().await,
            Err(HardwareError::Unsupported { .. })
        ));
        assert!(matches!(
            sensor.template_count().await,
            Err(HardwareError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_disconnects() {
        let (mut sensor, handle) = MockSensor::new();
        sensor.close();
        sensor.close();

        assert_eq!(handle.close_count(), 1);
        assert!(!sensor.is_connected());
        assert!(matches!(
            sensor.read_image().await,
            Err(HardwareError::Disconnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_connector_respects_availability_and_password() {
        let (connector, handle) = MockConnector::new();
        handle.set_password(0x0102_0304);

        let mut wrong = connector.open(&SensorConfig::new("mock")).await.unwrap();
        assert!(!wrong.verify_password().await.unwrap());

        let config = SensorConfig::new("mock").password(0x0102_0304);
        let mut right = connector.open(&config).await.unwrap();
        assert!(right.verify_password().await.unwrap());
        assert_eq!(handle.open_count(), 2);

        handle.set_available(false);
        assert!(matches!(
            connector.open(&config).await,
            Err(HardwareError::InitializationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_rejections() {
        let (mut sensor, handle) = MockSensor::new();
        handle.set_capacity(10);
        handle.reject_store(3);
        handle.present_finger(vec![1]);
        sensor.read_image().await.unwrap();
        sensor.convert_image(CharBuffer::Primary).await.unwrap();

        let flash = sensor.store_template(3, CharBuffer::Primary).await.unwrap_err();
        assert_eq!(
            flash.confirmation_code(),
            Some(ConfirmationCode::FLASH_WRITE_ERROR)
        );
        let range = sensor.store_template(10, CharBuffer::Primary).await.unwrap_err();
        assert_eq!(
            range.confirmation_code(),
            Some(ConfirmationCode::ADDRESS_OUT_OF_RANGE)
        );
        assert_eq!(handle.store_attempts(), vec![3, 10]);
    }

    #[tokio::test]
    async fn test_clear_failure_keeps_templates() {
        let (mut sensor, handle) = MockSensor::new();
        handle.preload(0, vec![1]);
        handle.fail_clear(true);

        let error = sensor.clear_database().await.unwrap_err();
        assert_eq!(error.confirmation_code(), Some(ConfirmationCode::CLEAR_FAILED));
        assert_eq!(handle.occupied_slots(), vec![0]);

        handle.fail_clear(false);
        sensor.clear_database().await.unwrap();
        assert!(handle.occupied_slots().is_empty());
    }

    #[tokio::test]
    async fn test_download_image_has_sensor_dimensions() {
        let (mut sensor, handle) = MockSensor::new();
        handle.present_finger(vec![10, 20]);
        sensor.read_image().await.unwrap();

        let image = sensor.download_image().await.unwrap();
        assert_eq!(image.width(), IMAGE_WIDTH);
        assert_eq!(image.height(), IMAGE_HEIGHT);
        assert_eq!(&image.pixels()[..4], &[10, 20, 10, 20]);
    }
}
