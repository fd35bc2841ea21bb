//! Bounded wait for a finger over the sensor's non-blocking image primitive.

use crate::image_store::ImageStore;
use crate::session::SensorSession;
use ridgeline_core::constants::CAPTURE_POLL_INTERVAL_MS;
use ridgeline_core::{Error, Result};
use ridgeline_hardware::FingerprintDriver;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

/// An image is sitting in the sensor's image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureResult {
    /// Time from the first poll to the successful one.
    pub elapsed: Duration,

    /// Number of `read_image` calls made, including the successful one.
    pub polls: u32,
}

/// Polls `read_image` at a fixed interval until a finger is seen or the
/// deadline passes.
///
/// The wait is a `tokio::time` sleep, so it never blocks the runtime and is
/// dropped cleanly if the surrounding future is cancelled. A call returns
/// within `timeout` plus one poll.
///
/// # Examples
///
/// ```
/// use ridgeline_biometric::{CaptureCoordinator, SensorSession};
/// use ridgeline_core::SensorConfig;
/// use ridgeline_hardware::mock::MockConnector;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> ridgeline_core::Result<()> {
/// let (connector, handle) = MockConnector::new();
/// handle.present_finger(vec![1, 2, 3]);
///
/// let mut session = SensorSession::open(&connector, SensorConfig::new("sim")).await?;
/// let capture = CaptureCoordinator::default()
///     .capture(&mut session, Duration::from_secs(5))
///     .await?;
/// assert_eq!(capture.polls, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CaptureCoordinator {
    poll_interval: Duration,
}

impl CaptureCoordinator {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait up to `timeout` for an image.
    ///
    /// A zero timeout polls exactly once.
    ///
    /// # Errors
    ///
    /// - [`Error::CaptureTimeout`] when the deadline passes without an image;
    ///   nothing from the attempt is retained
    /// - [`Error::DeviceError`] / [`Error::HardwareUnavailable`] when the
    ///   sensor faults or the transport is lost while polling
    pub async fn capture<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
        timeout: Duration,
    ) -> Result<CaptureResult> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut polls = 0u32;

        debug!("Waiting up to {:?} for a finger", timeout);
        loop {
            polls += 1;
            if session.driver()?.read_image().await? {
                let elapsed = started.elapsed();
                debug!("Image captured after {} polls ({:?})", polls, elapsed);
                return Ok(CaptureResult { elapsed, polls });
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("No finger after {} polls", polls);
                return Err(Error::CaptureTimeout {
                    timeout_ms: timeout.as_millis().try_into().unwrap_or(u64::MAX),
                });
            }
            trace!("No finger yet (poll {})", polls);
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Capture, read the image back from the sensor and write it to `store`.
    ///
    /// Returns the path of the written file.
    pub async fn capture_and_save<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
        timeout: Duration,
        store: &ImageStore,
    ) -> Result<PathBuf> {
        self.capture(session, timeout).await?;
        let image = session.driver()?.download_image().await?;
        store.save(&image).await
    }
}

impl Default for CaptureCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_millis(CAPTURE_POLL_INTERVAL_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridgeline_core::{ErrorKind, SensorConfig};
    use ridgeline_hardware::mock::{MockCall, MockConnector, MockSensor, MockSensorHandle};

    async fn session() -> (SensorSession<MockSensor>, MockSensorHandle) {
        let (connector, handle) = MockConnector::new();
        let session = SensorSession::open(&connector, SensorConfig::new("sim"))
            .await
            .unwrap();
        (session, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_finger_after_polls() {
        let (mut session, handle) = session().await;
        handle.present_finger_after(3, vec![9]);

        let result = CaptureCoordinator::default()
            .capture(&mut session, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.polls, 4);
        assert_eq!(result.elapsed, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_polls_once() {
        let (mut session, handle) = session().await;

        let error = CaptureCoordinator::default()
            .capture(&mut session, Duration::ZERO)
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::CaptureTimeout);
        assert_eq!(handle.call_count(MockCall::ReadImage), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_sleep_clamped_to_deadline() {
        let (mut session, _handle) = session().await;
        let started = Instant::now();

        let error = CaptureCoordinator::new(Duration::from_millis(400))
            .capture(&mut session, Duration::from_millis(1_000))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::CaptureTimeout { timeout_ms: 1_000 }));
        assert_eq!(started.elapsed(), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_capture_and_save_writes_bmp() {
        let (mut session, handle) = session().await;
        handle.present_finger(vec![10, 20]);
        let dir = tempfile::tempdir().unwrap();

        let path = CaptureCoordinator::default()
            .capture_and_save(&mut session, Duration::from_secs(1), &ImageStore::new(dir.path()))
            .await
            .unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("fingerprint_") && name.ends_with(".bmp"));
        assert_eq!(handle.call_count(MockCall::DownloadImage), 1);
        assert_eq!(&std::fs::read(&path).unwrap()[..2], b"BM");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_transport_is_not_a_timeout() {
        let (mut session, _handle) = session().await;
        session.driver().unwrap().close();

        let error = CaptureCoordinator::default()
            .capture(&mut session, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::HardwareUnavailable);
    }
}
