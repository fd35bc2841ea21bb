//! Two-capture enrollment.
//!
//! # States
//!
//! ```text
//! Connecting → PhaseOneCapture → PhaseOneConvert → AwaitFingerRemoval
//!   → PhaseTwoCapture → PhaseTwoConvert → CrossMatch → Merge
//!   → SlotSelect → Store → Done
//! ```
//!
//! `Failed(kind)` is reachable from every state. Each transition is logged at
//! debug level under the `enrollment` target.
//!
//! # Store Fallback
//!
//! The template is stored at the allocated slot `n`. If the sensor rejects
//! that, `n + 1` is tried, then slot `0`. Slot 0 is written without checking
//! that it is free, which can overwrite an existing template; turn it off with
//! [`EnrollmentWorkflow::with_slot_zero_fallback`].

use crate::capture::CaptureCoordinator;
use crate::config::ScannerConfig;
use crate::session::SensorSession;
use crate::slots::SlotAllocator;
use ridgeline_core::constants::ENROLLMENT_SETTLE_DELAY_MS;
use ridgeline_core::{Enrollment, Error, ErrorKind, Result, SensorConfig};
use ridgeline_hardware::{CharBuffer, Connector, FingerprintDriver};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where an enrollment currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentState {
    Connecting,
    PhaseOneCapture,
    PhaseOneConvert,
    AwaitFingerRemoval,
    PhaseTwoCapture,
    PhaseTwoConvert,
    CrossMatch,
    Merge,
    SlotSelect,
    Store,
    Done,
    Failed(ErrorKind),
}

impl EnrollmentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

impl fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            Self::Connecting => "Connecting",
            Self::PhaseOneCapture => "PhaseOneCapture",
            Self::PhaseOneConvert => "PhaseOneConvert",
            Self::AwaitFingerRemoval => "AwaitFingerRemoval",
            Self::PhaseTwoCapture => "PhaseTwoCapture",
            Self::PhaseTwoConvert => "PhaseTwoConvert",
            Self::CrossMatch => "CrossMatch",
            Self::Merge => "Merge",
            Self::SlotSelect => "SlotSelect",
            Self::Store => "Store",
            Self::Done => "Done",
            Self::Failed(kind) => return write!(f, "Failed({kind:?})"),
        };
        write!(f, "{}", state_str)
    }
}

#[derive(Debug)]
struct Progress {
    current: EnrollmentState,
}

impl Progress {
    fn new() -> Self {
        Self {
            current: EnrollmentState::Connecting,
        }
    }

    fn advance(&mut self, to: EnrollmentState) {
        debug!(target: "enrollment", "{} -> {}", self.current, to);
        self.current = to;
    }
}

/// Runs the enrollment state machine against one session.
///
/// # Examples
///
/// ```
/// use ridgeline_biometric::EnrollmentWorkflow;
/// use ridgeline_core::SensorConfig;
/// use ridgeline_hardware::mock::MockConnector;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread", start_paused = true)]
/// # async fn main() -> ridgeline_core::Result<()> {
/// let (connector, handle) = MockConnector::new();
/// handle.present_finger(vec![7; 8]);
/// handle.present_finger(vec![7; 8]);
///
/// let workflow = EnrollmentWorkflow::default();
/// let enrollment = workflow
///     .enroll(&connector, SensorConfig::new("sim"), Duration::from_secs(5))
///     .await?;
///
/// assert_eq!(enrollment.slot, 0);
/// assert!(!enrollment.verification_skipped);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EnrollmentWorkflow {
    capture: CaptureCoordinator,
    allocator: SlotAllocator,
    settle_delay: Duration,
    allow_slot_zero_fallback: bool,
}

impl EnrollmentWorkflow {
    pub fn new(capture: CaptureCoordinator, allocator: SlotAllocator) -> Self {
        Self {
            capture,
            allocator,
            settle_delay: Duration::from_millis(ENROLLMENT_SETTLE_DELAY_MS),
            allow_slot_zero_fallback: true,
        }
    }

    pub fn from_config(config: &ScannerConfig) -> Self {
        let allocator = SlotAllocator::new(config.allocation_capacity)
            .with_lookback(config.probe_lookback)
            .with_fault_policy(config.probe_fault_policy);
        Self::new(CaptureCoordinator::new(config.poll_interval), allocator)
            .with_settle_delay(config.settle_delay)
            .with_slot_zero_fallback(config.allow_slot_zero_fallback)
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_slot_zero_fallback(mut self, allow: bool) -> Self {
        self.allow_slot_zero_fallback = allow;
        self
    }

    pub fn allocator(&self) -> &SlotAllocator {
        &self.allocator
    }

    /// Connect, enroll and disconnect.
    ///
    /// The session is disconnected on every path out of this call.
    pub async fn enroll<C: Connector>(
        &self,
        connector: &C,
        config: SensorConfig,
        timeout: Duration,
    ) -> Result<Enrollment> {
        let mut session = SensorSession::new(config);
        if let Err(e) = session.connect(connector).await {
            debug!(target: "enrollment", "Connecting -> {}", EnrollmentState::Failed(e.kind()));
            return Err(e);
        }
        let result = self.run(&mut session, timeout).await;
        session.disconnect();
        result
    }

    /// Enroll on an already connected session.
    ///
    /// Characteristic buffers are released on every path; disconnecting is
    /// left to the caller.
    pub async fn run<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
        timeout: Duration,
    ) -> Result<Enrollment> {
        let mut progress = Progress::new();
        let result = self.steps(session, timeout, &mut progress).await;
        session.release_buffers();

        match &result {
            Ok(enrollment) => {
                progress.advance(EnrollmentState::Done);
                info!(
                    "Enrolled template at slot {} (verification skipped: {})",
                    enrollment.slot, enrollment.verification_skipped
                );
            }
            Err(e) => {
                let failed_in = progress.current;
                progress.advance(EnrollmentState::Failed(e.kind()));
                warn!("Enrollment failed during {}: {}", failed_in, e);
            }
        }
        result
    }

    async fn steps<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
        timeout: Duration,
        progress: &mut Progress,
    ) -> Result<Enrollment> {
        // The session is already authenticated when this runs.
        session.driver()?;

        progress.advance(EnrollmentState::PhaseOneCapture);
        info!("Place finger on the sensor");
        self.capture_phase(session, timeout).await?;
        progress.advance(EnrollmentState::PhaseOneConvert);
        self.convert(session, CharBuffer::Primary).await?;

        progress.advance(EnrollmentState::AwaitFingerRemoval);
        info!("Remove finger");
        tokio::time::sleep(self.settle_delay).await;

        progress.advance(EnrollmentState::PhaseTwoCapture);
        info!("Place the same finger again");
        self.capture_phase(session, timeout).await?;
        progress.advance(EnrollmentState::PhaseTwoConvert);
        self.convert(session, CharBuffer::Secondary).await?;

        progress.advance(EnrollmentState::CrossMatch);
        let (verification_skipped, match_score) = self.cross_match(session).await?;

        progress.advance(EnrollmentState::Merge);
        session.driver()?.create_template().await?;

        progress.advance(EnrollmentState::SlotSelect);
        let candidate = self.allocator.select(session).await?;

        progress.advance(EnrollmentState::Store);
        let slot = self.store(session, candidate).await?;
        Ok(Enrollment {
            slot,
            verification_skipped,
            match_score,
        })
    }

    /// A failed capture, whatever the cause, is reported as a timeout.
    async fn capture_phase<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
        timeout: Duration,
    ) -> Result<()> {
        match self.capture.capture(session, timeout).await {
            Ok(_) => Ok(()),
            Err(e @ Error::CaptureTimeout { .. }) => Err(e),
            Err(e) => {
                warn!("Capture failed: {}", e);
                Err(Error::CaptureTimeout {
                    timeout_ms: timeout.as_millis().try_into().unwrap_or(u64::MAX),
                })
            }
        }
    }

    async fn convert<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
        buffer: CharBuffer,
    ) -> Result<()> {
        session.driver()?.convert_image(buffer).await?;
        session.mark_loaded(buffer);
        Ok(())
    }

    async fn cross_match<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
    ) -> Result<(bool, Option<u16>)> {
        let driver = session.driver()?;
        if !driver.capabilities().cross_match {
            warn!("Driver cannot compare characteristics, enrolling unverified");
            return Ok((true, None));
        }
        match driver.compare_characteristics().await? {
            0 => Err(Error::EnrollmentMismatch),
            score => {
                debug!("Captures match with score {}", score);
                Ok((false, Some(score)))
            }
        }
    }

    fn store_candidates(&self, candidate: u16) -> Vec<u16> {
        let capacity = self.allocator.capacity();
        let mut candidates = vec![candidate];
        candidates.extend(candidate.checked_add(1));
        if self.allow_slot_zero_fallback {
            candidates.push(0);
        }

        let mut ordered = Vec::with_capacity(candidates.len());
        for slot in candidates {
            if slot < capacity && !ordered.contains(&slot) {
                ordered.push(slot);
            }
        }
        ordered
    }

    async fn store<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
        candidate: u16,
    ) -> Result<u16> {
        let mut attempted = Vec::new();
        for slot in self.store_candidates(candidate) {
            attempted.push(slot);
            match session.driver()?.store_template(slot, CharBuffer::Primary).await {
                Ok(()) => return Ok(slot),
                Err(e) if e.is_transport_failure() => return Err(e.into()),
                Err(e) => warn!("Store at slot {} failed: {}", slot, e),
            }
        }
        Err(Error::EnrollmentStoreFailed { attempted })
    }
}

impl Default for EnrollmentWorkflow {
    fn default() -> Self {
        Self::new(CaptureCoordinator::default(), SlotAllocator::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(5, true, 1000, vec![5, 6, 0])]
    #[case(5, false, 1000, vec![5, 6])]
    #[case(0, true, 1000, vec![0, 1])]
    #[case(999, true, 1000, vec![999, 0])]
    #[case(999, false, 1000, vec![999])]
    fn test_store_candidates(
        #[case] candidate: u16,
        #[case] slot_zero: bool,
        #[case] capacity: u16,
        #[case] expected: Vec<u16>,
    ) {
        let workflow = EnrollmentWorkflow::new(CaptureCoordinator::default(), SlotAllocator::new(capacity))
            .with_slot_zero_fallback(slot_zero);
        assert_eq!(workflow.store_candidates(candidate), expected);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(EnrollmentState::AwaitFingerRemoval.to_string(), "AwaitFingerRemoval");
        assert_eq!(
            EnrollmentState::Failed(ErrorKind::EnrollmentMismatch).to_string(),
            "Failed(EnrollmentMismatch)"
        );
        assert!(EnrollmentState::Done.is_terminal());
        assert!(!EnrollmentState::Store.is_terminal());
    }

    #[test]
    fn test_progress_tracks_current_state() {
        let mut progress = Progress::new();
        progress.advance(EnrollmentState::PhaseOneCapture);
        assert_eq!(progress.current, EnrollmentState::PhaseOneCapture);

        progress.advance(EnrollmentState::Failed(ErrorKind::CaptureTimeout));
        assert!(progress.current.is_terminal());
    }
}
