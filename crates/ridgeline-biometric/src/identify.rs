//! One capture followed by a 1:N search of the whole database.

use crate::capture::CaptureCoordinator;
use crate::session::SensorSession;
use ridgeline_core::constants::{ALLOCATION_CAPACITY, NO_MATCH_POSITION};
use ridgeline_core::{Error, Result, SearchOutcome, SensorConfig};
use ridgeline_hardware::{CharBuffer, Connector, FingerprintDriver, SearchHit};
use std::time::Duration;
use tracing::{debug, info};

/// Turn the sensor's raw `(position, score)` pair into an outcome.
///
/// The `-1` sentinel is the only way to get [`SearchOutcome::NotFound`]. A
/// real position needs a positive score; anything else is reported as a
/// device error rather than guessed at.
///
/// # Examples
///
/// ```
/// use ridgeline_biometric::identify::interpret_hit;
/// use ridgeline_core::SearchOutcome;
/// use ridgeline_hardware::SearchHit;
///
/// assert_eq!(interpret_hit(SearchHit::no_match()).unwrap(), SearchOutcome::NotFound);
/// assert_eq!(
///     interpret_hit(SearchHit::new(4, 90)).unwrap(),
///     SearchOutcome::Found { slot: 4, score: 90 }
/// );
/// assert!(interpret_hit(SearchHit::new(4, 0)).is_err());
/// ```
pub fn interpret_hit(hit: SearchHit) -> Result<SearchOutcome> {
    if hit.position == NO_MATCH_POSITION {
        return Ok(SearchOutcome::NotFound);
    }
    match u16::try_from(hit.position) {
        Ok(slot) if hit.score > 0 => Ok(SearchOutcome::Found {
            slot,
            score: hit.score,
        }),
        _ => Err(Error::DeviceError(format!(
            "Sensor returned an inconsistent search result (position {}, score {})",
            hit.position, hit.score
        ))),
    }
}

/// Identifies a presented finger against everything stored on the sensor.
#[derive(Debug, Clone, Copy)]
pub struct IdentificationWorkflow {
    capture: CaptureCoordinator,
    capacity: u16,
}

impl IdentificationWorkflow {
    /// Search `[0, capacity)` after each capture.
    pub fn new(capture: CaptureCoordinator, capacity: u16) -> Self {
        Self { capture, capacity }
    }

    /// Connect, search and disconnect.
    pub async fn search<C: Connector>(
        &self,
        connector: &C,
        config: SensorConfig,
        timeout: Duration,
    ) -> Result<SearchOutcome> {
        let mut session = SensorSession::open(connector, config).await?;
        let result = self.run(&mut session, timeout).await;
        session.disconnect();
        result
    }

    /// Search on an already connected session.
    ///
    /// # Errors
    ///
    /// [`Error::CaptureTimeout`] when no finger arrives, otherwise the
    /// normalized device fault. `NotFound` is not an error.
    pub async fn run<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
        timeout: Duration,
    ) -> Result<SearchOutcome> {
        let result = self.steps(session, timeout).await;
        session.release_buffers();
        result
    }

    async fn steps<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
        timeout: Duration,
    ) -> Result<SearchOutcome> {
        info!("Place finger on the sensor");
        self.capture.capture(session, timeout).await?;

        session.driver()?.convert_image(CharBuffer::Primary).await?;
        session.mark_loaded(CharBuffer::Primary);

        let hit = session
            .driver()?
            .search_template(CharBuffer::Primary, 0, self.capacity)
            .await?;
        debug!("Search returned position {} score {}", hit.position, hit.score);

        let outcome = interpret_hit(hit)?;
        match outcome {
            SearchOutcome::Found { slot, score } => {
                info!("Found template at slot {} (score {})", slot, score)
            }
            SearchOutcome::NotFound => info!("No matching template"),
        }
        Ok(outcome)
    }
}

/// Searches `[0, ALLOCATION_CAPACITY)`. Modules with a smaller library need
/// [`IdentificationWorkflow::new`] with their own size.
impl Default for IdentificationWorkflow {
    fn default() -> Self {
        Self::new(CaptureCoordinator::default(), ALLOCATION_CAPACITY)
    }
}
