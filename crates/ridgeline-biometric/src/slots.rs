//! Choosing the slot a new template is written to.

use crate::session::SensorSession;
use ridgeline_core::constants::{ALLOCATION_CAPACITY, PROBE_LOOKBACK};
use ridgeline_core::{Error, ProbeFaultPolicy, Result};
use ridgeline_hardware::{CharBuffer, FingerprintDriver, SlotOccupancy};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Buffer overwritten while probing. The merged template lives in `Primary`.
const PROBE_SCRATCH: CharBuffer = CharBuffer::Secondary;

/// Picks the next free slot in `[0, capacity)`.
///
/// The sensor's template count is used as the next free slot whenever the
/// driver can report it. Otherwise slots are probed one by one, starting a
/// little below the last count this allocator saw.
///
/// The count is append-style: a slot freed by a single delete below the
/// count is not reused, and the slot at the count is not checked.
#[derive(Debug)]
pub struct SlotAllocator {
    capacity: u16,
    lookback: u16,
    fault_policy: ProbeFaultPolicy,
    last_count: Mutex<Option<u16>>,
}

impl SlotAllocator {
    pub fn new(capacity: u16) -> Self {
        Self {
            capacity,
            lookback: PROBE_LOOKBACK,
            fault_policy: ProbeFaultPolicy::default(),
            last_count: Mutex::new(None),
        }
    }

    pub fn with_lookback(mut self, lookback: u16) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_fault_policy(mut self, policy: ProbeFaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Record a template count seen elsewhere (e.g. a status query).
    pub fn remember_count(&self, count: u16) {
        *self.last_count.lock().unwrap_or_else(|e| e.into_inner()) = Some(count);
    }

    /// Last template count this allocator knows of.
    pub fn last_known_count(&self) -> Option<u16> {
        *self.last_count.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Choose a slot for a new template.
    ///
    /// # Errors
    ///
    /// - [`Error::NoSlotAvailable`] when the count or the probe finds no room
    /// - [`Error::DeviceError`] when a probe faults under
    ///   [`ProbeFaultPolicy::Abort`]
    /// - [`Error::HardwareUnavailable`] when the transport is lost
    pub async fn select<D: FingerprintDriver>(&self, session: &mut SensorSession<D>) -> Result<u16> {
        if self.capacity == 0 {
            return Err(self.exhausted());
        }

        let driver = session.driver()?;
        if driver.capabilities().template_count {
            match driver.template_count().await {
                Ok(count) => {
                    session.record_template_count(count);
                    self.remember_count(count);
                    if count < self.capacity {
                        debug!("Next free slot from template count: {}", count);
                        return Ok(count);
                    }
                    return Err(self.exhausted());
                }
                Err(e) if e.is_transport_failure() => return Err(e.into()),
                Err(e) => warn!("Template count failed, probing slots instead: {}", e),
            }
        } else {
            debug!("Driver cannot count templates, probing slots");
        }

        self.probe(session).await
    }

    async fn probe<D: FingerprintDriver>(&self, session: &mut SensorSession<D>) -> Result<u16> {
        let known = session.last_template_count().or_else(|| self.last_known_count());
        let start = known.unwrap_or(0).saturating_sub(self.lookback);
        debug!("Probing slots {}..{}", start, self.capacity);

        for position in start..self.capacity {
            let occupancy = session.driver()?.probe_slot(position, PROBE_SCRATCH).await;
            session.mark_loaded(PROBE_SCRATCH);
            match occupancy {
                SlotOccupancy::Occupied => continue,
                SlotOccupancy::Empty => {
                    debug!("Slot {} is free", position);
                    return Ok(position);
                }
                SlotOccupancy::Fault(e) if e.is_transport_failure() => return Err(e.into()),
                SlotOccupancy::Fault(e) => match self.fault_policy {
                    ProbeFaultPolicy::TreatAsEmpty => {
                        warn!("Probe of slot {} faulted ({}), treating it as free", position, e);
                        return Ok(position);
                    }
                    ProbeFaultPolicy::Abort => {
                        return Err(Error::DeviceError(format!(
                            "probe of slot {position} failed: {e}"
                        )));
                    }
                },
            }
        }

        Err(self.exhausted())
    }

    fn exhausted(&self) -> Error {
        Error::NoSlotAvailable {
            capacity: self.capacity,
        }
    }
}

impl Default for SlotAllocator {
    fn default() -> Self {
        Self::new(ALLOCATION_CAPACITY)
    }
}
