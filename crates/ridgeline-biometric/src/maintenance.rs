//! Status, listing, deletion and erasure of the onboard template database.

use crate::session::SensorSession;
use ridgeline_core::constants::SCAN_CAPACITY;
use ridgeline_core::{DatabaseStatus, Error, ProbeFaultPolicy, Result};
use ridgeline_hardware::{CharBuffer, FingerprintDriver, SlotOccupancy};
use tracing::{debug, info, warn};

const PROBE_SCRATCH: CharBuffer = CharBuffer::Secondary;

/// Operator maintenance over `[0, scan_capacity)`.
///
/// Listing probes every slot in range, one load per slot. Maintenance is an
/// occasional operator action, so the scan stays simple rather than fast.
///
/// Confirming a destructive [`clear_all`](Self::clear_all) is the caller's job.
///
/// # Examples
///
/// ```
/// use ridgeline_biometric::{DatabaseMaintenance, SensorSession};
/// use ridgeline_core::SensorConfig;
/// use ridgeline_hardware::mock::MockConnector;
///
/// # #[tokio::main]
/// # async fn main() -> ridgeline_core::Result<()> {
/// let (connector, handle) = MockConnector::new();
/// handle.preload(4, vec![1; 8]);
/// handle.preload(2, vec![2; 8]);
///
/// let mut session = SensorSession::open(&connector, SensorConfig::new("sim")).await?;
/// let report = DatabaseMaintenance::default().report(&mut session).await?;
///
/// assert_eq!(report.template_count, Some(2));
/// assert_eq!(report.occupied, vec![2, 4]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DatabaseMaintenance {
    scan_capacity: u16,
    fault_policy: ProbeFaultPolicy,
}

impl DatabaseMaintenance {
    pub fn new(scan_capacity: u16) -> Self {
        Self {
            scan_capacity,
            fault_policy: ProbeFaultPolicy::default(),
        }
    }

    pub fn with_fault_policy(mut self, policy: ProbeFaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn scan_capacity(&self) -> u16 {
        self.scan_capacity
    }

    /// Template count as reported by the sensor.
    pub async fn status<D: FingerprintDriver>(&self, session: &mut SensorSession<D>) -> Result<u16> {
        let count = session.driver()?.template_count().await?;
        session.record_template_count(count);
        debug!("Sensor reports {} templates", count);
        Ok(count)
    }

    /// Template count if the sensor can give one.
    ///
    /// A lost transport still fails. Any other count failure is logged and
    /// yields `None`.
    async fn known_count<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
    ) -> Result<Option<u16>> {
        let driver = session.driver()?;
        if !driver.capabilities().template_count {
            warn!("Sensor cannot report a template count");
            return Ok(None);
        }
        match driver.template_count().await {
            Ok(count) => {
                session.record_template_count(count);
                Ok(Some(count))
            }
            Err(e) if e.is_transport_failure() => Err(e.into()),
            Err(e) => {
                warn!("Template count unavailable: {}", e);
                Ok(None)
            }
        }
    }

    /// Sorted, duplicate-free list of occupied slots in `[0, scan_capacity)`.
    ///
    /// A probe fault counts as "not occupied" under
    /// [`ProbeFaultPolicy::TreatAsEmpty`] and aborts the scan under
    /// [`ProbeFaultPolicy::Abort`].
    pub async fn list_occupied<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
    ) -> Result<Vec<u16>> {
        let result = self.scan(session).await;
        session.release_buffers();
        result
    }

    async fn scan<D: FingerprintDriver>(&self, session: &mut SensorSession<D>) -> Result<Vec<u16>> {
        let mut occupied = Vec::new();
        for position in 0..self.scan_capacity {
            let occupancy = session.driver()?.probe_slot(position, PROBE_SCRATCH).await;
            session.mark_loaded(PROBE_SCRATCH);
            match occupancy {
                SlotOccupancy::Occupied => occupied.push(position),
                SlotOccupancy::Empty => {}
                SlotOccupancy::Fault(e) if e.is_transport_failure() => return Err(e.into()),
                SlotOccupancy::Fault(e) => match self.fault_policy {
                    ProbeFaultPolicy::TreatAsEmpty => {
                        warn!("Probe of slot {} faulted, skipping: {}", position, e)
                    }
                    ProbeFaultPolicy::Abort => {
                        return Err(Error::DeviceError(format!(
                            "probe of slot {position} failed: {e}"
                        )));
                    }
                },
            }
        }
        debug!("Occupied slots: {:?}", occupied);
        Ok(occupied)
    }

    /// Delete the template at `position`.
    ///
    /// # Errors
    ///
    /// - [`Error::SlotNotFound`] if `position` is outside the scanned range or
    ///   holds no template
    /// - [`Error::DeviceError`] for any other sensor fault
    pub async fn delete_slot<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
        position: u16,
    ) -> Result<()> {
        if position >= self.scan_capacity {
            return Err(Error::SlotNotFound(position));
        }
        let result = self.delete_checked(session, position).await;
        session.release_buffers();
        result
    }

    async fn delete_checked<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
        position: u16,
    ) -> Result<()> {
        let occupancy = session.driver()?.probe_slot(position, PROBE_SCRATCH).await;
        session.mark_loaded(PROBE_SCRATCH);
        match occupancy {
            SlotOccupancy::Occupied => {}
            SlotOccupancy::Empty => return Err(Error::SlotNotFound(position)),
            SlotOccupancy::Fault(e) => return Err(e.into()),
        }

        match session.driver()?.delete_template(position).await {
            Ok(()) => {
                info!("Deleted template at slot {}", position);
                Ok(())
            }
            Err(e) if e.is_empty_slot() => Err(Error::SlotNotFound(position)),
            Err(e) => Err(e.into()),
        }
    }

    /// Erase every template and return how many there were, if known.
    ///
    /// Nothing is sent when the sensor reports an empty database. A sensor
    /// that cannot count is erased anyway.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceError`] if the sensor refuses the erase
    /// - [`Error::HardwareUnavailable`] if the transport is lost
    pub async fn clear_all<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
    ) -> Result<Option<u16>> {
        let previous = self.known_count(session).await?;
        if previous == Some(0) {
            info!("Database already empty");
            return Ok(previous);
        }
        session.driver()?.clear_database().await?;
        session.record_template_count(0);
        match previous {
            Some(count) => info!("Cleared {} templates", count),
            None => info!("Cleared database, previous count unknown"),
        }
        Ok(previous)
    }

    /// Template count plus the occupied slots. The scan is skipped when the
    /// count is zero and still runs when the count is unknown.
    pub async fn report<D: FingerprintDriver>(
        &self,
        session: &mut SensorSession<D>,
    ) -> Result<DatabaseStatus> {
        let template_count = self.known_count(session).await?;
        let occupied = if template_count == Some(0) {
            Vec::new()
        } else {
            self.list_occupied(session).await?
        };
        Ok(DatabaseStatus {
            template_count,
            occupied,
        })
    }
}

impl Default for DatabaseMaintenance {
    fn default() -> Self {
        Self::new(SCAN_CAPACITY)
    }
}
