//! Operation-scoped access to one sensor.
//!
//! ```text
//! caller ──> FingerprintScanner::enroll()
//!              │
//!              ├─> PortLocks::acquire(port)      one operation per port
//!              ├─> SensorSession::connect()
//!              ├─> EnrollmentWorkflow::run()
//!              ├─> SensorSession::disconnect()  every path
//!              └─> OutcomeReporter::report()
//! ```

use crate::capture::CaptureCoordinator;
use crate::config::ScannerConfig;
use crate::enroll::EnrollmentWorkflow;
use crate::identify::IdentificationWorkflow;
use crate::image_store::ImageStore;
use crate::maintenance::DatabaseMaintenance;
use crate::report::{
    Operation, OperationOutcome, OperationReport, OutcomePayload, OutcomeReporter,
    TracingReporter,
};
use crate::session::SensorSession;
use chrono::Utc;
use ridgeline_core::{DatabaseStatus, Enrollment, Result, SearchOutcome};
use ridgeline_hardware::Connector;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::debug;

/// One exclusive lock per serial port name.
///
/// Clones share the same table, so scanners built from one `PortLocks` never
/// open the same port at the same time.
#[derive(Debug, Clone, Default)]
pub struct PortLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl PortLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, port: &str) -> Arc<AsyncMutex<()>> {
        let mut table = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(table.entry(port.to_string()).or_default())
    }

    /// Wait for exclusive use of `port`. Released when the guard drops.
    pub async fn acquire(&self, port: &str) -> OwnedMutexGuard<()> {
        self.lock_for(port).lock_owned().await
    }
}

/// Entry point for callers that just want an operation done.
///
/// Every method locks the port, opens a fresh [`SensorSession`], runs one
/// workflow, disconnects and reports the outcome. Nothing is retried.
///
/// # Examples
///
/// ```
/// use ridgeline_biometric::{FingerprintScanner, ScannerConfig};
/// use ridgeline_core::{SearchOutcome, SensorConfig};
/// use ridgeline_hardware::mock::MockConnector;
///
/// # #[tokio::main(flavor = "current_thread", start_paused = true)]
/// # async fn main() -> ridgeline_core::Result<()> {
/// let (connector, handle) = MockConnector::new();
/// handle.preload(3, vec![5; 8]);
/// handle.present_finger(vec![5; 8]);
///
/// let scanner = FingerprintScanner::new(ScannerConfig::new(SensorConfig::new("sim")), connector);
/// let outcome = scanner.search(scanner.default_timeout()).await?;
///
/// assert_eq!(outcome.slot(), Some(3));
/// assert_eq!(handle.close_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct FingerprintScanner<C: Connector> {
    config: ScannerConfig,
    connector: C,
    locks: PortLocks,
    reporter: Arc<dyn OutcomeReporter>,
    capture: CaptureCoordinator,
    enrollment: EnrollmentWorkflow,
    identification: IdentificationWorkflow,
    maintenance: DatabaseMaintenance,
    images: ImageStore,
}

impl<C: Connector> FingerprintScanner<C> {
    pub fn new(config: ScannerConfig, connector: C) -> Self {
        let capture = CaptureCoordinator::new(config.poll_interval);
        Self {
            enrollment: EnrollmentWorkflow::from_config(&config),
            identification: IdentificationWorkflow::new(capture, config.allocation_capacity),
            maintenance: DatabaseMaintenance::new(config.scan_capacity)
                .with_fault_policy(config.probe_fault_policy),
            images: ImageStore::new(config.images_dir.clone()),
            capture,
            config,
            connector,
            locks: PortLocks::new(),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn OutcomeReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Share port locks with other scanners.
    pub fn with_port_locks(mut self, locks: PortLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.capture_timeout
    }

    /// Capture one image and write it under the images directory.
    pub async fn capture(&self, timeout: Duration) -> Result<PathBuf> {
        self.perform(
            Operation::Capture,
            async |session| {
                self.capture
                    .capture_and_save(session, timeout, &self.images)
                    .await
            },
            |path| OutcomePayload::Image { path: path.clone() },
        )
        .await
    }

    pub async fn enroll(&self, timeout: Duration) -> Result<Enrollment> {
        self.perform(
            Operation::Enroll,
            async |session| self.enrollment.run(session, timeout).await,
            |enrollment| OutcomePayload::Enrolled(*enrollment),
        )
        .await
    }

    pub async fn search(&self, timeout: Duration) -> Result<SearchOutcome> {
        self.perform(
            Operation::Search,
            async |session| self.identification.run(session, timeout).await,
            |outcome| OutcomePayload::Search(*outcome),
        )
        .await
    }

    pub async fn status(&self) -> Result<u16> {
        self.perform(
            Operation::Status,
            async |session| self.maintenance.status(session).await,
            |count| OutcomePayload::TemplateCount { count: *count },
        )
        .await
    }

    /// Template count plus the occupied slot list.
    pub async fn report(&self) -> Result<DatabaseStatus> {
        self.perform(
            Operation::Report,
            async |session| self.maintenance.report(session).await,
            |status| OutcomePayload::Status(status.clone()),
        )
        .await
    }

    pub async fn list_occupied(&self) -> Result<Vec<u16>> {
        self.perform(
            Operation::ListOccupied,
            async |session| self.maintenance.list_occupied(session).await,
            |slots| OutcomePayload::Occupied {
                slots: slots.clone(),
            },
        )
        .await
    }

    pub async fn delete_slot(&self, position: u16) -> Result<()> {
        self.perform(
            Operation::DeleteSlot,
            async |session| self.maintenance.delete_slot(session, position).await,
            |_| OutcomePayload::Deleted { slot: position },
        )
        .await
    }

    /// Erase the whole database. Returns the previous template count, or
    /// `None` when the sensor could not report one.
    ///
    /// Irreversible; confirm with the operator first.
    pub async fn clear_all(&self) -> Result<Option<u16>> {
        self.perform(
            Operation::ClearAll,
            async |session| self.maintenance.clear_all(session).await,
            |count| OutcomePayload::Cleared {
                previous_count: *count,
            },
        )
        .await
    }

    async fn perform<T, F, P>(&self, operation: Operation, work: F, payload: P) -> Result<T>
    where
        F: AsyncFnOnce(&mut SensorSession<C::Driver>) -> Result<T>,
        P: FnOnce(&T) -> OutcomePayload,
    {
        let port = self.config.sensor.port.clone();
        let _guard = self.locks.acquire(&port).await;
        debug!("{} on {}: port lock acquired", operation, port);

        let started_at = Utc::now();
        let started = Instant::now();

        let mut session = SensorSession::new(self.config.sensor.clone());
        let result = match session.connect(&self.connector).await {
            Ok(()) => work(&mut session).await,
            Err(e) => Err(e),
        };
        if let Some(count) = session.last_template_count() {
            self.enrollment.allocator().remember_count(count);
        }
        session.disconnect();

        let outcome = match &result {
            Ok(value) => OperationOutcome::Succeeded {
                payload: payload(value),
            },
            Err(e) => OperationOutcome::failed(e),
        };
        self.reporter.report(&OperationReport {
            operation,
            port,
            started_at,
            elapsed_ms: started.elapsed().as_millis().try_into().unwrap_or(u64::MAX),
            outcome,
        });
        result
    }
}

impl<C: Connector + std::fmt::Debug> std::fmt::Debug for FingerprintScanner<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintScanner")
            .field("config", &self.config)
            .field("connector", &self.connector)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_port_shares_lock() {
        let locks = PortLocks::new();
        let a = locks.lock_for("/dev/ttyUSB0");
        let b = locks.clone().lock_for("/dev/ttyUSB0");
        let c = locks.lock_for("/dev/ttyUSB1");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_guard_excludes_second_acquire() {
        let locks = PortLocks::new();
        let guard = locks.acquire("COM3").await;
        assert!(locks.lock_for("COM3").try_lock().is_err());
        assert!(locks.lock_for("COM4").try_lock().is_ok());

        drop(guard);
        assert!(locks.lock_for("COM3").try_lock().is_ok());
    }
}
