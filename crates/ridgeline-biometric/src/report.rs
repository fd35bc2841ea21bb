//! Handing finished operations to whoever records them.
//!
//! The core does not know about HTTP, notification channels or storage. It
//! builds an [`OperationReport`] for every facade call and passes it to an
//! [`OutcomeReporter`]. [`TracingReporter`] is the default.

use chrono::{DateTime, Utc};
use ridgeline_core::{DatabaseStatus, Disposition, Enrollment, Error, ErrorKind, SearchOutcome};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

/// Facade operation a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Capture,
    Enroll,
    Search,
    Status,
    Report,
    ListOccupied,
    DeleteSlot,
    ClearAll,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Capture => "capture",
            Self::Enroll => "enroll",
            Self::Search => "search",
            Self::Status => "status",
            Self::Report => "report",
            Self::ListOccupied => "list_occupied",
            Self::DeleteSlot => "delete_slot",
            Self::ClearAll => "clear_all",
        };
        write!(f, "{}", name)
    }
}

/// Successful result of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomePayload {
    Image { path: PathBuf },
    Enrolled(Enrollment),
    Search(SearchOutcome),
    TemplateCount { count: u16 },
    Status(DatabaseStatus),
    Occupied { slots: Vec<u16> },
    Deleted { slot: u16 },
    Cleared { previous_count: Option<u16> },
}

/// Success flag plus payload, or a typed failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationOutcome {
    Succeeded {
        payload: OutcomePayload,
    },
    Failed {
        kind: ErrorKind,
        disposition: Disposition,
        message: String,
    },
}

impl OperationOutcome {
    pub fn failed(error: &Error) -> Self {
        Self::Failed {
            kind: error.kind(),
            disposition: error.disposition(),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// One finished facade call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationReport {
    pub operation: Operation,
    pub port: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: OperationOutcome,
}

/// Receives a report for every completed operation, success or failure.
pub trait OutcomeReporter: Send + Sync {
    fn report(&self, report: &OperationReport);
}

/// Logs each report through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl OutcomeReporter for TracingReporter {
    fn report(&self, report: &OperationReport) {
        match &report.outcome {
            OperationOutcome::Succeeded { payload } => info!(
                operation = %report.operation,
                port = %report.port,
                elapsed_ms = report.elapsed_ms,
                "Operation succeeded: {:?}",
                payload
            ),
            OperationOutcome::Failed {
                kind,
                disposition,
                message,
            } => warn!(
                operation = %report.operation,
                port = %report.port,
                elapsed_ms = report.elapsed_ms,
                ?kind,
                ?disposition,
                "Operation failed: {}",
                message
            ),
        }
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<OperationReport>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<OperationReport> {
        self.reports.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last(&self) -> Option<OperationReport> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl OutcomeReporter for CollectingReporter {
    fn report(&self, report: &OperationReport) {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report.clone());
    }
}
