//! Migration result document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::progress::Phase;
use crate::transfer::RowError;

/// Terminal status of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Success,
    /// Committed, but some rows were skipped.
    Partial,
    /// Not attempted, or rolled back on cancellation.
    Skipped,
    Failed,
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Where and why a table failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableError {
    pub phase: Phase,
    pub message: String,
}

/// Outcome of one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    pub name: String,
    pub status: TableStatus,
    pub rows_copied: u64,
    pub rows_skipped: u64,
    pub duration_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<TableError>,

    /// Rows rejected under the skip-row policy.
    #[serde(default)]
    pub row_errors: Vec<RowError>,
}

impl TableResult {
    pub(crate) fn failed(name: &str, phase: Phase, message: String, duration_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            status: TableStatus::Failed,
            rows_copied: 0,
            rows_skipped: 0,
            duration_ms,
            error: Some(TableError { phase, message }),
            row_errors: Vec::new(),
        }
    }

    pub(crate) fn skipped(name: &str, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: TableStatus::Skipped,
            rows_copied: 0,
            rows_skipped: 0,
            duration_ms: 0,
            error: Some(TableError {
                phase,
                message: message.into(),
            }),
            row_errors: Vec::new(),
        }
    }
}

/// Type-mapping or data warning collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub column: Option<String>,
    pub message: String,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-table outcomes in processing order.
    pub tables: Vec<TableResult>,

    pub warnings: Vec<Warning>,

    /// Total rows committed across tables.
    pub rows_copied: u64,
}

impl MigrationResult {
    pub(crate) fn start(run_id: String) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            status: RunStatus::Success,
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
            tables: Vec::new(),
            warnings: Vec::new(),
            rows_copied: 0,
        }
    }

    /// Stamp completion time, totals and the overall status.
    pub(crate) fn finish(&mut self, aborted: bool, cancelled: bool) {
        self.completed_at = Utc::now();
        self.duration_seconds =
            (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.rows_copied = self.tables.iter().map(|t| t.rows_copied).sum();

        let committed = self.count(TableStatus::Success) + self.count(TableStatus::Partial);
        let all_failed = self.count(TableStatus::Failed) > 0 && committed == 0;

        self.status = if cancelled {
            RunStatus::Cancelled
        } else if aborted || all_failed {
            RunStatus::Failed
        } else if self.tables.iter().any(|t| t.status != TableStatus::Success) {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };
    }

    /// Table result by name.
    pub fn table(&self, name: &str) -> Option<&TableResult> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Count of tables with the given status.
    pub fn count(&self, status: TableStatus) -> usize {
        self.tables.iter().filter(|t| t.status == status).count()
    }

    /// Whether every table succeeded.
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Pretty-printed JSON document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
