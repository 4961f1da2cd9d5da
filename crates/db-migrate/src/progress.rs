//! Structured progress events and the sinks that receive them.
//!
//! The orchestrator emits one [`ProgressEvent`] per lifecycle step. Sinks
//! must not block: they are called inline from the copy loop.

use std::io::Write;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Stage of the per-table state machine an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Never started: the run stopped before reaching the table.
    Pending,
    SchemaFetch,
    TypeMap,
    Ddl,
    DataCopy,
    Commit,
    Cancelled,
}

impl Phase {
    /// Phase name as it appears in events and results.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::SchemaFetch => "schema_fetch",
            Phase::TypeMap => "type_map",
            Phase::Ddl => "ddl",
            Phase::DataCopy => "data_copy",
            Phase::Commit => "commit",
            Phase::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle event of a migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    TableStarted {
        table: String,
    },
    /// A batch was written inside the table's transaction.
    BatchCommitted {
        table: String,
        rows: u64,
    },
    TableFinished {
        table: String,
        rows: u64,
        duration_ms: u64,
    },
    /// Lossy or fallback type mapping, skipped row, dropped default...
    Warning {
        table: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        column: Option<String>,
        message: String,
    },
    Error {
        table: String,
        phase: Phase,
        message: String,
    },
}

impl ProgressEvent {
    /// Table the event refers to.
    pub fn table(&self) -> &str {
        match self {
            ProgressEvent::TableStarted { table }
            | ProgressEvent::BatchCommitted { table, .. }
            | ProgressEvent::TableFinished { table, .. }
            | ProgressEvent::Warning { table, .. }
            | ProgressEvent::Error { table, .. } => table,
        }
    }
}

/// Receiver of progress events.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Turns events into `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::TableStarted { table } => info!(table = %table, "Table started"),
            ProgressEvent::BatchCommitted { table, rows } => {
                tracing::debug!(table = %table, rows, "Batch written")
            }
            ProgressEvent::TableFinished {
                table,
                rows,
                duration_ms,
            } => info!(table = %table, rows, duration_ms, "Table finished"),
            ProgressEvent::Warning {
                table,
                column,
                message,
            } => match column {
                Some(column) => warn!(table = %table, column = %column, "{}", message),
                None => warn!(table = %table, "{}", message),
            },
            ProgressEvent::Error {
                table,
                phase,
                message,
            } => error!(table = %table, phase = %phase, "{}", message),
        }
    }
}

/// Forwards events to an unbounded channel, for UIs and tests.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl JsonLinesSink<std::io::Stderr> {
    /// Sink writing to stderr, keeping stdout free for the result document.
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ProgressSink for JsonLinesSink<W> {
    fn emit(&self, event: ProgressEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize progress event: {}", e);
                return;
            }
        };
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            warn!("Failed to write progress event: {}", e);
        }
    }
}
