//! Batched copy of one table inside the target's open transaction.
//!
//! The source adapter streams batches over a bounded channel (read-ahead);
//! this module is the single consumer. Each batch is written atomically by
//! the target adapter. What happens when a batch fails depends on the job's
//! [`OnErrorPolicy`]:
//!
//! - lock contention is retried once after a short backoff, whatever the policy
//! - `skip-row` re-issues the batch one row at a time and records each row
//!   that still fails as a [`RowError`]
//! - `abort` and `skip-table` hand the error back so the caller rolls the
//!   whole table back

use std::slice;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{MigrationJob, OnErrorPolicy};
use crate::core::schema::TableDescriptor;
use crate::core::traits::Adapter;
use crate::core::value::{Batch, Row};
use crate::error::{MigrateError, Result};
use crate::progress::{ProgressEvent, ProgressSink};

/// A row that could not be written under the skip-row policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// Position of the row in the table's read order.
    pub row_index: usize,

    /// Driver message.
    pub message: String,
}

/// Knobs for one table copy.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub batch_size: usize,
    pub read_ahead: usize,
    pub on_error: OnErrorPolicy,
    pub lock_retry_backoff: Duration,
}

impl CopyOptions {
    pub fn from_job(job: &MigrationJob) -> Self {
        Self {
            batch_size: job.batch_size,
            read_ahead: job.read_ahead_batches,
            on_error: job.on_error,
            lock_retry_backoff: Duration::from_millis(job.lock_retry_backoff_ms),
        }
    }
}

/// What a completed copy wrote and skipped.
#[derive(Debug, Clone, Default)]
pub struct CopyOutcome {
    pub rows_copied: u64,
    pub row_errors: Vec<RowError>,
    pub batches: usize,
}

/// Copy every row of `table` from `source` into the target table of the
/// same name.
///
/// The target must have a transaction open. Cancellation is honored
/// between batches and surfaces as [`MigrateError::Cancelled`]; the caller
/// rolls back. Any other error means the table must be rolled back too.
pub async fn copy_table<S, T>(
    source: &S,
    target: &mut T,
    table: &TableDescriptor,
    options: &CopyOptions,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<CopyOutcome>
where
    S: Adapter + ?Sized,
    T: Adapter + ?Sized,
{
    let columns = table.column_names();
    let mut rx = source.read_rows(table, options.batch_size, options.read_ahead);
    let mut outcome = CopyOutcome::default();

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("{}: cancelled after {} batches", table.name, outcome.batches);
                return Err(MigrateError::Cancelled);
            }
            item = rx.recv() => item,
        };

        let batch = match item {
            Some(batch) => batch?,
            None => {
                return Err(MigrateError::read(
                    &table.name,
                    "reader stopped before the final batch",
                ))
            }
        };

        if !batch.is_empty() {
            let written = write_batch(target, table, &columns, &batch, options, &mut outcome).await?;
            outcome.rows_copied += written;
            outcome.batches += 1;
            sink.emit(ProgressEvent::BatchCommitted {
                table: table.name.clone(),
                rows: written,
            });
        }

        if batch.is_last {
            break;
        }
    }

    debug!(
        "{}: copied {} rows in {} batches ({} skipped)",
        table.name,
        outcome.rows_copied,
        outcome.batches,
        outcome.row_errors.len()
    );
    Ok(outcome)
}

/// Write one batch, applying the on-error policy. Returns rows written.
async fn write_batch<T>(
    target: &mut T,
    table: &TableDescriptor,
    columns: &[String],
    batch: &Batch,
    options: &CopyOptions,
    outcome: &mut CopyOutcome,
) -> Result<u64>
where
    T: Adapter + ?Sized,
{
    match write_with_retry(target, &table.name, columns, &batch.rows, options).await {
        Ok(n) => Ok(n),
        Err(e @ MigrateError::DataCopy { .. }) if options.on_error == OnErrorPolicy::SkipRow => {
            warn!(
                "{}: batch at row {} failed ({}), retrying rows individually",
                table.name, batch.offset, e
            );
            write_rows_individually(target, table, columns, batch, options, outcome).await
        }
        Err(e) => Err(e),
    }
}

async fn write_rows_individually<T>(
    target: &mut T,
    table: &TableDescriptor,
    columns: &[String],
    batch: &Batch,
    options: &CopyOptions,
    outcome: &mut CopyOutcome,
) -> Result<u64>
where
    T: Adapter + ?Sized,
{
    let mut written = 0;
    for (i, row) in batch.rows.iter().enumerate() {
        match write_with_retry(target, &table.name, columns, slice::from_ref(row), options).await {
            Ok(n) => written += n,
            Err(MigrateError::DataCopy { message, .. }) => {
                let row_index = batch.offset + i;
                warn!("{}: skipping row {}: {}", table.name, row_index, message);
                outcome.row_errors.push(RowError { row_index, message });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

/// `write_rows`, retried once after the backoff when the failure was lock
/// contention.
async fn write_with_retry<T>(
    target: &mut T,
    table: &str,
    columns: &[String],
    rows: &[Row],
    options: &CopyOptions,
) -> Result<u64>
where
    T: Adapter + ?Sized,
{
    match target.write_rows(table, columns, rows).await {
        Err(e) if e.is_retryable() => {
            warn!(
                "{}: lock contention ({}), retrying in {:?}",
                table, e, options.lock_retry_backoff
            );
            tokio::time::sleep(options.lock_retry_backoff).await;
            target.write_rows(table, columns, rows).await
        }
        other => other,
    }
}
