//! Savepoint-guarded batch writes shared by every driver.
//!
//! A batch is written as chunked multi-row INSERTs under a savepoint. When a
//! chunk fails the savepoint is rolled back and the batch is retried one row
//! at a time to find the first offending row, which is rolled back again so
//! the call leaves nothing behind.

use async_trait::async_trait;
use tracing::debug;

use crate::core::Row;
use crate::error::{MigrateError, Result};

/// Savepoint name used by every driver.
pub const SAVEPOINT: &str = "dbm_batch";

/// A driver-level failure before it is attributed to a table and row.
#[derive(Debug, Clone)]
pub struct DriverFailure {
    pub message: String,
    pub retryable: bool,
}

impl DriverFailure {
    pub fn new(message: impl std::fmt::Display, retryable: bool) -> Self {
        Self {
            message: message.to_string(),
            retryable,
        }
    }
}

impl std::fmt::Display for DriverFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Statement execution on a connection that already has a transaction open.
#[async_trait]
pub trait BatchInserter: Send {
    /// Run a statement without parameters (SAVEPOINT and friends).
    async fn exec(&mut self, sql: &str) -> std::result::Result<(), DriverFailure>;

    /// Insert `rows` with a single multi-row INSERT.
    async fn insert(
        &mut self,
        columns: &[String],
        rows: &[Row],
    ) -> std::result::Result<u64, DriverFailure>;
}

/// Write `rows` so that either all of them land or none does.
pub async fn write_batch_atomic<I: BatchInserter + ?Sized>(
    ins: &mut I,
    table: &str,
    columns: &[String],
    rows: &[Row],
    rows_per_stmt: usize,
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    ins.exec(&format!("SAVEPOINT {}", SAVEPOINT))
        .await
        .map_err(|e| MigrateError::transaction(format!("SAVEPOINT failed: {}", e)))?;

    let mut written = 0u64;
    let mut failure = None;
    for chunk in rows.chunks(rows_per_stmt.max(1)) {
        match ins.insert(columns, chunk).await {
            Ok(n) => written += n,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    let Some(failure) = failure else {
        ins.exec(&format!("RELEASE SAVEPOINT {}", SAVEPOINT))
            .await
            .map_err(|e| MigrateError::transaction(format!("RELEASE SAVEPOINT failed: {}", e)))?;
        return Ok(written);
    };

    rollback_to_savepoint(ins).await?;

    if failure.retryable {
        release_savepoint(ins).await?;
        return Err(MigrateError::DataCopy {
            table: table.to_string(),
            row_index: None,
            message: failure.message,
            retryable: true,
        });
    }

    if rows.len() == 1 {
        release_savepoint(ins).await?;
        return Err(MigrateError::write(table, 0, failure.message, false));
    }

    debug!(
        "{}: batch of {} rows failed ({}), probing row by row",
        table,
        rows.len(),
        failure
    );

    for (i, row) in rows.iter().enumerate() {
        if let Err(e) = ins.insert(columns, std::slice::from_ref(row)).await {
            rollback_to_savepoint(ins).await?;
            release_savepoint(ins).await?;
            return Err(MigrateError::write(table, i, e.message, e.retryable));
        }
    }

    // Every row went in on its own; the multi-row statement failed for a
    // reason tied to the statement (packet size, parameter count).
    release_savepoint(ins).await?;
    Ok(rows.len() as u64)
}

async fn rollback_to_savepoint<I: BatchInserter + ?Sized>(ins: &mut I) -> Result<()> {
    ins.exec(&format!("ROLLBACK TO SAVEPOINT {}", SAVEPOINT))
        .await
        .map_err(|e| MigrateError::transaction(format!("ROLLBACK TO SAVEPOINT failed: {}", e)))
}

async fn release_savepoint<I: BatchInserter + ?Sized>(ins: &mut I) -> Result<()> {
    ins.exec(&format!("RELEASE SAVEPOINT {}", SAVEPOINT))
        .await
        .map_err(|e| MigrateError::transaction(format!("RELEASE SAVEPOINT failed: {}", e)))
}

/// Whether a database error is transient lock contention.
///
/// SQLite: SQLITE_BUSY (5), SQLITE_LOCKED (6) and their extended codes.
/// MySQL: 1205 lock wait timeout. 1213 (deadlock) is excluded because the
/// server has already rolled back the whole transaction.
/// PostgreSQL: serialization failure, deadlock, lock not available.
pub fn is_lock_error(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = err else {
        return false;
    };

    if let Some(my) = db.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
        return my.number() == 1205;
    }

    match db.code().as_deref() {
        Some("5" | "6" | "261" | "262" | "517") => return true,
        Some("40001" | "40P01" | "55P03") => return true,
        _ => {}
    }

    let msg = db.message().to_lowercase();
    msg.contains("database is locked") || msg.contains("database table is locked") || msg.contains("busy")
}

/// SQLSTATE classes PostgreSQL uses for lock contention.
pub fn is_pg_lock_state(state: &str) -> bool {
    matches!(state, "40001" | "40P01" | "55P03")
}
