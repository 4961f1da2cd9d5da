//! # db-migrate
//!
//! Cross-engine schema and data migration between MySQL, SQLite and
//! PostgreSQL.
//!
//! - **Uniform adapters** for the three engines behind one [`Adapter`] contract
//! - **Type translation** through a generic type category, total over every
//!   native type (unknown types fall back to TEXT or BLOB with a warning)
//! - **Per-table transactions**: a table is either fully committed or absent
//! - **On-error policies**: abort, skip the table, or skip individual rows
//! - **Cancellation** between tables and between batches
//!
//! ## Example
//!
//! ```rust,no_run
//! use db_migrate::{MigrationJob, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> db_migrate::Result<()> {
//!     let job = MigrationJob::load("migration.yaml")?;
//!     let result = Orchestrator::new(job).run().await?;
//!     println!("{}: {} rows", result.status.as_str(), result.rows_copied);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod progress;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use config::{ConnectionConfig, DialectKind, MigrationJob, OnErrorPolicy};
pub use crate::core::{Adapter, Batch, ColumnDescriptor, Dialect, SqlValue, TableDescriptor};
pub use dialect::GenericType;
pub use drivers::{connect, AdapterImpl, DialectImpl, Role};
pub use error::{MigrateError, Result};
pub use export::{export_sql, TableExport};
pub use orchestrator::{
    HealthCheckResult, MigrationPlan, MigrationResult, Orchestrator, RunStatus, TableResult,
    TableStatus,
};
pub use progress::{
    ChannelSink, JsonLinesSink, NoopSink, Phase, ProgressEvent, ProgressSink, TracingSink,
};
pub use transfer::RowError;
pub use tokio_util::sync::CancellationToken;
