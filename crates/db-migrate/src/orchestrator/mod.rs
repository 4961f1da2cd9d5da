//! Migration orchestrator - main workflow coordinator.
//!
//! ```text
//! CONNECTING -> LISTING_TABLES -> for each table:
//!     SCHEMA_FETCH -> TYPE_MAP -> DDL_CREATE -> DATA_COPY -> COMMIT_OR_ROLLBACK
//! -> DONE | FAILED (abort policy) | CANCELLED
//! ```
//!
//! Connection and listing failures are returned as `Err`. Everything that
//! goes wrong inside a table is recorded in its [`TableResult`] and the
//! on-error policy decides whether the loop continues.

mod result;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ConnectionConfig, DialectKind, MigrationJob, OnErrorPolicy};
use crate::core::schema::{ColumnDescriptor, TableDescriptor};
use crate::core::traits::{Adapter, TypeMapper};
use crate::dialect::{mapper, ComposedMapper, GenericType};
use crate::drivers::{self, Role};
use crate::error::{MigrateError, Result};
use crate::progress::{Phase, ProgressEvent, ProgressSink, TracingSink};
use crate::transfer::{copy_table, CopyOptions};

pub use result::{MigrationResult, RunStatus, TableError, TableResult, TableStatus, Warning};

/// Migration orchestrator.
pub struct Orchestrator {
    job: MigrationJob,
}

impl Orchestrator {
    /// Create an orchestrator for a validated job.
    pub fn new(job: MigrationJob) -> Self {
        Self { job }
    }

    pub fn job(&self) -> &MigrationJob {
        &self.job
    }

    /// Run the job, logging progress through `tracing`.
    pub async fn run(&self) -> Result<MigrationResult> {
        self.run_with(&TracingSink, CancellationToken::new()).await
    }

    /// Run the job with an explicit progress sink and cancellation token.
    ///
    /// Both adapters are closed on every exit path.
    pub async fn run_with(
        &self,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> Result<MigrationResult> {
        let mut source = drivers::connect(&self.job.source, Role::Source).await?;
        let mut target = match drivers::connect(&self.job.target, Role::Target).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        let result = self.migrate(&mut source, &mut target, sink, &cancel).await;

        target.close().await;
        source.close().await;
        result
    }

    /// Migrate between two already-open adapters.
    pub async fn migrate<S, T>(
        &self,
        source: &mut S,
        target: &mut T,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<MigrationResult>
    where
        S: Adapter + ?Sized,
        T: Adapter + ?Sized,
    {
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut result = MigrationResult::start(run_id);
        info!(
            "Starting migration run {}: {} -> {}",
            result.run_id,
            source.display_name(),
            target.display_name()
        );

        let tables = self.job.filter_tables(source.list_tables().await?);
        info!("Found {} tables to migrate", tables.len());

        let type_mapper = mapper(source.dialect(), target.dialect());
        let options = CopyOptions::from_job(&self.job);
        let mut aborted = false;
        let mut cancelled = false;

        for (i, name) in tables.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Cancellation requested, {} tables not started", tables.len() - i);
                cancelled = true;
                skip_remaining(&mut result, &tables[i..], "run cancelled");
                break;
            }

            let table_result = self
                .migrate_table(
                    source,
                    target,
                    name,
                    &type_mapper,
                    &options,
                    sink,
                    cancel,
                    &mut result.warnings,
                )
                .await;

            let status = table_result.status;
            let was_cancelled = table_result
                .error
                .as_ref()
                .is_some_and(|e| e.phase == Phase::Cancelled);
            result.tables.push(table_result);

            if was_cancelled {
                cancelled = true;
                skip_remaining(&mut result, &tables[i + 1..], "run cancelled");
                break;
            }
            if status == TableStatus::Failed && self.job.on_error == OnErrorPolicy::Abort {
                warn!("Aborting run after failure of table {}", name);
                aborted = true;
                skip_remaining(
                    &mut result,
                    &tables[i + 1..],
                    format!("run aborted after table {} failed", name),
                );
                break;
            }
        }

        result.finish(aborted, cancelled);
        info!(
            "Migration {}: {} tables ({} ok, {} partial, {} failed, {} skipped), {} rows in {:.1}s",
            result.status.as_str(),
            result.tables.len(),
            result.count(TableStatus::Success),
            result.count(TableStatus::Partial),
            result.count(TableStatus::Failed),
            result.count(TableStatus::Skipped),
            result.rows_copied,
            result.duration_seconds
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn migrate_table<S, T>(
        &self,
        source: &mut S,
        target: &mut T,
        name: &str,
        type_mapper: &ComposedMapper,
        options: &CopyOptions,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
        warnings: &mut Vec<Warning>,
    ) -> TableResult
    where
        S: Adapter + ?Sized,
        T: Adapter + ?Sized,
    {
        let started = Instant::now();
        sink.emit(ProgressEvent::TableStarted {
            table: name.to_string(),
        });

        let fail = |phase: Phase, err: MigrateError| {
            let message = err.to_string();
            error!("Table {} failed during {}: {}", name, phase, message);
            sink.emit(ProgressEvent::Error {
                table: name.to_string(),
                phase,
                message: message.clone(),
            });
            TableResult::failed(name, phase, message, elapsed_ms(started))
        };

        // SCHEMA_FETCH
        let source_table = match source.get_schema(name).await {
            Ok(t) => t,
            Err(e) => return fail(Phase::SchemaFetch, e),
        };

        // TYPE_MAP
        let (target_table, table_warnings) =
            match translate_table(&source_table, type_mapper, target.dialect()) {
                Ok(t) => t,
                Err(e) => return fail(Phase::TypeMap, e),
            };
        if let Err(e) = target_table
            .columns
            .iter()
            .try_for_each(|c| target.quote_identifier(&c.name).map(|_| ()))
        {
            return fail(Phase::TypeMap, e);
        }
        for w in table_warnings {
            sink.emit(ProgressEvent::Warning {
                table: w.table.clone(),
                column: w.column.clone(),
                message: w.message.clone(),
            });
            warnings.push(w);
        }

        // DDL_CREATE
        if let Err(e) = target.begin_transaction().await {
            return fail(Phase::Ddl, e);
        }
        if let Err(e) = target
            .create_table(&target_table, self.job.drop_target_tables_first)
            .await
        {
            rollback(target, name).await;
            return fail(Phase::Ddl, e);
        }

        // DATA_COPY
        let outcome = match copy_table(&*source, target, &source_table, options, sink, cancel).await
        {
            Ok(outcome) => outcome,
            Err(MigrateError::Cancelled) => {
                rollback(target, name).await;
                info!("Table {} rolled back on cancellation", name);
                let mut skipped =
                    TableResult::skipped(name, Phase::Cancelled, "cancelled, transaction rolled back");
                skipped.duration_ms = elapsed_ms(started);
                return skipped;
            }
            Err(e) => {
                rollback(target, name).await;
                return fail(Phase::DataCopy, e);
            }
        };

        // COMMIT
        if let Err(e) = target.commit().await {
            rollback(target, name).await;
            return fail(Phase::Commit, e);
        }

        let duration_ms = elapsed_ms(started);
        for row_error in &outcome.row_errors {
            let message = format!("row {} skipped: {}", row_error.row_index, row_error.message);
            sink.emit(ProgressEvent::Warning {
                table: name.to_string(),
                column: None,
                message: message.clone(),
            });
            warnings.push(Warning {
                table: name.to_string(),
                column: None,
                message,
            });
        }
        sink.emit(ProgressEvent::TableFinished {
            table: name.to_string(),
            rows: outcome.rows_copied,
            duration_ms,
        });

        TableResult {
            name: name.to_string(),
            status: if outcome.row_errors.is_empty() {
                TableStatus::Success
            } else {
                TableStatus::Partial
            },
            rows_copied: outcome.rows_copied,
            rows_skipped: outcome.row_errors.len() as u64,
            duration_ms,
            error: None,
            row_errors: outcome.row_errors,
        }
    }

    /// Dry run: list the tables and the column types they would be created
    /// with, without touching the target.
    pub async fn plan(&self) -> Result<MigrationPlan> {
        let mut source = drivers::connect(&self.job.source, Role::Source).await?;
        let result = self.plan_with(&mut source, self.job.target.dialect).await;
        source.close().await;
        result
    }

    /// [`plan`](Self::plan) over an open source adapter.
    pub async fn plan_with<S>(&self, source: &mut S, target: DialectKind) -> Result<MigrationPlan>
    where
        S: Adapter + ?Sized,
    {
        let type_mapper = mapper(source.dialect(), target);
        let names = self.job.filter_tables(source.list_tables().await?);
        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let schema = source.get_schema(&name).await?;
            let columns = schema
                .columns
                .iter()
                .map(|c| {
                    let mapping = type_mapper.map_column(c);
                    ColumnPlan {
                        name: c.name.clone(),
                        source_type: c.native_type.clone(),
                        target_type: mapping.target_type,
                        warning: mapping.warning,
                    }
                })
                .collect();
            tables.push(TablePlan {
                name,
                primary_key: schema.primary_key,
                columns,
            });
        }
        Ok(MigrationPlan {
            source: source.dialect(),
            target,
            tables,
        })
    }

    /// Connect to both endpoints independently and report on each.
    pub async fn health_check(job: &MigrationJob) -> HealthCheckResult {
        let source = check_endpoint(&job.source, Role::Source).await;
        let target = check_endpoint(&job.target, Role::Target).await;
        HealthCheckResult {
            healthy: source.connected && target.connected,
            source,
            target,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

async fn rollback<T: Adapter + ?Sized>(target: &mut T, table: &str) {
    if let Err(e) = target.rollback().await {
        warn!("Rollback of table {} failed: {}", table, e);
    }
}

fn skip_remaining(result: &mut MigrationResult, names: &[String], reason: impl Into<String>) {
    let reason = reason.into();
    for name in names {
        result
            .tables
            .push(TableResult::skipped(name, Phase::Pending, reason.clone()));
    }
}

/// Build the target descriptor: every column's native type replaced by the
/// target's, defaults kept only when portable.
pub(crate) fn translate_table(
    source: &TableDescriptor,
    type_mapper: &ComposedMapper,
    target: DialectKind,
) -> Result<(TableDescriptor, Vec<Warning>)> {
    if source.columns.is_empty() {
        return Err(MigrateError::schema(&source.name, "table has no columns"));
    }

    let mut warnings = Vec::new();
    let mut columns = Vec::with_capacity(source.columns.len());
    for col in &source.columns {
        let mapping = type_mapper.map_column(col);
        if let Some(message) = mapping.warning {
            warn!("{}.{}: {}", source.name, col.name, message);
            warnings.push(Warning {
                table: source.name.clone(),
                column: Some(col.name.clone()),
                message,
            });
        }

        let mut mapped = ColumnDescriptor {
            native_type: mapping.target_type,
            generic: mapping.generic,
            default_value: None,
            ..col.clone()
        };
        match translate_default(col, target) {
            Some(default) => mapped.default_value = Some(default),
            None => {
                if let Some(raw) = col.default_value.as_deref() {
                    warnings.push(Warning {
                        table: source.name.clone(),
                        column: Some(col.name.clone()),
                        message: format!("default {} is not portable and was dropped", raw),
                    });
                }
            }
        }
        columns.push(mapped);
    }

    let mut table = TableDescriptor::new(source.name.clone(), columns);
    table.primary_key = source.primary_key.clone();
    Ok((table, warnings))
}

/// Default expression for the target, if the source default is portable.
///
/// PostgreSQL rejects an integer default on a BOOLEAN column, so 0/1 flags
/// are quoted there (`'1'` is valid boolean input).
fn translate_default(col: &ColumnDescriptor, target: DialectKind) -> Option<String> {
    let default = col.portable_default()?;
    if default == "NULL" {
        return Some(default.to_string());
    }
    if target == DialectKind::Postgresql
        && col.generic == GenericType::Boolean
        && !default.starts_with('\'')
    {
        return Some(format!("'{}'", default));
    }
    Some(default.to_string())
}

/// Dry-run description of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub source: DialectKind,
    pub target: DialectKind,
    pub tables: Vec<TablePlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePlan {
    pub name: String,
    pub primary_key: Vec<String>,
    pub columns: Vec<ColumnPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnPlan {
    pub name: String,
    pub source_type: String,
    pub target_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub warning: Option<String>,
}

/// Result of a health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Whether both endpoints accepted a connection.
    pub healthy: bool,
    pub source: EndpointHealth,
    pub target: EndpointHealth,
}

/// Connection test of one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub dialect: DialectKind,
    pub connected: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub server_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

async fn check_endpoint(config: &ConnectionConfig, role: Role) -> EndpointHealth {
    let started = Instant::now();
    let mut health = EndpointHealth {
        dialect: config.dialect,
        connected: false,
        latency_ms: 0,
        server_version: None,
        error: None,
    };

    let connect = drivers::connect(config, role);
    let timeout = Duration::from_secs(config.connect_timeout_secs.max(1));
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(mut adapter)) => {
            health.connected = true;
            match adapter.server_version().await {
                Ok(v) => health.server_version = Some(v),
                Err(e) => health.error = Some(e.to_string()),
            }
            adapter.close().await;
        }
        Ok(Err(e)) => health.error = Some(e.to_string()),
        Err(_) => health.error = Some(format!("timed out after {:?}", timeout)),
    }
    health.latency_ms = elapsed_ms(started);
    health
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::{Row, SqlValue};
    use crate::progress::{ChannelSink, NoopSink};
    use crate::testing::{int_rows, simple_table, MockAdapter};
    use std::sync::Mutex;

    fn job(on_error: OnErrorPolicy) -> MigrationJob {
        let mut job = MigrationJob::new(
            ConnectionConfig::sqlite("/tmp/source.db"),
            ConnectionConfig::sqlite("/tmp/target.db"),
        );
        job.on_error = on_error;
        job.batch_size = 100;
        job.lock_retry_backoff_ms = 1;
        job
    }

    fn five_tables() -> MockAdapter {
        (1..=5).fold(MockAdapter::new(), |m, i| {
            m.with_table(simple_table(&format!("t{}", i)), int_rows(10 * i))
        })
    }

    /// Cancels the token once the named table has finished.
    struct CancelAfter {
        table: String,
        token: CancellationToken,
        seen: Mutex<Vec<String>>,
    }

    impl ProgressSink for CancelAfter {
        fn emit(&self, event: ProgressEvent) {
            if let ProgressEvent::TableFinished { table, .. } = &event {
                if let Ok(mut seen) = self.seen.lock() {
                    seen.push(table.clone());
                }
                if *table == self.table {
                    self.token.cancel();
                }
            }
        }
    }

    #[tokio::test]
    async fn test_migrates_every_table() {
        let mut source = five_tables();
        let mut target = MockAdapter::new();
        let (sink, mut rx) = ChannelSink::new();

        let result = Orchestrator::new(job(OnErrorPolicy::Abort))
            .migrate(&mut source, &mut target, &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.rows_copied, 150);
        for i in 1..=5 {
            assert_eq!(target.rows(&format!("t{}", i)).unwrap().len(), 10 * i);
        }
        assert!(!target.in_transaction());

        let first = rx.try_recv().unwrap();
        assert_eq!(first, ProgressEvent::TableStarted { table: "t1".into() });
    }

    #[tokio::test]
    async fn test_skip_table_rolls_back_failed_table_only() {
        let mut source = MockAdapter::new()
            .with_table(simple_table("good"), int_rows(5))
            .with_table(simple_table("bad"), int_rows(5))
            .with_table(simple_table("after"), int_rows(5));
        // Third of five rows fails.
        let mut target = MockAdapter::new().fail_on_value("bad", 2);

        let result = Orchestrator::new(job(OnErrorPolicy::SkipTable))
            .migrate(&mut source, &mut target, &NoopSink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Partial);
        let bad = result.table("bad").unwrap();
        assert_eq!(bad.status, TableStatus::Failed);
        assert_eq!(bad.error.as_ref().unwrap().phase, Phase::DataCopy);
        assert_eq!(bad.rows_copied, 0);

        // DDL was rolled back with the rows.
        assert!(!target.has_table("bad"));
        assert_eq!(target.rows("good").unwrap().len(), 5);
        assert_eq!(target.rows("after").unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_skip_row_copies_499_of_500() {
        let mut source = MockAdapter::new().with_table(simple_table("t"), int_rows(500));
        let mut target = MockAdapter::new().fail_on_value("t", 250);

        let mut job = job(OnErrorPolicy::SkipRow);
        job.batch_size = 500;
        let result = Orchestrator::new(job)
            .migrate(&mut source, &mut target, &NoopSink, &CancellationToken::new())
            .await
            .unwrap();

        let t = result.table("t").unwrap();
        assert_eq!(t.status, TableStatus::Partial);
        assert_eq!(t.rows_copied, 499);
        assert_eq!(t.rows_skipped, 1);
        assert_eq!(t.row_errors.len(), 1);
        assert_eq!(t.row_errors[0].row_index, 250);
        assert!(t.error.is_none());
        assert_eq!(target.rows("t").unwrap().len(), 499);
        assert!(result.warnings.iter().any(|w| w.message.contains("row 250")));
    }

    #[tokio::test]
    async fn test_cancel_after_second_table() {
        let mut source = five_tables();
        let mut target = MockAdapter::new();
        let token = CancellationToken::new();
        let sink = CancelAfter {
            table: "t2".into(),
            token: token.clone(),
            seen: Mutex::new(Vec::new()),
        };

        let result = Orchestrator::new(job(OnErrorPolicy::Abort))
            .migrate(&mut source, &mut target, &sink, &token)
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(target.rows("t1").unwrap().len(), 10);
        assert_eq!(target.rows("t2").unwrap().len(), 20);
        for name in ["t3", "t4", "t5"] {
            assert!(!target.has_table(name));
            assert_eq!(result.table(name).unwrap().status, TableStatus::Skipped);
        }
        assert_eq!(*sink.seen.lock().unwrap(), vec!["t1".to_string(), "t2".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_type_falls_back_with_warning() {
        let mut table = simple_table("places");
        table.columns.push(ColumnDescriptor::new(
            "shape",
            "geometry",
            GenericType::Blob,
        ));
        let rows: Vec<Row> = (0..3)
            .map(|i| {
                vec![
                    SqlValue::I64(i),
                    SqlValue::text_owned(format!("p{}", i)),
                    SqlValue::bytes_owned(vec![1, 2, 3]),
                ]
            })
            .collect();
        let mut source = MockAdapter::new()
            .with_dialect(DialectKind::Mysql)
            .with_table(table, rows);
        let mut target = MockAdapter::new();
        let (sink, mut rx) = ChannelSink::new();

        let result = Orchestrator::new(job(OnErrorPolicy::Abort))
            .migrate(&mut source, &mut target, &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Success);
        let created = target.descriptor("places").unwrap();
        assert_eq!(created.columns[2].native_type, "BLOB");
        assert_eq!(target.rows("places").unwrap().len(), 3);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.column.as_deref() == Some("shape")));

        let mut warned = false;
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::Warning { column, .. } = event {
                warned |= column.as_deref() == Some("shape");
            }
        }
        assert!(warned);
    }

    #[tokio::test]
    async fn test_abort_stops_and_skips_remaining() {
        let mut source = MockAdapter::new()
            .with_table(simple_table("a"), int_rows(3))
            .with_table(simple_table("b"), int_rows(3))
            .with_table(simple_table("c"), int_rows(3));
        let mut target = MockAdapter::new().fail_ddl("b");

        let result = Orchestrator::new(job(OnErrorPolicy::Abort))
            .migrate(&mut source, &mut target, &NoopSink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.table("a").unwrap().status, TableStatus::Success);
        let b = result.table("b").unwrap();
        assert_eq!(b.error.as_ref().unwrap().phase, Phase::Ddl);
        let c = result.table("c").unwrap();
        assert_eq!(c.status, TableStatus::Skipped);
        assert_eq!(c.error.as_ref().unwrap().phase, Phase::Pending);
        assert!(!target.has_table("c"));
        assert_eq!(target.rows("a").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_schema_failure_is_recorded() {
        let mut source = MockAdapter::new()
            .with_table(simple_table("gone"), int_rows(3))
            .with_table(simple_table("kept"), int_rows(3))
            .fail_schema("gone");
        let mut target = MockAdapter::new();

        let result = Orchestrator::new(job(OnErrorPolicy::SkipTable))
            .migrate(&mut source, &mut target, &NoopSink, &CancellationToken::new())
            .await
            .unwrap();

        let gone = result.table("gone").unwrap();
        assert_eq!(gone.error.as_ref().unwrap().phase, Phase::SchemaFetch);
        assert_eq!(result.table("kept").unwrap().rows_copied, 3);
        assert_eq!(result.status, RunStatus::Partial);
    }

    #[tokio::test]
    async fn test_lock_error_retried_once() {
        let mut source = MockAdapter::new().with_table(simple_table("t"), int_rows(3));
        let mut target = MockAdapter::new().lock_failures(1);

        let result = Orchestrator::new(job(OnErrorPolicy::Abort))
            .migrate(&mut source, &mut target, &NoopSink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(target.write_calls, 2);
    }

    #[tokio::test]
    async fn test_filters_and_plan() {
        let mut source = five_tables();
        let mut job = job(OnErrorPolicy::Abort);
        job.exclude_tables = vec!["t2".into()];
        job.include_tables = vec!["t1".into(), "t2".into(), "t3".into()];

        let plan = Orchestrator::new(job)
            .plan_with(&mut source, DialectKind::Postgresql)
            .await
            .unwrap();
        let names: Vec<&str> = plan.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["t1", "t3"]);
        assert_eq!(plan.tables[0].columns[0].target_type, "INTEGER");
        assert_eq!(plan.tables[0].primary_key, vec!["id".to_string()]);
    }

    #[test]
    fn test_translate_default() {
        let mut flag = ColumnDescriptor::new("active", "tinyint(1)", GenericType::Boolean);
        flag.default_value = Some("1".into());
        assert_eq!(
            translate_default(&flag, DialectKind::Postgresql).as_deref(),
            Some("'1'")
        );
        assert_eq!(translate_default(&flag, DialectKind::Sqlite).as_deref(), Some("1"));

        let mut serial = ColumnDescriptor::new("id", "integer", GenericType::Integer);
        serial.default_value = Some("nextval('t_id_seq'::regclass)".into());
        assert_eq!(translate_default(&serial, DialectKind::Mysql), None);
    }

    #[test]
    fn test_translate_table_warns_on_dropped_default() {
        let mut table = simple_table("t");
        table.columns[1].default_value = Some("now()".into());
        let m = mapper(DialectKind::Sqlite, DialectKind::Mysql);
        let (mapped, warnings) = translate_table(&table, &m, DialectKind::Mysql).unwrap();
        assert_eq!(mapped.columns[0].native_type, "INT");
        assert_eq!(mapped.primary_key, vec!["id".to_string()]);
        assert!(mapped.columns[1].default_value.is_none());
        assert_eq!(warnings.len(), 1);
    }
}
