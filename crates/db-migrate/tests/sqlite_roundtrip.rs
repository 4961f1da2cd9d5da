//! End-to-end runs between SQLite files.

use db_migrate::{
    ChannelSink, ConnectionConfig, MigrationJob, NoopSink, OnErrorPolicy, Orchestrator, Phase,
    ProgressEvent, ProgressSink, RunStatus, TableStatus,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn open(path: &std::path::Path) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap()
}

async fn seed_source(path: &std::path::Path) {
    let pool = open(path).await;
    sqlx::query(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name VARCHAR(50) NOT NULL,
            created DATETIME,
            score REAL DEFAULT 0
        )",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("CREATE TABLE tags (tag TEXT PRIMARY KEY, weight INTEGER)")
        .execute(&pool)
        .await
        .unwrap();

    for i in 0..25 {
        sqlx::query("INSERT INTO users (id, name, created, score) VALUES (?, ?, ?, ?)")
            .bind(i as i64)
            .bind(format!("user {}", i))
            .bind(if i % 5 == 0 {
                None
            } else {
                Some(format!("2024-01-{:02} 10:30:00", i))
            })
            .bind(i as f64 * 1.5)
            .execute(&pool)
            .await
            .unwrap();
    }
    sqlx::query("INSERT INTO tags (tag, weight) VALUES ('a', 1), ('b', 2)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;
}

fn job(dir: &TempDir) -> MigrationJob {
    let mut job = MigrationJob::new(
        ConnectionConfig::sqlite(dir.path().join("source.db").to_string_lossy()),
        ConnectionConfig::sqlite(dir.path().join("target.db").to_string_lossy()),
    );
    job.batch_size = 10;
    job
}

#[tokio::test]
async fn test_sqlite_to_sqlite_copies_every_row() {
    let dir = TempDir::new().unwrap();
    seed_source(&dir.path().join("source.db")).await;

    let (sink, mut events) = ChannelSink::new();
    let result = Orchestrator::new(job(&dir))
        .run_with(&sink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.rows_copied, 27);
    assert_eq!(result.table("users").unwrap().rows_copied, 25);
    assert_eq!(result.table("tags").unwrap().status, TableStatus::Success);

    let target = open(&dir.path().join("target.db")).await;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&target)
        .await
        .unwrap();
    assert_eq!(count, 25);

    let row = sqlx::query("SELECT name, created, score FROM users WHERE id = 7")
        .fetch_one(&target)
        .await
        .unwrap();
    assert_eq!(row.get::<String, _>("name"), "user 7");
    assert_eq!(
        row.get::<Option<String>, _>("created").as_deref(),
        Some("2024-01-07 10:30:00")
    );
    assert_eq!(row.get::<f64, _>("score"), 10.5);

    let created: Option<String> = sqlx::query_scalar("SELECT created FROM users WHERE id = 5")
        .fetch_one(&target)
        .await
        .unwrap();
    assert_eq!(created, None);
    target.close().await;

    // 25 rows at batch size 10 are three batches.
    let mut batches = 0;
    while let Ok(event) = events.try_recv() {
        if let ProgressEvent::BatchCommitted { table, .. } = event {
            if table == "users" {
                batches += 1;
            }
        }
    }
    assert_eq!(batches, 3);
}

#[tokio::test]
async fn test_rerun_with_drop_replaces_tables() {
    let dir = TempDir::new().unwrap();
    seed_source(&dir.path().join("source.db")).await;

    let mut job = job(&dir);
    job.drop_target_tables_first = true;
    job.on_error = OnErrorPolicy::SkipTable;
    let orchestrator = Orchestrator::new(job);

    let first = orchestrator
        .run_with(&NoopSink, CancellationToken::new())
        .await
        .unwrap();
    let second = orchestrator
        .run_with(&NoopSink, CancellationToken::new())
        .await
        .unwrap();
    assert!(first.is_success());
    assert!(second.is_success());

    let target = open(&dir.path().join("target.db")).await;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&target)
        .await
        .unwrap();
    assert_eq!(count, 25);
    target.close().await;
}

#[tokio::test]
async fn test_include_filter_and_precancelled_run() {
    let dir = TempDir::new().unwrap();
    seed_source(&dir.path().join("source.db")).await;

    let mut job = job(&dir);
    job.include_tables = vec!["tags".into()];
    let result = Orchestrator::new(job.clone())
        .run_with(&NoopSink, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.tables.len(), 1);
    assert_eq!(result.rows_copied, 2);

    let token = CancellationToken::new();
    token.cancel();
    job.include_tables.clear();
    job.target = ConnectionConfig::sqlite(dir.path().join("other.db").to_string_lossy());
    let result = Orchestrator::new(job)
        .run_with(&NoopSink, token)
        .await
        .unwrap();
    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.rows_copied, 0);
    assert!(result.tables.iter().all(|t| t.status == TableStatus::Skipped));
}

#[tokio::test]
async fn test_health_check_reports_missing_source() {
    let dir = TempDir::new().unwrap();
    let health = Orchestrator::health_check(&job(&dir)).await;
    assert!(!health.healthy);
    assert!(!health.source.connected);
    assert!(health.source.error.is_some());
    assert!(health.target.connected);
}

// On-error policies and cancellation against real SQLite files. The target's
// `b` table is created up front with a CHECK constraint that one source row
// violates; without `drop_target_tables_first` the migration keeps it.

const BAD_ROW: i64 = 2;

async fn seed_policy_source(path: &std::path::Path) {
    let pool = open(path).await;
    for sql in [
        "CREATE TABLE a (id INTEGER PRIMARY KEY, label TEXT)",
        "INSERT INTO a VALUES (1, 'one'), (2, 'two')",
        "CREATE TABLE b (id INTEGER PRIMARY KEY, qty INTEGER)",
        "CREATE TABLE c (id INTEGER PRIMARY KEY, note TEXT)",
        "INSERT INTO c VALUES (1, 'x'), (2, 'y'), (3, 'z')",
    ] {
        sqlx::query(sql).execute(&pool).await.unwrap();
    }
    for i in 0..500i64 {
        sqlx::query("INSERT INTO b (id, qty) VALUES (?, ?)")
            .bind(i)
            .bind(if i == BAD_ROW { -1 } else { i })
            .execute(&pool)
            .await
            .unwrap();
    }
    pool.close().await;
}

async fn seed_checked_target(path: &std::path::Path) {
    let pool = open(path).await;
    sqlx::query("CREATE TABLE b (id INTEGER PRIMARY KEY, qty INTEGER CHECK (qty >= 0))")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;
}

async fn policy_job(dir: &TempDir, policy: OnErrorPolicy) -> MigrationJob {
    seed_policy_source(&dir.path().join("source.db")).await;
    seed_checked_target(&dir.path().join("target.db")).await;
    let mut job = job(dir);
    job.batch_size = 100;
    job.on_error = policy;
    job
}

async fn count_rows(dir: &TempDir, table: &str) -> Option<i64> {
    let target = open(&dir.path().join("target.db")).await;
    let exists: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(&target)
            .await
            .unwrap();
    let count: Option<i64> = if exists == 0 {
        None
    } else {
        Some(
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
                .fetch_one(&target)
                .await
                .unwrap(),
        )
    };
    target.close().await;
    count
}

#[tokio::test]
async fn test_skip_row_keeps_every_valid_row() {
    let dir = TempDir::new().unwrap();
    let job = policy_job(&dir, OnErrorPolicy::SkipRow).await;

    let result = Orchestrator::new(job)
        .run_with(&NoopSink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Partial);
    let b = result.table("b").unwrap();
    assert_eq!(b.status, TableStatus::Partial);
    assert_eq!(b.rows_copied, 499);
    assert_eq!(b.rows_skipped, 1);
    assert_eq!(b.row_errors.len(), 1);
    assert_eq!(b.row_errors[0].row_index, BAD_ROW as usize);
    assert!(b.row_errors[0].message.contains("CHECK constraint failed"));
    assert_eq!(result.table("a").unwrap().status, TableStatus::Success);
    assert_eq!(result.table("c").unwrap().status, TableStatus::Success);

    assert_eq!(count_rows(&dir, "b").await, Some(499));
    let target = open(&dir.path().join("target.db")).await;
    let missing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM b WHERE id = ?")
        .bind(BAD_ROW)
        .fetch_one(&target)
        .await
        .unwrap();
    assert_eq!(missing, 0);
    target.close().await;
}

#[tokio::test]
async fn test_skip_table_rolls_back_the_failed_table() {
    let dir = TempDir::new().unwrap();
    let job = policy_job(&dir, OnErrorPolicy::SkipTable).await;

    let result = Orchestrator::new(job)
        .run_with(&NoopSink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Partial);
    assert_eq!(result.table("a").unwrap().rows_copied, 2);
    let b = result.table("b").unwrap();
    assert_eq!(b.status, TableStatus::Failed);
    assert_eq!(b.rows_copied, 0);
    let error = b.error.as_ref().unwrap();
    assert_eq!(error.phase, Phase::DataCopy);
    assert!(error.message.contains(&format!("at row {}", BAD_ROW)));
    assert_eq!(result.table("c").unwrap().status, TableStatus::Success);

    assert_eq!(count_rows(&dir, "a").await, Some(2));
    assert_eq!(count_rows(&dir, "b").await, Some(0));
    assert_eq!(count_rows(&dir, "c").await, Some(3));
}

#[tokio::test]
async fn test_abort_stops_after_the_failed_table() {
    let dir = TempDir::new().unwrap();
    let job = policy_job(&dir, OnErrorPolicy::Abort).await;

    let result = Orchestrator::new(job)
        .run_with(&NoopSink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.table("a").unwrap().status, TableStatus::Success);
    assert_eq!(result.table("b").unwrap().status, TableStatus::Failed);
    let c = result.table("c").unwrap();
    assert_eq!(c.status, TableStatus::Skipped);
    assert_eq!(c.error.as_ref().unwrap().phase, Phase::Pending);

    assert_eq!(count_rows(&dir, "a").await, Some(2));
    assert_eq!(count_rows(&dir, "b").await, Some(0));
    assert_eq!(count_rows(&dir, "c").await, None);
}

/// Cancels the run once the first batch of `table` has been written.
struct CancelOnBatch {
    table: &'static str,
    token: CancellationToken,
}

impl ProgressSink for CancelOnBatch {
    fn emit(&self, event: ProgressEvent) {
        if let ProgressEvent::BatchCommitted { table, .. } = event {
            if table == self.table {
                self.token.cancel();
            }
        }
    }
}

#[tokio::test]
async fn test_cancel_mid_table_rolls_back_that_table() {
    let dir = TempDir::new().unwrap();
    seed_policy_source(&dir.path().join("source.db")).await;
    let mut job = job(&dir);
    job.batch_size = 100;

    let token = CancellationToken::new();
    let sink = CancelOnBatch {
        table: "b",
        token: token.clone(),
    };
    let result = Orchestrator::new(job)
        .run_with(&sink, token)
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.table("a").unwrap().status, TableStatus::Success);
    let b = result.table("b").unwrap();
    assert_eq!(b.status, TableStatus::Skipped);
    assert_eq!(b.error.as_ref().unwrap().phase, Phase::Cancelled);
    assert_eq!(result.table("c").unwrap().status, TableStatus::Skipped);

    // SQLite DDL is transactional: the rolled-back table is gone entirely.
    assert_eq!(count_rows(&dir, "a").await, Some(2));
    assert_eq!(count_rows(&dir, "b").await, None);
    assert_eq!(count_rows(&dir, "c").await, None);
}
