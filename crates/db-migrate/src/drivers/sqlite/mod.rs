//! SQLite database driver.
//!
//! - [`SqliteDialect`]: SQL syntax strategy
//! - [`SqliteAdapter`]: the [`Adapter`] implementation over a single-connection
//!   sqlx pool
//!
//! SQLite allows one writer per file, so the pool holds exactly one
//! connection. A source file is opened read-only and must exist; a target
//! file is created when missing, with foreign key enforcement off and a busy
//! timeout so a concurrent reader of the file does not fail writes outright.

mod dialect;
mod reader;
mod writer;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row as _;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, DialectKind};
use crate::core::schema::TableDescriptor;
use crate::core::traits::{Adapter, Dialect};
use crate::core::value::{Batch, Row};
use crate::drivers::common::write_batch_atomic;
use crate::drivers::Role;
use crate::error::{MigrateError, Result};

pub use dialect::SqliteDialect;
use writer::{exec_raw, SqliteInserter};

/// How long a write waits on a locked database before SQLITE_BUSY.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite adapter.
pub struct SqliteAdapter {
    pool: SqlitePool,
    conn: Option<PoolConnection<Sqlite>>,
    path: String,
    closed: bool,
}

impl SqliteAdapter {
    /// Open the database file.
    pub async fn connect(config: &ConnectionConfig, role: Role) -> Result<Self> {
        let path = config.database.as_str();
        check_path(path, role)?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(role == Role::Target)
            .read_only(role == Role::Source)
            .foreign_keys(false)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::connection("sqlite", format!("{}: {}", path, e)))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| MigrateError::connection("sqlite", format!("{}: {}", path, e)))?;

        info!("Opened SQLite database {} as {:?}", path, role);

        Ok(Self {
            pool,
            conn: None,
            path: path.to_string(),
            closed: false,
        })
    }

    async fn exec_pinned_or_pooled(&mut self, table: &str, statements: &[String]) -> Result<()> {
        match self.conn.as_mut() {
            Some(conn) => {
                for sql in statements {
                    debug!("{}", sql);
                    exec_raw(conn, sql)
                        .await
                        .map_err(|e| MigrateError::ddl(table, e))?;
                }
            }
            None => {
                let mut conn = self
                    .pool
                    .acquire()
                    .await
                    .map_err(|e| MigrateError::ddl(table, e))?;
                for sql in statements {
                    debug!("{}", sql);
                    exec_raw(&mut conn, sql)
                        .await
                        .map_err(|e| MigrateError::ddl(table, e))?;
                }
            }
        }
        Ok(())
    }
}

/// A source must exist; a target needs an existing parent directory.
fn check_path(path: &str, role: Role) -> Result<()> {
    if path.is_empty() {
        return Err(MigrateError::connection("sqlite", "empty database path"));
    }
    if path == ":memory:" {
        return Ok(());
    }
    let p = Path::new(path);
    match role {
        Role::Source if !p.is_file() => Err(MigrateError::connection(
            "sqlite",
            format!("database file not found: {}", path),
        )),
        Role::Target => match p.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => {
                Err(MigrateError::connection(
                    "sqlite",
                    format!("directory does not exist: {}", dir.display()),
                ))
            }
            _ => Ok(()),
        },
        Role::Source => Ok(()),
    }
}

#[async_trait]
impl Adapter for SqliteAdapter {
    fn dialect(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn quote_identifier(&self, name: &str) -> Result<String> {
        SqliteDialect.quote_ident(name)
    }

    async fn server_version(&mut self) -> Result<String> {
        let row = sqlx::query("SELECT sqlite_version() AS v")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::connection("sqlite", e))?;
        row.try_get::<String, _>("v")
            .map_err(|e| MigrateError::connection("sqlite", e))
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        reader::list_tables(&self.pool).await
    }

    async fn get_schema(&mut self, table: &str) -> Result<TableDescriptor> {
        reader::get_schema(&self.pool, table).await
    }

    async fn create_table(&mut self, table: &TableDescriptor, drop_first: bool) -> Result<()> {
        let statements = if drop_first {
            vec![
                SqliteDialect.drop_table_sql(&table.name)?,
                SqliteDialect.create_table_sql(table, false)?,
            ]
        } else {
            vec![SqliteDialect.create_table_sql(table, true)?]
        };
        self.exec_pinned_or_pooled(&table.name, &statements).await?;
        info!("Created table {}", table.name);
        Ok(())
    }

    fn read_rows(
        &self,
        table: &TableDescriptor,
        batch_size: usize,
        read_ahead: usize,
    ) -> mpsc::Receiver<Result<Batch>> {
        reader::spawn_reader(self.pool.clone(), table.clone(), batch_size, read_ahead)
    }

    async fn write_rows(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<u64> {
        let implicit = self.conn.is_none();
        if implicit {
            self.begin_transaction().await?;
        }

        let rows_per_stmt = SqliteDialect.rows_per_statement(columns.len(), rows.len());
        let result = match self.conn.as_mut() {
            Some(conn) => {
                let mut ins = SqliteInserter {
                    conn: &mut **conn,
                    table,
                };
                write_batch_atomic(&mut ins, table, columns, rows, rows_per_stmt).await
            }
            None => Err(MigrateError::transaction("no connection pinned")),
        };

        if implicit {
            match &result {
                Ok(_) => self.commit().await?,
                Err(_) => self.rollback().await?,
            }
        }
        result
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Err(MigrateError::transaction("a transaction is already open"));
        }

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| MigrateError::transaction(format!("acquiring connection: {}", e)))?;

        exec_raw(&mut conn, "BEGIN")
            .await
            .map_err(MigrateError::transaction)?;

        self.conn = Some(conn);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Err(MigrateError::transaction("commit without an open transaction"));
        };
        if let Err(e) = exec_raw(&mut conn, "COMMIT").await {
            // A failed COMMIT (SQLITE_BUSY) leaves the transaction open.
            let _ = exec_raw(&mut conn, "ROLLBACK").await;
            return Err(MigrateError::transaction(format!("COMMIT failed: {}", e)));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        exec_raw(&mut conn, "ROLLBACK")
            .await
            .map_err(|e| MigrateError::transaction(format!("ROLLBACK failed: {}", e)))
    }

    fn in_transaction(&self) -> bool {
        self.conn.is_some()
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.rollback().await {
            warn!("Rollback during close failed: {}", e);
        }
        self.pool.close().await;
        self.closed = true;
        debug!("Closed SQLite database {}", self.path);
    }
}
