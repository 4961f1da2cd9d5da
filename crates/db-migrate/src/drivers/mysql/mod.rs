//! MySQL/MariaDB database driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy
//! - [`MysqlAdapter`]: the [`Adapter`] implementation over an sqlx pool
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+
//!
//! # Transactions
//!
//! A connection is taken from the pool and pinned for the lifetime of a
//! transaction. Foreign key checks are disabled on it for that duration and
//! restored on commit, rollback and close. DDL commits implicitly in MySQL,
//! so `create_table` reopens the transaction after running.

mod dialect;
mod reader;
mod writer;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::Row as _;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, DialectKind};
use crate::core::schema::TableDescriptor;
use crate::core::traits::{Adapter, Dialect};
use crate::core::value::{Batch, Row};
use crate::drivers::common::{write_batch_atomic, SslMode};
use crate::error::{MigrateError, Result};

pub use dialect::MysqlDialect;
use writer::{exec_raw, MysqlInserter};

/// Reader tasks and metadata queries share the pool with the pinned
/// transaction connection.
const POOL_MAX_CONNECTIONS: u32 = 4;

/// MySQL adapter.
pub struct MysqlAdapter {
    pool: MySqlPool,
    conn: Option<PoolConnection<MySql>>,
    database: String,
    closed: bool,
}

impl MysqlAdapter {
    /// Connect and verify the connection with `SELECT 1`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let ssl_mode = SslMode::parse(config.ssl_mode())?;
        if ssl_mode == SslMode::Disable {
            warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
        }

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port())
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .charset("utf8mb4")
            .ssl_mode(ssl_mode.to_mysql());

        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::connection("mysql", e))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| MigrateError::connection("mysql", e))?;

        info!("Connected to MySQL: {}", config.describe());

        Ok(Self {
            pool,
            conn: None,
            database: config.database.clone(),
            closed: false,
        })
    }

    /// Run DDL statements, on the pinned connection when a transaction is
    /// open (reopening it afterwards) or on a pooled one otherwise.
    async fn run_ddl(&mut self, table: &str, statements: &[String]) -> Result<()> {
        match self.conn.as_mut() {
            Some(conn) => {
                for sql in statements {
                    debug!("{}", sql);
                    exec_raw(conn, sql)
                        .await
                        .map_err(|e| MigrateError::ddl(table, e))?;
                }
                exec_raw(conn, "START TRANSACTION")
                    .await
                    .map_err(|e| MigrateError::transaction(format!("reopening transaction: {}", e)))?;
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

    /// End the pinned transaction with `COMMIT` or `ROLLBACK` and restore
    /// foreign key checks before the connection goes back to the pool.
    async fn finish(&mut self, statement: &str) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let result = exec_raw(&mut conn, statement)
            .await
            .map_err(|e| MigrateError::transaction(format!("{} failed: {}", statement, e)));

        if let Err(e) = exec_raw(&mut conn, "SET FOREIGN_KEY_CHECKS = 1").await {
            warn!("Failed to re-enable foreign key checks, discarding connection: {}", e);
            drop(conn.detach());
        }
        result
    }
}

#[async_trait]
impl Adapter for MysqlAdapter {
    fn dialect(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn quote_identifier(&self, name: &str) -> Result<String> {
        MysqlDialect.quote_ident(name)
    }

    async fn server_version(&mut self) -> Result<String> {
        let row = sqlx::query("SELECT CAST(VERSION() AS CHAR(255)) AS v")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::connection("mysql", e))?;
        row.try_get::<String, _>("v")
            .map_err(|e| MigrateError::connection("mysql", e))
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
                MysqlDialect.drop_table_sql(&table.name)?,
                MysqlDialect.create_table_sql(table, false)?,
            ]
        } else {
            vec![MysqlDialect.create_table_sql(table, true)?]
        };
        self.run_ddl(&table.name, &statements).await?;
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

        let rows_per_stmt = MysqlDialect.rows_per_statement(columns.len(), rows.len());
        let result = match self.conn.as_mut() {
            Some(conn) => {
                let mut ins = MysqlInserter {
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

        exec_raw(&mut conn, "SET FOREIGN_KEY_CHECKS = 0")
            .await
            .map_err(MigrateError::transaction)?;

        if let Err(e) = exec_raw(&mut conn, "START TRANSACTION").await {
            let _ = exec_raw(&mut conn, "SET FOREIGN_KEY_CHECKS = 1").await;
            return Err(MigrateError::transaction(e));
        }

        self.conn = Some(conn);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.conn.is_none() {
            return Err(MigrateError::transaction("commit without an open transaction"));
        }
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.finish("ROLLBACK").await
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
        debug!("Closed MySQL connection to {}", self.database);
    }
}
