//! PostgreSQL database driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy
//! - [`PostgresAdapter`]: the [`Adapter`] implementation over deadpool-postgres
//!
//! DDL is transactional in PostgreSQL, so a table created inside a
//! transaction disappears with its rows when that transaction rolls back.
//! Created tables carry no foreign keys, so no constraint deferral is needed
//! while loading.

mod dialect;
mod reader;
mod writer;

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Client, Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio::sync::mpsc;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, DialectKind};
use crate::core::schema::TableDescriptor;
use crate::core::traits::{Adapter, Dialect};
use crate::core::value::{Batch, Row};
use crate::drivers::common::{write_batch_atomic, TlsBuilder};
use crate::error::{MigrateError, Result};

pub use dialect::PostgresDialect;
use writer::PgInserter;

/// Reader tasks and metadata queries share the pool with the pinned
/// transaction client.
const POOL_MAX_SIZE: usize = 4;

/// PostgreSQL adapter.
pub struct PostgresAdapter {
    pool: Pool,
    client: Option<Client>,
    dialect: PostgresDialect,
    closed: bool,
}

/// Driver message with SQLSTATE and detail when the server sent them.
pub(crate) fn pg_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => {
            let mut msg = format!("{} (SQLSTATE {})", db.message(), db.code().code());
            if let Some(detail) = db.detail() {
                msg.push_str(": ");
                msg.push_str(detail);
            }
            msg
        }
        None => e.to_string(),
    }
}

impl PostgresAdapter {
    /// Connect and verify the connection with `SELECT 1`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let tls = TlsBuilder::parse(config.ssl_mode())?;

        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port());
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        pg_config.ssl_mode(tls.ssl_mode().to_postgres());

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match tls.build()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
            Some(connector) => Manager::from_config(pg_config, connector, mgr_config),
        };

        let pool = Pool::builder(mgr)
            .max_size(POOL_MAX_SIZE)
            .build()
            .map_err(|e| MigrateError::connection("postgresql", e))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::connection("postgresql", e))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection("postgresql", pg_message(&e)))?;

        info!("Connected to PostgreSQL: {}", config.describe());

        Ok(Self {
            pool,
            client: None,
            dialect: PostgresDialect::new(config.schema.clone()),
            closed: false,
        })
    }

    async fn run_ddl(&mut self, table: &str, statements: &[String]) -> Result<()> {
        let pooled;
        let client = match self.client.as_ref() {
            Some(c) => c,
            None => {
                pooled = self
                    .pool
                    .get()
                    .await
                    .map_err(|e| MigrateError::ddl(table, e))?;
                &pooled
            }
        };
        for sql in statements {
            debug!("{}", sql);
            client
                .batch_execute(sql)
                .await
                .map_err(|e| MigrateError::ddl(table, pg_message(&e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for PostgresAdapter {
    fn dialect(&self) -> DialectKind {
        DialectKind::Postgresql
    }

    fn quote_identifier(&self, name: &str) -> Result<String> {
        self.dialect.quote_ident(name)
    }

    async fn server_version(&mut self) -> Result<String> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::connection("postgresql", e))?;
        let row = client
            .query_one("SELECT current_setting('server_version')", &[])
            .await
            .map_err(|e| MigrateError::connection("postgresql", pg_message(&e)))?;
        row.try_get::<_, String>(0)
            .map_err(|e| MigrateError::connection("postgresql", e))
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        reader::list_tables(&self.pool, self.dialect.schema()).await
    }

    async fn get_schema(&mut self, table: &str) -> Result<TableDescriptor> {
        reader::get_schema(&self.pool, self.dialect.schema(), table).await
    }

    async fn create_table(&mut self, table: &TableDescriptor, drop_first: bool) -> Result<()> {
        let statements = if drop_first {
            vec![
                self.dialect.drop_table_sql(&table.name)?,
                self.dialect.create_table_sql(table, false)?,
            ]
        } else {
            vec![self.dialect.create_table_sql(table, true)?]
        };
        self.run_ddl(&table.name, &statements).await?;
        info!("Created table {}.{}", self.dialect.schema(), table.name);
        Ok(())
    }

    fn read_rows(
        &self,
        table: &TableDescriptor,
        batch_size: usize,
        read_ahead: usize,
    ) -> mpsc::Receiver<Result<Batch>> {
        reader::spawn_reader(
            self.pool.clone(),
            self.dialect.clone(),
            table.clone(),
            batch_size,
            read_ahead,
        )
    }

    async fn write_rows(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<u64> {
        let implicit = self.client.is_none();
        if implicit {
            self.begin_transaction().await?;
        }

        let rows_per_stmt = self.dialect.rows_per_statement(columns.len(), rows.len());
        let result = match self.client.as_ref() {
            Some(client) => {
                let mut ins = PgInserter {
                    client,
                    table,
                    dialect: &self.dialect,
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
        if self.client.is_some() {
            return Err(MigrateError::transaction("a transaction is already open"));
        }

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::transaction(format!("acquiring connection: {}", e)))?;

        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| MigrateError::transaction(pg_message(&e)))?;

        self.client = Some(client);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Err(MigrateError::transaction("commit without an open transaction"));
        };
        client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| MigrateError::transaction(format!("COMMIT failed: {}", pg_message(&e))))
    }

    async fn rollback(&mut self) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        client
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| MigrateError::transaction(format!("ROLLBACK failed: {}", pg_message(&e))))
    }

    fn in_transaction(&self) -> bool {
        self.client.is_some()
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.rollback().await {
            warn!("Rollback during close failed: {}", e);
        }
        self.pool.close();
        self.closed = true;
        debug!("Closed PostgreSQL pool for schema {}", self.dialect.schema());
    }
}
