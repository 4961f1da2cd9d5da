//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB driver (sqlx)
//! - [`sqlite`]: SQLite driver (sqlx)
//! - [`postgres`]: PostgreSQL driver (tokio-postgres + deadpool)
//! - [`common`]: shared utilities (TLS, atomic batch writes, row pumping)
//!
//! # Dispatch
//!
//! [`AdapterImpl`] and [`DialectImpl`] are tagged enums over the engines.
//! The compiler generates a match instead of vtable dispatch, and the
//! orchestrator can own two adapters without boxing.
//!
//! # Adding New Databases
//!
//! 1. Create a module under `drivers/` with a `Dialect` and an `Adapter`
//! 2. Add a variant to `DialectKind`, `AdapterImpl` and `DialectImpl`
//! 3. Add classifier and target tables in `dialect::typemap`
//! 4. Register the connect call in [`connect`]

pub mod common;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{ConnectionConfig, DialectKind};
use crate::core::schema::{ColumnDescriptor, TableDescriptor};
use crate::core::traits::{Adapter, Dialect};
use crate::core::value::{Batch, Row, SqlValue};
use crate::error::Result;

pub use common::{SslMode, TlsBuilder};
pub use mysql::{MysqlAdapter, MysqlDialect};
pub use postgres::{PostgresAdapter, PostgresDialect};
pub use sqlite::{SqliteAdapter, SqliteDialect};

/// Which end of a migration an adapter serves.
///
/// Only SQLite opens differently: a source must exist and is opened
/// read-only, a target is created on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Target,
}

/// Open an adapter for `config`.
pub async fn connect(config: &ConnectionConfig, role: Role) -> Result<AdapterImpl> {
    match config.dialect {
        DialectKind::Mysql => Ok(AdapterImpl::Mysql(MysqlAdapter::connect(config).await?)),
        DialectKind::Sqlite => Ok(AdapterImpl::Sqlite(
            SqliteAdapter::connect(config, role).await?,
        )),
        DialectKind::Postgresql => Ok(AdapterImpl::Postgres(
            PostgresAdapter::connect(config).await?,
        )),
    }
}

/// Enum-based static dispatch for adapters.
pub enum AdapterImpl {
    Mysql(MysqlAdapter),
    Sqlite(SqliteAdapter),
    Postgres(PostgresAdapter),
}

macro_rules! dispatch {
    ($self:expr, $a:ident => $body:expr) => {
        match $self {
            AdapterImpl::Mysql($a) => $body,
            AdapterImpl::Sqlite($a) => $body,
            AdapterImpl::Postgres($a) => $body,
        }
    };
}

#[async_trait]
impl Adapter for AdapterImpl {
    fn dialect(&self) -> DialectKind {
        dispatch!(self, a => a.dialect())
    }

    fn quote_identifier(&self, name: &str) -> Result<String> {
        dispatch!(self, a => a.quote_identifier(name))
    }

    async fn server_version(&mut self) -> Result<String> {
        dispatch!(self, a => a.server_version().await)
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        dispatch!(self, a => a.list_tables().await)
    }

    async fn get_schema(&mut self, table: &str) -> Result<TableDescriptor> {
        dispatch!(self, a => a.get_schema(table).await)
    }

    async fn create_table(&mut self, table: &TableDescriptor, drop_first: bool) -> Result<()> {
        dispatch!(self, a => a.create_table(table, drop_first).await)
    }

    fn read_rows(
        &self,
        table: &TableDescriptor,
        batch_size: usize,
        read_ahead: usize,
    ) -> mpsc::Receiver<Result<Batch>> {
        dispatch!(self, a => a.read_rows(table, batch_size, read_ahead))
    }

    async fn write_rows(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<u64> {
        dispatch!(self, a => a.write_rows(table, columns, rows).await)
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        dispatch!(self, a => a.begin_transaction().await)
    }

    async fn commit(&mut self) -> Result<()> {
        dispatch!(self, a => a.commit().await)
    }

    async fn rollback(&mut self) -> Result<()> {
        dispatch!(self, a => a.rollback().await)
    }

    fn in_transaction(&self) -> bool {
        dispatch!(self, a => a.in_transaction())
    }

    async fn close(&mut self) {
        dispatch!(self, a => a.close().await)
    }
}

/// Enum-based static dispatch for dialects.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mysql(MysqlDialect),
    Sqlite(SqliteDialect),
    Postgres(PostgresDialect),
}

impl DialectImpl {
    /// Dialect for `kind`. `schema` qualifies PostgreSQL tables.
    pub fn for_kind(kind: DialectKind, schema: &str) -> Self {
        match kind {
            DialectKind::Mysql => DialectImpl::Mysql(MysqlDialect),
            DialectKind::Sqlite => DialectImpl::Sqlite(SqliteDialect),
            DialectKind::Postgresql => DialectImpl::Postgres(PostgresDialect::new(schema)),
        }
    }

    fn inner(&self) -> &dyn Dialect {
        match self {
            DialectImpl::Mysql(d) => d,
            DialectImpl::Sqlite(d) => d,
            DialectImpl::Postgres(d) => d,
        }
    }
}

impl Dialect for DialectImpl {
    fn kind(&self) -> DialectKind {
        self.inner().kind()
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        self.inner().quote_ident(name)
    }

    fn qualify(&self, table: &str) -> Result<String> {
        self.inner().qualify(table)
    }

    fn param_placeholder(&self, index: usize) -> String {
        self.inner().param_placeholder(index)
    }

    fn max_params(&self) -> usize {
        self.inner().max_params()
    }

    fn literal(&self, value: &SqlValue<'_>) -> String {
        self.inner().literal(value)
    }

    fn table_options(&self) -> &'static str {
        self.inner().table_options()
    }

    fn column_sql(&self, column: &ColumnDescriptor) -> Result<String> {
        self.inner().column_sql(column)
    }

    fn select_expr(&self, column: &ColumnDescriptor) -> Result<String> {
        self.inner().select_expr(column)
    }
}
