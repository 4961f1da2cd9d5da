//! MySQL/MariaDB row writer.
//!
//! Values are bound through the binary protocol; MySQL converts between
//! string, numeric and temporal representations itself, so no per-column
//! coercion is needed on this side.

use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection};
use sqlx::query::Query;

use crate::core::traits::Dialect;
use crate::core::value::{Row, SqlValue};
use crate::drivers::common::{is_lock_error, BatchInserter, DriverFailure};

use super::dialect::MysqlDialect;

/// Statement execution for one batch on the pinned write connection.
pub(super) struct MysqlInserter<'c> {
    pub conn: &'c mut MySqlConnection,
    pub table: &'c str,
}

fn failure(e: sqlx::Error) -> DriverFailure {
    let retryable = is_lock_error(&e);
    DriverFailure::new(e, retryable)
}

/// Bind one value.
pub(super) fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &'q SqlValue<'static>,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null(_) => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Decimal(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_ref()),
        SqlValue::Bytes(v) => query.bind(v.as_ref()),
        SqlValue::Uuid(v) => query.bind(v.to_string()),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::DateTimeOffset(v) => query.bind(v.naive_utc()),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
    }
}

/// Run a statement over the text protocol.
pub(super) async fn exec_raw(conn: &mut MySqlConnection, sql: &str) -> Result<(), sqlx::Error> {
    sqlx::Executor::execute(&mut *conn, sql).await.map(|_| ())
}

#[async_trait]
impl BatchInserter for MysqlInserter<'_> {
    async fn exec(&mut self, sql: &str) -> Result<(), DriverFailure> {
        exec_raw(self.conn, sql).await.map_err(failure)
    }

    async fn insert(&mut self, columns: &[String], rows: &[Row]) -> Result<u64, DriverFailure> {
        let sql = MysqlDialect
            .insert_sql(self.table, columns, rows.len())
            .map_err(|e| DriverFailure::new(e, false))?;

        let mut query = sqlx::query(&sql);
        for row in rows {
            for value in row {
                query = bind_value(query, value);
            }
        }

        let result = query.execute(&mut *self.conn).await.map_err(failure)?;
        Ok(result.rows_affected())
    }
}
