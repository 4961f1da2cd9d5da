//! SQLite row writer.
//!
//! SQLite stores what it is given, so values are bound in the storage class
//! the target column's affinity expects: booleans as 0/1 integers, temporal
//! values as ISO-8601 text, decimals as REAL.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection};

use crate::core::traits::Dialect;
use crate::core::value::{format_datetime, format_time, Row, SqlValue};
use crate::drivers::common::{is_lock_error, BatchInserter, DriverFailure};

use super::dialect::SqliteDialect;

/// Statement execution for one batch on the adapter's connection.
pub(super) struct SqliteInserter<'c> {
    pub conn: &'c mut SqliteConnection,
    pub table: &'c str,
}

fn failure(e: sqlx::Error) -> DriverFailure {
    let retryable = is_lock_error(&e);
    DriverFailure::new(e, retryable)
}

/// Bind one value.
pub(super) fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q SqlValue<'static>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null(_) => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(i64::from(*v)),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Decimal(v) => match v.to_f64() {
            Some(f) => query.bind(f),
            None => query.bind(v.to_string()),
        },
        SqlValue::Text(v) => query.bind(v.as_ref()),
        SqlValue::Bytes(v) => query.bind(v.as_ref()),
        SqlValue::Uuid(v) => query.bind(v.to_string()),
        SqlValue::DateTime(v) => query.bind(format_datetime(v)),
        SqlValue::DateTimeOffset(v) => query.bind(v.to_rfc3339()),
        SqlValue::Date(v) => query.bind(v.format("%Y-%m-%d").to_string()),
        SqlValue::Time(v) => query.bind(format_time(v)),
    }
}

/// Run a statement without parameters.
pub(super) async fn exec_raw(conn: &mut SqliteConnection, sql: &str) -> Result<(), sqlx::Error> {
    sqlx::Executor::execute(&mut *conn, sql).await.map(|_| ())
}

#[async_trait]
impl BatchInserter for SqliteInserter<'_> {
    async fn exec(&mut self, sql: &str) -> Result<(), DriverFailure> {
        exec_raw(self.conn, sql).await.map_err(failure)
    }

    async fn insert(&mut self, columns: &[String], rows: &[Row]) -> Result<u64, DriverFailure> {
        let sql = SqliteDialect
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
