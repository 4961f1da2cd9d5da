//! PostgreSQL row writer.
//!
//! Statements are prepared (and cached per connection), so every parameter
//! arrives with the type the server inferred from the target column. Values
//! are converted to that type here rather than trusting the variant the
//! reader produced: a SQLite TEXT timestamp binds to TIMESTAMP, an integer
//! flag binds to BOOLEAN.

use std::error::Error;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use crate::core::traits::Dialect;
use crate::core::value::{Row, SqlValue};
use crate::drivers::common::batch::is_pg_lock_state;
use crate::drivers::common::{BatchInserter, DriverFailure};

use super::dialect::PostgresDialect;
use super::pg_message;

type BoxError = Box<dyn Error + Sync + Send>;

fn need<T>(value: Option<T>, source: &SqlValue<'_>, ty: &Type) -> Result<T, BoxError> {
    value.ok_or_else(|| format!("cannot convert {:?} to {}", source, ty).into())
}

impl ToSql for SqlValue<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => need(self.as_bool(), self, ty)?.to_sql(ty, out),
            Type::INT2 => i16::try_from(need(self.as_i64(), self, ty)?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(need(self.as_i64(), self, ty)?)?.to_sql(ty, out),
            Type::INT8 => need(self.as_i64(), self, ty)?.to_sql(ty, out),
            Type::FLOAT4 => (need(self.as_f64(), self, ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => need(self.as_f64(), self, ty)?.to_sql(ty, out),
            Type::NUMERIC => need(self.as_decimal(), self, ty)?.to_sql(ty, out),
            Type::BYTEA => need(self.as_bytes(), self, ty)?.as_ref().to_sql(ty, out),
            Type::DATE => need(self.as_date(), self, ty)?.to_sql(ty, out),
            Type::TIME => need(self.as_time(), self, ty)?.to_sql(ty, out),
            Type::TIMESTAMP => need(self.as_datetime(), self, ty)?.to_sql(ty, out),
            Type::TIMESTAMPTZ => need(self.as_datetime_offset(), self, ty)?.to_sql(ty, out),
            Type::UUID => need(self.as_uuid(), self, ty)?.to_sql(ty, out),
            Type::JSONB => {
                // jsonb binary format: version byte then the text.
                let text = need(self.to_text(), self, ty)?;
                out.put_u8(1);
                out.put_slice(text.as_bytes());
                Ok(IsNull::No)
            }
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::JSON | Type::UNKNOWN => {
                let text = need(self.to_text(), self, ty)?;
                out.put_slice(text.as_bytes());
                Ok(IsNull::No)
            }
            _ => Err(format!("unsupported parameter type {}", ty).into()),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Statement execution for one batch on the adapter's pinned client.
pub(super) struct PgInserter<'c> {
    pub client: &'c deadpool_postgres::Client,
    pub table: &'c str,
    pub dialect: &'c PostgresDialect,
}

pub(super) fn failure(e: tokio_postgres::Error) -> DriverFailure {
    let retryable = e.code().is_some_and(|c| is_pg_lock_state(c.code()));
    DriverFailure::new(pg_message(&e), retryable)
}

#[async_trait]
impl BatchInserter for PgInserter<'_> {
    async fn exec(&mut self, sql: &str) -> Result<(), DriverFailure> {
        self.client.batch_execute(sql).await.map_err(failure)
    }

    async fn insert(&mut self, columns: &[String], rows: &[Row]) -> Result<u64, DriverFailure> {
        let sql = self
            .dialect
            .insert_sql(self.table, columns, rows.len())
            .map_err(|e| DriverFailure::new(e, false))?;

        let stmt = self.client.prepare_cached(&sql).await.map_err(failure)?;
        let params: Vec<&(dyn ToSql + Sync)> = rows
            .iter()
            .flat_map(|row| row.iter().map(|v| v as &(dyn ToSql + Sync)))
            .collect();

        self.client.execute(&stmt, &params).await.map_err(failure)
    }
}
