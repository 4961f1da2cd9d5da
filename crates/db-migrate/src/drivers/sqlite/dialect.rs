//! SQLite SQL dialect.

use crate::config::DialectKind;
use crate::core::identifier::quote_sqlite;
use crate::core::traits::Dialect;
use crate::core::value::{format_datetime, format_time, to_hex, SqlValue};
use crate::error::Result;

/// SQLITE_MAX_VARIABLE_NUMBER since 3.32.
pub const SQLITE_MAX_PARAMS: usize = 32_766;

/// SQLite dialect implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_sqlite(name)
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn max_params(&self) -> usize {
        SQLITE_MAX_PARAMS
    }

    fn literal(&self, value: &SqlValue<'_>) -> String {
        match value {
            SqlValue::Null(_) => "NULL".to_string(),
            SqlValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F64(v) if v.is_finite() => format!("{:?}", v),
            SqlValue::F64(_) => "NULL".to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) => format!("'{}'", v.replace('\'', "''")),
            SqlValue::Bytes(v) => format!("X'{}'", to_hex(v)),
            SqlValue::Uuid(v) => format!("'{}'", v),
            SqlValue::DateTime(v) => format!("'{}'", format_datetime(v)),
            SqlValue::DateTimeOffset(v) => format!("'{}'", v.to_rfc3339()),
            SqlValue::Date(v) => format!("'{}'", v.format("%Y-%m-%d")),
            SqlValue::Time(v) => format!("'{}'", format_time(v)),
        }
    }
}
