//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Tables are qualified with the configured schema. Columns whose wire type
//! has no direct Rust decoding (numeric, uuid, json, arrays, geometric and
//! other extension types) are cast in the SELECT so the reader only ever sees
//! a handful of well-known types.

use crate::config::DialectKind;
use crate::core::identifier::{qualify_pg, quote_pg};
use crate::core::schema::ColumnDescriptor;
use crate::core::traits::Dialect;
use crate::core::value::{format_datetime, format_time, to_hex, SqlValue};
use crate::dialect::{GenericType, NativeType};
use crate::error::Result;

/// Bind parameters are counted with an Int16 in the wire protocol.
pub const PG_MAX_PARAMS: usize = 65_535;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    schema: String,
}

impl PostgresDialect {
    /// Create a dialect qualifying tables with `schema`.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    /// Schema tables are qualified with.
    pub fn schema(&self) -> &str {
        &self.schema
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new("public")
    }
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgresql
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_pg(name)
    }

    fn qualify(&self, table: &str) -> Result<String> {
        qualify_pg(&self.schema, table)
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn max_params(&self) -> usize {
        PG_MAX_PARAMS
    }

    fn select_expr(&self, column: &ColumnDescriptor) -> Result<String> {
        let quoted = self.quote_ident(&column.name)?;
        let native = NativeType::parse(&column.native_type);
        let cast = match column.generic {
            GenericType::Time if native.with_time_zone || native.base == "TIMETZ" => "::time",
            GenericType::Decimal { .. } => "::numeric::text",
            GenericType::Varchar(_) | GenericType::Text => "::text",
            GenericType::Blob if native.base != "BYTEA" => "::text",
            _ => "",
        };
        Ok(format!("{}{}", quoted, cast))
    }

    fn literal(&self, value: &SqlValue<'_>) -> String {
        match value {
            SqlValue::Null(_) => "NULL".to_string(),
            SqlValue::Bool(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F64(v) if v.is_nan() => "'NaN'::float8".to_string(),
            SqlValue::F64(v) if v.is_infinite() && *v > 0.0 => "'Infinity'::float8".to_string(),
            SqlValue::F64(v) if v.is_infinite() => "'-Infinity'::float8".to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) => format!("'{}'", v.replace('\'', "''")),
            SqlValue::Bytes(v) => format!("'\\x{}'::bytea", to_hex(v)),
            SqlValue::Uuid(v) => format!("'{}'", v),
            SqlValue::DateTime(v) => format!("'{}'", format_datetime(v)),
            SqlValue::DateTimeOffset(v) => format!("'{}'", v.to_rfc3339()),
            SqlValue::Date(v) => format!("'{}'", v.format("%Y-%m-%d")),
            SqlValue::Time(v) => format!("'{}'", format_time(v)),
        }
    }
}
