//! PostgreSQL catalog introspection and row streaming.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::Pool;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::Row as PgRow;
use tracing::debug;

use crate::config::DialectKind;
use crate::core::schema::{ColumnDescriptor, TableDescriptor};
use crate::core::traits::Dialect;
use crate::core::value::{Batch, Row, SqlNullType, SqlValue};
use crate::dialect::{classify, GenericType};
use crate::drivers::common::{forward_error, pump_rows};
use crate::error::{MigrateError, Result};

use super::dialect::PostgresDialect;
use super::pg_message;

/// Base tables of `schema`.
pub(super) async fn list_tables(pool: &Pool, schema: &str) -> Result<Vec<String>> {
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::connection("postgresql", e))?;

    let query = r#"
        SELECT tablename::text
        FROM pg_catalog.pg_tables
        WHERE schemaname = $1
        ORDER BY tablename
    "#;

    let rows = client
        .query(query, &[&schema])
        .await
        .map_err(|e| MigrateError::connection("postgresql", pg_message(&e)))?;

    rows.iter()
        .map(|r| {
            r.try_get::<_, String>(0)
                .map_err(|e| MigrateError::connection("postgresql", e))
        })
        .collect()
}

/// Columns and primary key of `schema.table`.
pub(super) async fn get_schema(pool: &Pool, schema: &str, table: &str) -> Result<TableDescriptor> {
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::schema(table, e))?;

    let query = r#"
        SELECT
            a.attname::text,
            format_type(a.atttypid, a.atttypmod),
            NOT a.attnotnull,
            pg_get_expr(d.adbin, d.adrelid)
        FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE n.nspname = $1
          AND c.relname = $2
          AND a.attnum > 0
          AND NOT a.attisdropped
        ORDER BY a.attnum
    "#;

    let rows = client
        .query(query, &[&schema, &table])
        .await
        .map_err(|e| MigrateError::schema(table, pg_message(&e)))?;

    if rows.is_empty() {
        return Err(MigrateError::schema(table, "table not found or has no columns"));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        columns.push(column_from_row(row).map_err(|e| MigrateError::schema(table, e))?);
    }

    let pk_query = r#"
        SELECT a.attname::text
        FROM pg_catalog.pg_constraint c
        JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
        WHERE n.nspname = $1
          AND t.relname = $2
          AND c.contype = 'p'
          AND a.attnum = ANY(c.conkey)
        ORDER BY array_position(c.conkey, a.attnum)
    "#;

    let pk_rows = client
        .query(pk_query, &[&schema, &table])
        .await
        .map_err(|e| MigrateError::schema(table, pg_message(&e)))?;

    let mut pk = Vec::with_capacity(pk_rows.len());
    for row in &pk_rows {
        pk.push(
            row.try_get::<_, String>(0)
                .map_err(|e| MigrateError::schema(table, e))?,
        );
    }

    for col in columns.iter_mut() {
        if pk.contains(&col.name) {
            col.is_primary_key = true;
        }
    }

    let mut descriptor = TableDescriptor::new(table, columns);
    descriptor.primary_key = pk;

    debug!(
        "Loaded {} columns for {}.{} (pk: {:?})",
        descriptor.columns.len(),
        schema,
        table,
        descriptor.primary_key
    );
    Ok(descriptor)
}

fn column_from_row(row: &PgRow) -> std::result::Result<ColumnDescriptor, tokio_postgres::Error> {
    let name: String = row.try_get(0)?;
    let native: String = row.try_get(1)?;
    let nullable: bool = row.try_get(2)?;
    let default: Option<String> = row.try_get(3)?;

    let generic = classify(DialectKind::Postgresql, &native).generic;
    let mut col = ColumnDescriptor::new(name, native, generic);
    col.nullable = nullable;
    col.default_value = default.and_then(|d| strip_default_cast(&d));
    match generic {
        GenericType::Varchar(n) => col.length = Some(n),
        GenericType::Decimal { precision, scale } => {
            col.precision = precision;
            col.scale = Some(scale);
        }
        _ => {}
    }
    Ok(col)
}

/// `'abc'::character varying` becomes `'abc'`; other expressions are kept
/// as reported (and later judged by portability).
fn strip_default_cast(default: &str) -> Option<String> {
    let s = default.trim();
    if !s.starts_with('\'') {
        return Some(s.to_string());
    }

    let bytes = s.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            let (literal, rest) = s.split_at(i + 1);
            return if rest.is_empty() || rest.starts_with("::") {
                Some(literal.to_string())
            } else {
                Some(s.to_string())
            };
        }
        i += 1;
    }
    Some(s.to_string())
}

fn null_type(generic: GenericType) -> SqlNullType {
    match generic {
        GenericType::SmallInt | GenericType::Integer | GenericType::BigInt => SqlNullType::I64,
        GenericType::Floating => SqlNullType::F64,
        GenericType::Decimal { .. } => SqlNullType::Decimal,
        GenericType::Varchar(_) | GenericType::Text => SqlNullType::String,
        GenericType::Blob => SqlNullType::Bytes,
        GenericType::Boolean => SqlNullType::Bool,
        GenericType::Date => SqlNullType::Date,
        GenericType::Time => SqlNullType::Time,
        GenericType::DateTime => SqlNullType::DateTime,
        GenericType::Timestamp => SqlNullType::DateTimeOffset,
    }
}

fn get<'a, T>(row: &'a PgRow, i: usize, table: &str, col: &str) -> Result<Option<T>>
where
    T: FromSql<'a>,
{
    row.try_get::<_, Option<T>>(i)
        .map_err(|e| MigrateError::read(table, format!("column {}: {}", col, e)))
}

/// Convert a PostgreSQL row into values in column order.
///
/// Decoding follows the wire type of the result column; the SELECT has
/// already cast exotic types to text.
pub(super) fn decode_row(row: &PgRow, table: &TableDescriptor) -> Result<Row> {
    let mut values = Vec::with_capacity(table.columns.len());
    for (i, col) in table.columns.iter().enumerate() {
        let ty = row.columns()[i].type_().clone();
        let t = table.name.as_str();
        let c = col.name.as_str();

        let value = match ty {
            Type::BOOL => get::<bool>(row, i, t, c)?.map(SqlValue::Bool),
            Type::INT2 => get::<i16>(row, i, t, c)?.map(|v| SqlValue::I64(v.into())),
            Type::INT4 => get::<i32>(row, i, t, c)?.map(|v| SqlValue::I64(v.into())),
            Type::INT8 => get::<i64>(row, i, t, c)?.map(SqlValue::I64),
            Type::OID => get::<u32>(row, i, t, c)?.map(|v| SqlValue::I64(v.into())),
            Type::FLOAT4 => get::<f32>(row, i, t, c)?.map(|v| SqlValue::F64(v.into())),
            Type::FLOAT8 => get::<f64>(row, i, t, c)?.map(SqlValue::F64),
            Type::NUMERIC => get::<Decimal>(row, i, t, c)?.map(SqlValue::Decimal),
            Type::BYTEA => get::<Vec<u8>>(row, i, t, c)?.map(SqlValue::bytes_owned),
            Type::DATE => get::<NaiveDate>(row, i, t, c)?.map(SqlValue::Date),
            Type::TIME => get::<NaiveTime>(row, i, t, c)?.map(SqlValue::Time),
            Type::TIMESTAMP => get::<NaiveDateTime>(row, i, t, c)?.map(SqlValue::DateTime),
            Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, i, t, c)?
                .map(|v| SqlValue::DateTimeOffset(v.fixed_offset())),
            Type::UUID => get::<uuid::Uuid>(row, i, t, c)?.map(SqlValue::Uuid),
            _ => get::<String>(row, i, t, c)?.map(|s| reconcile_text(s, col.generic)),
        };

        values.push(value.unwrap_or(SqlValue::Null(null_type(col.generic))));
    }
    Ok(values)
}

/// Text produced by a cast keeps the meaning of the column's category.
fn reconcile_text(s: String, generic: GenericType) -> SqlValue<'static> {
    match generic {
        GenericType::Decimal { .. } => match s.parse::<Decimal>() {
            Ok(d) => SqlValue::Decimal(d),
            Err(_) => SqlValue::text_owned(s),
        },
        GenericType::Blob => SqlValue::bytes_owned(s.into_bytes()),
        _ => SqlValue::text_owned(s),
    }
}

/// Spawn the background reader for `table`.
pub(super) fn spawn_reader(
    pool: Pool,
    dialect: PostgresDialect,
    table: TableDescriptor,
    batch_size: usize,
    read_ahead: usize,
) -> mpsc::Receiver<Result<Batch>> {
    let (tx, rx) = mpsc::channel(read_ahead.max(1));

    tokio::spawn(async move {
        let result = read_table(&pool, &dialect, &table, batch_size, &tx).await;
        forward_error(&tx, result).await;
    });

    rx
}

async fn read_table(
    pool: &Pool,
    dialect: &PostgresDialect,
    table: &TableDescriptor,
    batch_size: usize,
    tx: &mpsc::Sender<Result<Batch>>,
) -> Result<usize> {
    let sql = dialect.select_sql(table)?;
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::read(&table.name, e))?;

    debug!("{}: {}", table.name, sql);
    let stream = client
        .query_raw(sql.as_str(), std::iter::empty::<&(dyn ToSql + Sync)>())
        .await
        .map_err(|e| MigrateError::read(&table.name, pg_message(&e)))?;

    let total = pump_rows(Box::pin(stream), &table.name, batch_size, tx, |row| {
        decode_row(row, table)
    })
    .await?;

    debug!("{}: read {} rows", table.name, total);
    Ok(total)
}
