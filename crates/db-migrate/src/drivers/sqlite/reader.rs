//! SQLite catalog introspection and row streaming.
//!
//! SQLite columns have affinities, not types: a column declared `DATETIME`
//! may hold TEXT, INTEGER or REAL values row by row. Values are decoded by
//! their runtime storage class and only then reconciled with the column's
//! generic category.

use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row as _, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::DialectKind;
use crate::core::schema::{ColumnDescriptor, TableDescriptor};
use crate::core::traits::Dialect;
use crate::core::value::{Batch, Row, SqlNullType, SqlValue};
use crate::dialect::{classify, GenericType};
use crate::drivers::common::{forward_error, pump_rows};
use crate::error::{MigrateError, Result};

use super::dialect::SqliteDialect;

/// User tables, by name.
pub(super) async fn list_tables(pool: &SqlitePool) -> Result<Vec<String>> {
    let query = r#"
        SELECT name FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
        ORDER BY name
    "#;

    let rows: Vec<SqliteRow> = sqlx::query(query)
        .fetch_all(pool)
        .await
        .map_err(|e| MigrateError::connection("sqlite", format!("listing tables: {}", e)))?;

    rows.iter()
        .map(|r| {
            r.try_get::<String, _>("name")
                .map_err(|e| MigrateError::connection("sqlite", format!("listing tables: {}", e)))
        })
        .collect()
}

/// Columns and primary key of `table`.
pub(super) async fn get_schema(pool: &SqlitePool, table: &str) -> Result<TableDescriptor> {
    let query = r#"
        SELECT name, type, "notnull", dflt_value, pk
        FROM pragma_table_info(?1)
        ORDER BY cid
    "#;

    let rows: Vec<SqliteRow> = sqlx::query(query)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| MigrateError::schema(table, e))?;

    if rows.is_empty() {
        return Err(MigrateError::schema(table, "table not found or has no columns"));
    }

    let mut columns = Vec::with_capacity(rows.len());
    let mut pk: Vec<(i64, String)> = Vec::new();
    for row in &rows {
        let (col, pk_pos) = column_from_row(row).map_err(|e| MigrateError::schema(table, e))?;
        if pk_pos > 0 {
            pk.push((pk_pos, col.name.clone()));
        }
        columns.push(col);
    }

    pk.sort_by_key(|(pos, _)| *pos);
    let mut descriptor = TableDescriptor::new(table, columns);
    descriptor.primary_key = pk.into_iter().map(|(_, name)| name).collect();

    debug!(
        "Loaded {} columns for {} (pk: {:?})",
        descriptor.columns.len(),
        table,
        descriptor.primary_key
    );
    Ok(descriptor)
}

fn column_from_row(row: &SqliteRow) -> std::result::Result<(ColumnDescriptor, i64), sqlx::Error> {
    let name: String = row.try_get_unchecked("name")?;
    let native: String = row.try_get_unchecked("type")?;
    let notnull: i64 = row.try_get_unchecked("notnull")?;
    let default: Option<String> = row.try_get_unchecked("dflt_value")?;
    let pk: i64 = row.try_get_unchecked("pk")?;

    let info = classify(DialectKind::Sqlite, &native);
    let mut col = ColumnDescriptor::new(name, native, info.generic);
    col.default_value = default;
    col.nullable = notnull == 0;
    if pk > 0 {
        col = col.primary_key();
    }
    match info.generic {
        GenericType::Varchar(n) => col.length = Some(n),
        GenericType::Decimal { precision, scale } => {
            col.precision = precision;
            col.scale = Some(scale);
        }
        _ => {}
    }
    Ok((col, pk))
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

fn decode_error(table: &str, col: &str, e: sqlx::Error) -> MigrateError {
    MigrateError::read(table, format!("column {}: {}", col, e))
}

/// Convert a SQLite row into values in column order.
pub(super) fn decode_row(row: &SqliteRow, table: &TableDescriptor) -> Result<Row> {
    let mut values = Vec::with_capacity(table.columns.len());
    for (i, col) in table.columns.iter().enumerate() {
        let raw = row
            .try_get_raw(i)
            .map_err(|e| decode_error(&table.name, &col.name, e))?;
        if raw.is_null() {
            values.push(SqlValue::Null(null_type(col.generic)));
            continue;
        }
        let storage = raw.type_info().name().to_string();

        let value = match storage.as_str() {
            "INTEGER" => {
                let v: i64 = row
                    .try_get_unchecked(i)
                    .map_err(|e| decode_error(&table.name, &col.name, e))?;
                if col.generic == GenericType::Boolean {
                    SqlValue::Bool(v != 0)
                } else {
                    SqlValue::I64(v)
                }
            }
            "REAL" => SqlValue::F64(
                row.try_get_unchecked(i)
                    .map_err(|e| decode_error(&table.name, &col.name, e))?,
            ),
            "BLOB" => SqlValue::bytes_owned(
                row.try_get_unchecked(i)
                    .map_err(|e| decode_error(&table.name, &col.name, e))?,
            ),
            _ => {
                let s: String = row
                    .try_get_unchecked(i)
                    .map_err(|e| decode_error(&table.name, &col.name, e))?;
                reconcile_text(s, col.generic)
            }
        };
        values.push(value);
    }
    Ok(values)
}

/// Text stored in a numeric or boolean column keeps its meaning when it
/// parses; anything else travels as text.
fn reconcile_text(s: String, generic: GenericType) -> SqlValue<'static> {
    match generic {
        GenericType::Decimal { .. } => match s.trim().parse::<Decimal>() {
            Ok(d) => SqlValue::Decimal(d),
            Err(_) => SqlValue::text_owned(s),
        },
        GenericType::Boolean => {
            let text = SqlValue::text_owned(s);
            match text.as_bool() {
                Some(b) => SqlValue::Bool(b),
                None => text,
            }
        }
        _ => SqlValue::text_owned(s),
    }
}

/// Spawn the background reader for `table`.
pub(super) fn spawn_reader(
    pool: SqlitePool,
    table: TableDescriptor,
    batch_size: usize,
    read_ahead: usize,
) -> mpsc::Receiver<Result<Batch>> {
    let (tx, rx) = mpsc::channel(read_ahead.max(1));

    tokio::spawn(async move {
        let result = read_table(&pool, &table, batch_size, &tx).await;
        forward_error(&tx, result).await;
    });

    rx
}

async fn read_table(
    pool: &SqlitePool,
    table: &TableDescriptor,
    batch_size: usize,
    tx: &mpsc::Sender<Result<Batch>>,
) -> Result<usize> {
    let sql = SqliteDialect.select_sql(table)?;
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| MigrateError::read(&table.name, e))?;

    debug!("{}: {}", table.name, sql);
    let stream = sqlx::query(&sql).fetch(&mut *conn);
    let total = pump_rows(stream, &table.name, batch_size, tx, |row| decode_row(row, table)).await?;

    debug!("{}: read {} rows", table.name, total);
    Ok(total)
}
