//! MySQL/MariaDB catalog introspection and row streaming.
//!
//! Catalog queries CAST string columns to CHAR to sidestep the collation and
//! binary-string differences between MySQL 5.7, 8.0 and MariaDB.

use rust_decimal::Decimal;
use sqlx::mysql::{MySql, MySqlPool, MySqlRow, MySqlValueRef};
use sqlx::{Decode, Row as _, ValueRef};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::schema::{ColumnDescriptor, TableDescriptor};
use crate::core::traits::Dialect;
use crate::core::value::{Batch, Row, SqlNullType, SqlValue};
use crate::dialect::{classify, GenericType, NativeType};
use crate::drivers::common::{forward_error, pump_rows};
use crate::config::DialectKind;
use crate::error::{MigrateError, Result};

use super::dialect::MysqlDialect;

/// Base tables of the connected database.
pub(super) async fn list_tables(pool: &MySqlPool) -> Result<Vec<String>> {
    let query = r#"
        SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
    "#;

    let rows: Vec<MySqlRow> = sqlx::query(query)
        .fetch_all(pool)
        .await
        .map_err(|e| MigrateError::connection("mysql", format!("listing tables: {}", e)))?;

    rows.iter()
        .map(|r| {
            r.try_get::<String, _>("TABLE_NAME")
                .map_err(|e| MigrateError::connection("mysql", format!("listing tables: {}", e)))
        })
        .collect()
}

/// Columns and primary key of `table`.
pub(super) async fn get_schema(pool: &MySqlPool, table: &str) -> Result<TableDescriptor> {
    let query = r#"
        SELECT
            CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
            CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
            IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
            CAST(COLUMN_DEFAULT AS CHAR(4000)) AS COLUMN_DEFAULT,
            CAST(EXTRA AS CHAR(255)) AS EXTRA,
            CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS max_length,
            CAST(NUMERIC_PRECISION AS SIGNED) AS num_precision,
            CAST(NUMERIC_SCALE AS SIGNED) AS num_scale
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
    "#;

    let rows: Vec<MySqlRow> = sqlx::query(query)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| MigrateError::schema(table, e))?;

    if rows.is_empty() {
        return Err(MigrateError::schema(table, "table not found or has no columns"));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        columns.push(column_from_row(row).map_err(|e| MigrateError::schema(table, e))?);
    }

    let pk = load_primary_key(pool, table).await?;
    for col in columns.iter_mut() {
        if pk.contains(&col.name) {
            col.is_primary_key = true;
        }
    }

    let mut descriptor = TableDescriptor::new(table, columns);
    descriptor.primary_key = pk;

    debug!(
        "Loaded {} columns for {} (pk: {:?})",
        descriptor.columns.len(),
        table,
        descriptor.primary_key
    );
    Ok(descriptor)
}

fn column_from_row(row: &MySqlRow) -> std::result::Result<ColumnDescriptor, sqlx::Error> {
    let name: String = row.try_get("COLUMN_NAME")?;
    let native: String = row.try_get("COLUMN_TYPE")?;
    let nullable: i64 = row.try_get_unchecked("is_nullable")?;
    let default: Option<String> = row.try_get("COLUMN_DEFAULT")?;
    let extra: Option<String> = row.try_get("EXTRA")?;
    let max_length: Option<i64> = row.try_get_unchecked("max_length")?;
    let precision: Option<i64> = row.try_get_unchecked("num_precision")?;
    let scale: Option<i64> = row.try_get_unchecked("num_scale")?;

    let generic = classify(DialectKind::Mysql, &native).generic;
    let mut col = ColumnDescriptor::new(name, native, generic);
    col.nullable = nullable == 1;
    col.default_value = normalize_default(default, extra.as_deref(), generic);
    col.length = max_length.and_then(|v| u32::try_from(v).ok());
    col.precision = precision.and_then(|v| u32::try_from(v).ok());
    col.scale = scale.and_then(|v| u32::try_from(v).ok());
    Ok(col)
}

/// MySQL 8 reports string defaults unquoted and marks expressions with
/// `DEFAULT_GENERATED`; MariaDB quotes string defaults itself.
fn normalize_default(
    default: Option<String>,
    extra: Option<&str>,
    generic: GenericType,
) -> Option<String> {
    let default = default?;
    if extra.is_some_and(|e| e.to_uppercase().contains("DEFAULT_GENERATED")) {
        return None;
    }
    if !generic.is_textual() || default.starts_with('\'') || default.eq_ignore_ascii_case("NULL") {
        return Some(default);
    }
    Some(format!("'{}'", default.replace('\'', "''")))
}

async fn load_primary_key(pool: &MySqlPool, table: &str) -> Result<Vec<String>> {
    let query = r#"
        SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
        ORDER BY ORDINAL_POSITION
    "#;

    let rows: Vec<MySqlRow> = sqlx::query(query)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| MigrateError::schema(table, e))?;

    rows.iter()
        .map(|r| {
            r.try_get::<String, _>("COLUMN_NAME")
                .map_err(|e| MigrateError::schema(table, e))
        })
        .collect()
}

/// How a column's wire value is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WireKind {
    Signed,
    Unsigned,
    Bool,
    Float,
    Decimal,
    Text,
    Bytes,
    Date,
    Time,
    DateTime,
}

pub(super) fn wire_kind(col: &ColumnDescriptor) -> WireKind {
    let native = NativeType::parse(&col.native_type);
    match col.generic {
        GenericType::Boolean => WireKind::Bool,
        GenericType::SmallInt | GenericType::Integer | GenericType::BigInt if native.unsigned => {
            WireKind::Unsigned
        }
        GenericType::SmallInt | GenericType::Integer | GenericType::BigInt => WireKind::Signed,
        GenericType::Decimal { .. } if native.base == "BIGINT" => WireKind::Unsigned,
        GenericType::Decimal { .. } => WireKind::Decimal,
        GenericType::Floating => WireKind::Float,
        GenericType::Varchar(_) | GenericType::Text => WireKind::Text,
        GenericType::Blob => WireKind::Bytes,
        GenericType::Date => WireKind::Date,
        GenericType::Time => WireKind::Time,
        GenericType::DateTime | GenericType::Timestamp => WireKind::DateTime,
    }
}

fn null_type(kind: WireKind) -> SqlNullType {
    match kind {
        WireKind::Signed | WireKind::Unsigned => SqlNullType::I64,
        WireKind::Bool => SqlNullType::Bool,
        WireKind::Float => SqlNullType::F64,
        WireKind::Decimal => SqlNullType::Decimal,
        WireKind::Text => SqlNullType::String,
        WireKind::Bytes => SqlNullType::Bytes,
        WireKind::Date => SqlNullType::Date,
        WireKind::Time => SqlNullType::Time,
        WireKind::DateTime => SqlNullType::DateTime,
    }
}

fn decode_error(table: &str, col: &str, e: sqlx::Error) -> MigrateError {
    MigrateError::read(table, format!("column {}: {}", col, e))
}

fn get<'r, T>(row: &'r MySqlRow, i: usize, table: &str, col: &str) -> Result<T>
where
    T: Decode<'r, MySql>,
{
    row.try_get_unchecked::<T, _>(i)
        .map_err(|e| decode_error(table, col, e))
}

fn is_null(
    raw: std::result::Result<MySqlValueRef<'_>, sqlx::Error>,
    table: &str,
    col: &str,
) -> Result<bool> {
    raw.map(|v| v.is_null())
        .map_err(|e| decode_error(table, col, e))
}

/// Convert a MySQL row into values in column order.
pub(super) fn decode_row(
    row: &MySqlRow,
    table: &TableDescriptor,
    kinds: &[WireKind],
) -> Result<Row> {
    let mut values = Vec::with_capacity(kinds.len());
    for (i, (kind, col)) in kinds.iter().zip(&table.columns).enumerate() {
        if is_null(row.try_get_raw(i), &table.name, &col.name)? {
            values.push(SqlValue::Null(null_type(*kind)));
            continue;
        }

        let name = &table.name;
        let value = match kind {
            WireKind::Signed => SqlValue::I64(get::<i64>(row, i, name, &col.name)?),
            WireKind::Unsigned => {
                let v = get::<u64>(row, i, name, &col.name)?;
                match i64::try_from(v) {
                    Ok(v) => SqlValue::I64(v),
                    Err(_) => SqlValue::Decimal(Decimal::from(v)),
                }
            }
            WireKind::Bool => SqlValue::Bool(get::<u64>(row, i, name, &col.name)? != 0),
            WireKind::Float => SqlValue::F64(get::<f64>(row, i, name, &col.name)?),
            WireKind::Decimal => {
                // Read as text so values beyond rust_decimal's 28 digits survive.
                let s = get::<String>(row, i, name, &col.name)?;
                match s.parse::<Decimal>() {
                    Ok(d) => SqlValue::Decimal(d),
                    Err(_) => SqlValue::text_owned(s),
                }
            }
            WireKind::Text => match row.try_get_unchecked::<String, _>(i) {
                Ok(s) => SqlValue::text_owned(s),
                Err(_) => {
                    let raw = get::<Vec<u8>>(row, i, name, &col.name)?;
                    SqlValue::text_owned(String::from_utf8_lossy(&raw).into_owned())
                }
            },
            WireKind::Bytes => SqlValue::bytes_owned(get::<Vec<u8>>(row, i, name, &col.name)?),
            // Zero dates ('0000-00-00') have no calendar value.
            WireKind::Date => row
                .try_get_unchecked::<chrono::NaiveDate, _>(i)
                .map(SqlValue::Date)
                .unwrap_or(SqlValue::Null(SqlNullType::Date)),
            WireKind::DateTime => row
                .try_get_unchecked::<chrono::NaiveDateTime, _>(i)
                .map(SqlValue::DateTime)
                .unwrap_or(SqlValue::Null(SqlNullType::DateTime)),
            WireKind::Time => SqlValue::Time(get::<chrono::NaiveTime>(row, i, name, &col.name)?),
        };
        values.push(value);
    }
    Ok(values)
}

/// Spawn the background reader for `table`.
pub(super) fn spawn_reader(
    pool: MySqlPool,
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
    pool: &MySqlPool,
    table: &TableDescriptor,
    batch_size: usize,
    tx: &mpsc::Sender<Result<Batch>>,
) -> Result<usize> {
    let sql = MysqlDialect.select_sql(table)?;
    let kinds: Vec<WireKind> = table.columns.iter().map(wire_kind).collect();

    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| MigrateError::read(&table.name, e))?;

    debug!("{}: {}", table.name, sql);
    let stream = sqlx::query(&sql).fetch(&mut *conn);
    let total = pump_rows(stream, &table.name, batch_size, tx, |row| {
        decode_row(row, table, &kinds)
    })
    .await?;

    debug!("{}: read {} rows", table.name, total);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_value_error_is_not_null() {
        let raw = Err(sqlx::Error::ColumnIndexOutOfBounds { index: 3, len: 2 });
        let err = is_null(raw, "orders", "total").unwrap_err();
        assert!(matches!(err, MigrateError::DataCopy { row_index: None, .. }));
        assert!(err.to_string().contains("column total"));
    }

    fn col(native: &str) -> ColumnDescriptor {
        let generic = classify(DialectKind::Mysql, native).generic;
        ColumnDescriptor::new("c", native, generic)
    }

    #[test]
    fn test_wire_kind() {
        assert_eq!(wire_kind(&col("tinyint(1)")), WireKind::Bool);
        assert_eq!(wire_kind(&col("int(11)")), WireKind::Signed);
        assert_eq!(wire_kind(&col("int(10) unsigned")), WireKind::Unsigned);
        assert_eq!(wire_kind(&col("bigint(20) unsigned")), WireKind::Unsigned);
        assert_eq!(wire_kind(&col("decimal(10,2)")), WireKind::Decimal);
        assert_eq!(wire_kind(&col("varchar(255)")), WireKind::Text);
        assert_eq!(wire_kind(&col("json")), WireKind::Text);
        assert_eq!(wire_kind(&col("longblob")), WireKind::Bytes);
        assert_eq!(wire_kind(&col("timestamp")), WireKind::DateTime);
        assert_eq!(wire_kind(&col("geometry")), WireKind::Bytes);
    }

    #[test]
    fn test_normalize_default() {
        assert_eq!(
            normalize_default(Some("abc".into()), Some(""), GenericType::Varchar(10)),
            Some("'abc'".to_string())
        );
        assert_eq!(
            normalize_default(Some("'abc'".into()), None, GenericType::Varchar(10)),
            Some("'abc'".to_string())
        );
        assert_eq!(
            normalize_default(Some("0".into()), Some(""), GenericType::Integer),
            Some("0".to_string())
        );
        assert_eq!(
            normalize_default(
                Some("CURRENT_TIMESTAMP".into()),
                Some("DEFAULT_GENERATED"),
                GenericType::DateTime
            ),
            None
        );
        assert_eq!(normalize_default(None, None, GenericType::Text), None);
    }
}
