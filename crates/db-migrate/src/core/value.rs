//! SQL value types for database-agnostic data transfer.
//!
//! Readers decode every engine's wire values into [`SqlValue`]; writers bind
//! them back, coercing where the target column type differs (a SQLite TEXT
//! timestamp bound to a PostgreSQL TIMESTAMP parameter, an integer bound to a
//! BOOLEAN...). The coercion helpers live here so every writer agrees on them.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Type hint for NULL values.
///
/// Writers that must declare a parameter type for NULL (PostgreSQL) or that
/// render typed literals use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I64,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// SQL value with `Cow` payloads for strings and bytes.
///
/// Rows that cross the read-ahead channel are always `SqlValue<'static>`;
/// the lifetime only matters for values built from borrowed buffers.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    /// NULL with a type hint.
    Null(SqlNullType),

    /// Boolean value.
    Bool(bool),

    /// Any integer; readers widen every integer type to 64 bits.
    I64(i64),

    /// Any binary floating point value.
    F64(f64),

    /// Exact decimal.
    Decimal(Decimal),

    /// Text data.
    Text(Cow<'a, str>),

    /// Binary data.
    Bytes(Cow<'a, [u8]>),

    /// UUID value.
    Uuid(Uuid),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

/// One row, positionally bound to a table's column order.
pub type Row = Vec<SqlValue<'static>>;

impl<'a> SqlValue<'a> {
    /// Convert to a fully owned value with `'static` lifetime.
    #[must_use]
    pub fn into_owned(self) -> SqlValue<'static> {
        match self {
            SqlValue::Null(t) => SqlValue::Null(t),
            SqlValue::Bool(v) => SqlValue::Bool(v),
            SqlValue::I64(v) => SqlValue::I64(v),
            SqlValue::F64(v) => SqlValue::F64(v),
            SqlValue::Decimal(v) => SqlValue::Decimal(v),
            SqlValue::Text(v) => SqlValue::Text(Cow::Owned(v.into_owned())),
            SqlValue::Bytes(v) => SqlValue::Bytes(Cow::Owned(v.into_owned())),
            SqlValue::Uuid(v) => SqlValue::Uuid(v),
            SqlValue::DateTime(v) => SqlValue::DateTime(v),
            SqlValue::DateTimeOffset(v) => SqlValue::DateTimeOffset(v),
            SqlValue::Date(v) => SqlValue::Date(v),
            SqlValue::Time(v) => SqlValue::Time(v),
        }
    }

    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Create a text value from an owned String.
    #[must_use]
    pub fn text_owned(s: String) -> SqlValue<'static> {
        SqlValue::Text(Cow::Owned(s))
    }

    /// Create a bytes value from an owned Vec<u8>.
    #[must_use]
    pub fn bytes_owned(b: Vec<u8>) -> SqlValue<'static> {
        SqlValue::Bytes(Cow::Owned(b))
    }

    /// Render the value as text, the way a TEXT column stores it.
    ///
    /// Returns `None` for NULL. Binary data that is not UTF-8 is rendered as
    /// lowercase hex.
    pub fn to_text(&self) -> Option<String> {
        Some(match self {
            SqlValue::Null(_) => return None,
            SqlValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) => v.to_string(),
            SqlValue::Bytes(v) => match std::str::from_utf8(v) {
                Ok(s) => s.to_string(),
                Err(_) => to_hex(v),
            },
            SqlValue::Uuid(v) => v.to_string(),
            SqlValue::DateTime(v) => format_datetime(v),
            SqlValue::DateTimeOffset(v) => v.to_rfc3339(),
            SqlValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            SqlValue::Time(v) => format_time(v),
        })
    }

    /// Coerce to an integer. Fractional numbers are rejected.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Bool(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::F64(v) if v.fract() == 0.0 => v.to_i64(),
            SqlValue::Decimal(v) if v.fract().is_zero() => v.to_i64(),
            SqlValue::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    /// Coerce to a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            SqlValue::I64(v) => v.to_f64(),
            SqlValue::F64(v) => Some(*v),
            SqlValue::Decimal(v) => v.to_f64(),
            SqlValue::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    /// Coerce to an exact decimal.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SqlValue::Bool(v) => Some(Decimal::from(i64::from(*v))),
            SqlValue::I64(v) => Some(Decimal::from(*v)),
            SqlValue::F64(v) => Decimal::from_f64(*v),
            SqlValue::Decimal(v) => Some(*v),
            SqlValue::Text(v) => {
                let s = v.trim();
                s.parse::<Decimal>()
                    .ok()
                    .or_else(|| Decimal::from_scientific(s).ok())
            }
            _ => None,
        }
    }

    /// Coerce to a boolean. Integers are true when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            SqlValue::I64(v) => Some(*v != 0),
            SqlValue::F64(v) => Some(*v != 0.0),
            SqlValue::Decimal(v) => Some(!v.is_zero()),
            SqlValue::Text(v) => match v.trim().to_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" | "on" => Some(true),
                "0" | "f" | "false" | "n" | "no" | "off" => Some(false),
                _ => None,
            },
            SqlValue::Bytes(v) if v.len() == 1 => Some(v[0] != 0),
            _ => None,
        }
    }

    /// Coerce to a naive timestamp.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::DateTime(v) => Some(*v),
            SqlValue::DateTimeOffset(v) => Some(v.naive_utc()),
            SqlValue::Date(v) => v.and_hms_opt(0, 0, 0),
            SqlValue::Text(v) => parse_datetime(v),
            _ => None,
        }
    }

    /// Coerce to a timestamp with offset; naive values are taken as UTC.
    pub fn as_datetime_offset(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            SqlValue::DateTimeOffset(v) => Some(*v),
            SqlValue::Text(v) => DateTime::parse_from_rfc3339(v.trim())
                .ok()
                .or_else(|| parse_datetime(v).map(|dt| dt.and_utc().fixed_offset())),
            other => other.as_datetime().map(|dt| dt.and_utc().fixed_offset()),
        }
    }

    /// Coerce to a date.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SqlValue::Date(v) => Some(*v),
            SqlValue::DateTime(v) => Some(v.date()),
            SqlValue::DateTimeOffset(v) => Some(v.date_naive()),
            SqlValue::Text(v) => NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
                .ok()
                .or_else(|| parse_datetime(v).map(|dt| dt.date())),
            _ => None,
        }
    }

    /// Coerce to a time of day.
    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            SqlValue::Time(v) => Some(*v),
            SqlValue::DateTime(v) => Some(v.time()),
            SqlValue::Text(v) => {
                let s = v.trim();
                NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                    .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                    .ok()
            }
            _ => None,
        }
    }

    /// Coerce to raw bytes. Text is taken as its UTF-8 encoding.
    pub fn as_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            SqlValue::Bytes(v) => Some(Cow::Borrowed(v.as_ref())),
            SqlValue::Text(v) => Some(Cow::Borrowed(v.as_bytes())),
            SqlValue::Null(_) => None,
            other => other.to_text().map(|s| Cow::Owned(s.into_bytes())),
        }
    }

    /// Coerce to a UUID.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            SqlValue::Uuid(v) => Some(*v),
            SqlValue::Text(v) => Uuid::parse_str(v.trim()).ok(),
            SqlValue::Bytes(v) => Uuid::from_slice(v).ok(),
            _ => None,
        }
    }
}

impl From<bool> for SqlValue<'static> {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue<'static> {
    fn from(v: i32) -> Self {
        SqlValue::I64(i64::from(v))
    }
}

impl From<i64> for SqlValue<'static> {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue<'static> {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue<'static> {
    fn from(v: String) -> Self {
        SqlValue::Text(Cow::Owned(v))
    }
}

impl<'a> From<&'a str> for SqlValue<'a> {
    fn from(v: &'a str) -> Self {
        SqlValue::Text(Cow::Borrowed(v))
    }
}

impl From<Vec<u8>> for SqlValue<'static> {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(Cow::Owned(v))
    }
}

impl From<Decimal> for SqlValue<'static> {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue<'static> {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue<'static> {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

/// Format a timestamp as `YYYY-MM-DD HH:MM:SS[.ffffff]`.
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Format a time as `HH:MM:SS[.ffffff]`.
pub fn format_time(t: &NaiveTime) -> String {
    if t.nanosecond() == 0 {
        t.format("%H:%M:%S").to_string()
    } else {
        t.format("%H:%M:%S%.6f").to_string()
    }
}

/// Parse the timestamp spellings engines store as text.
///
/// Accepts a space or `T` separator, optional fractional seconds, an optional
/// RFC 3339 offset (normalized to UTC) and a bare date (midnight).
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Lowercase hex encoding.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// A batch of rows for streaming transfer.
#[derive(Debug, Default)]
pub struct Batch {
    /// Rows in this batch (owned for channel transfer).
    pub rows: Vec<Row>,

    /// Position of the first row of this batch within the table stream.
    pub offset: usize,

    /// Whether this is the final batch for the table.
    pub is_last: bool,
}

impl Batch {
    /// Create a new batch starting at `offset`.
    pub fn new(rows: Vec<Row>, offset: usize) -> Self {
        Self {
            rows,
            offset,
            is_last: false,
        }
    }

    /// Create an empty final batch.
    pub fn empty_final(offset: usize) -> Self {
        Self {
            rows: Vec::new(),
            offset,
            is_last: true,
        }
    }

    /// Mark this as the final batch.
    pub fn mark_final(mut self) -> Self {
        self.is_last = true;
        self
    }

    /// Get the number of rows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
