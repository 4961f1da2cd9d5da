//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Backtick quoting, `?` placeholders and literals written for the default
//! `sql_mode`, where a backslash inside a string literal is an escape.

use crate::config::DialectKind;
use crate::core::identifier::quote_mysql;
use crate::core::schema::ColumnDescriptor;
use crate::core::traits::Dialect;
use crate::core::value::{format_datetime, format_time, to_hex, SqlValue};
use crate::error::Result;

/// Maximum placeholders in one prepared statement (u16 on the wire).
pub const MYSQL_MAX_PARAMS: usize = 65_535;

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

/// Quote a string literal, escaping backslashes as well as quotes.
fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Re-quote a standard `'...'` default literal for MySQL, whose parser treats
/// a backslash inside it as an escape. Other defaults pass through.
fn default_sql(default: &str) -> String {
    match default
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        Some(inner) => quote_string(&inner.replace("''", "'")),
        None => default.to_string(),
    }
}

/// TEXT and BLOB columns cannot carry a literal DEFAULT before 8.0.13.
fn accepts_default(native_type: &str) -> bool {
    let upper = native_type.to_uppercase();
    !(upper.contains("TEXT") || upper.contains("BLOB") || upper.starts_with("JSON"))
}

impl Dialect for MysqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn max_params(&self) -> usize {
        MYSQL_MAX_PARAMS
    }

    fn table_options(&self) -> &'static str {
        " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    }

    fn column_sql(&self, column: &ColumnDescriptor) -> Result<String> {
        let mut sql = format!("{} {}", self.quote_ident(&column.name)?, column.native_type);
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if accepts_default(&column.native_type) {
            if let Some(default) = column.portable_default().filter(|d| *d != "NULL") {
                sql.push_str(" DEFAULT ");
                sql.push_str(&default_sql(default));
            }
        }
        Ok(sql)
    }

    fn literal(&self, value: &SqlValue<'_>) -> String {
        match value {
            SqlValue::Null(_) => "NULL".to_string(),
            SqlValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F64(v) if v.is_finite() => v.to_string(),
            SqlValue::F64(_) => "NULL".to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) => quote_string(v),
            SqlValue::Bytes(v) if v.is_empty() => "''".to_string(),
            SqlValue::Bytes(v) => format!("X'{}'", to_hex(v)),
            SqlValue::Uuid(v) => format!("'{}'", v),
            SqlValue::DateTime(v) => format!("'{}'", format_datetime(v)),
            SqlValue::DateTimeOffset(v) => format!("'{}'", format_datetime(&v.naive_utc())),
            SqlValue::Date(v) => format!("'{}'", v.format("%Y-%m-%d")),
            SqlValue::Time(v) => format!("'{}'", format_time(v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::TableDescriptor;
    use crate::dialect::GenericType;
    use chrono::NaiveDate;

    #[test]
    fn test_quote_ident() {
        let dialect = MysqlDialect::new();
        assert_eq!(dialect.quote_ident("users").unwrap(), "`users`");
        assert_eq!(dialect.quote_ident("my`table").unwrap(), "`my``table`");
    }

    #[test]
    fn test_create_table_sql() {
        let mut body = ColumnDescriptor::new("body", "TEXT", GenericType::Text);
        body.default_value = Some("''".to_string());
        let mut score = ColumnDescriptor::new("score", "INT", GenericType::Integer);
        score.default_value = Some("0".to_string());
        let table = TableDescriptor::new(
            "posts",
            vec![
                ColumnDescriptor::new("id", "BIGINT", GenericType::BigInt).primary_key(),
                body,
                score,
            ],
        );

        let sql = MysqlDialect.create_table_sql(&table, true).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS `posts` (\n    `id` BIGINT NOT NULL,\n    `body` TEXT,\n    `score` INT DEFAULT 0,\n    PRIMARY KEY (`id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
        );
    }

    #[test]
    fn test_string_defaults_escape_backslashes() {
        let column = |default: &str| {
            let mut col = ColumnDescriptor::new("path", "VARCHAR(20)", GenericType::Varchar(20));
            col.default_value = Some(default.to_string());
            MysqlDialect.column_sql(&col).unwrap()
        };
        assert_eq!(column(r"'a\b'"), r"`path` VARCHAR(20) DEFAULT 'a\\b'");
        assert_eq!(column("'it''s'"), "`path` VARCHAR(20) DEFAULT 'it''s'");
        assert_eq!(column("''"), "`path` VARCHAR(20) DEFAULT ''");
        assert_eq!(default_sql("42"), "42");
    }

    #[test]
    fn test_insert_sql_uses_question_marks() {
        let cols = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            MysqlDialect.insert_sql("t", &cols, 2).unwrap(),
            "INSERT INTO `t` (`a`, `b`) VALUES (?, ?), (?, ?)"
        );
    }

    #[test]
    fn test_literals() {
        let d = MysqlDialect;
        assert_eq!(d.literal(&SqlValue::from("it's a \\ path")), "'it''s a \\\\ path'");
        assert_eq!(d.literal(&SqlValue::Bool(true)), "1");
        assert_eq!(d.literal(&SqlValue::from(vec![0xde, 0xad])), "X'dead'");
        assert_eq!(d.literal(&SqlValue::F64(f64::NAN)), "NULL");
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(d.literal(&SqlValue::DateTime(dt)), "'2024-01-02 03:04:05'");
    }
}
