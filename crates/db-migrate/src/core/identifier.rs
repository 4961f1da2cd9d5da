//! Identifier validation and per-dialect quoting.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! generated statement splices them in quoted form. Names are validated first
//! (empty, null bytes, length) and then wrapped in the dialect's quote
//! character with embedded quote characters doubled.

use crate::error::{MigrateError, Result};

/// Maximum identifier length accepted from any source.
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
/// - SQLite: unlimited
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers longer than [`MAX_IDENTIFIER_LENGTH`] bytes.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier: `"name"` with `"` doubled.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a SQLite identifier.
///
/// SQLite accepts backticks and brackets for compatibility, but the
/// standard double quote is the only form that is never ambiguous.
pub fn quote_sqlite(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier: `` `name` `` with backticks doubled.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Qualify a PostgreSQL table name with its schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Quote a list of column names with `quote` and join them with `", "`.
pub fn quote_list<F>(names: &[String], quote: F) -> Result<String>
where
    F: Fn(&str) -> Result<String>,
{
    let quoted = names
        .iter()
        .map(|n| quote(n))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}
