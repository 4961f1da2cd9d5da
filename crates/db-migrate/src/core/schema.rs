//! Table and column descriptors.
//!
//! Descriptors are built fresh by `Adapter::get_schema` on every run and are
//! discarded once the table's DDL and copy are done.

use serde::{Deserialize, Serialize};

use crate::dialect::GenericType;

/// One column of a table, in ordinal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name, unique within its table.
    pub name: String,

    /// Type exactly as the engine reports it (e.g. `varchar(255)`).
    pub native_type: String,

    /// Category the native type classifies to.
    pub generic: GenericType,

    /// Whether NULL is allowed.
    pub nullable: bool,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Default expression as reported by the engine.
    pub default_value: Option<String>,

    /// Character length for string types.
    pub length: Option<u32>,

    /// Numeric precision.
    pub precision: Option<u32>,

    /// Numeric scale.
    pub scale: Option<u32>,
}

impl ColumnDescriptor {
    /// Create a nullable, non-key column.
    pub fn new(name: impl Into<String>, native_type: impl Into<String>, generic: GenericType) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.into(),
            generic,
            nullable: true,
            is_primary_key: false,
            default_value: None,
            length: None,
            precision: None,
            scale: None,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column as (part of) the primary key.
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    /// Default value when it is a plain literal that every dialect accepts.
    ///
    /// Numeric literals, single-quoted strings and NULL qualify; function
    /// calls, sequences and casts do not.
    pub fn portable_default(&self) -> Option<&str> {
        let raw = self.default_value.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.eq_ignore_ascii_case("null") {
            return Some("NULL");
        }
        if raw.parse::<f64>().is_ok()
            && raw.chars().all(|c| c.is_ascii_digit() || "+-.eE".contains(c))
        {
            return Some(raw);
        }
        if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
            let inner = &raw[1..raw.len() - 1];
            // Every embedded quote must be doubled, otherwise the literal
            // ends early and is followed by something else (a cast, a COLLATE...).
            if !inner.replace("''", "").contains('\'') {
                return Some(raw);
            }
        }
        None
    }
}

/// A table: name, ordered columns, primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<ColumnDescriptor>,

    /// Primary key column names, in key order.
    pub primary_key: Vec<String>,
}

impl TableDescriptor {
    /// Create a descriptor, deriving the primary key from column flags.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        let primary_key = columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect();
        Self {
            name: name.into(),
            columns,
            primary_key,
        }
    }

    /// Column names in ordinal order; the positional binding order for inserts.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the table has a primary key.
    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }
}
