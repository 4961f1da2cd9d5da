//! Core traits for database-agnostic data migration.
//!
//! - [`Adapter`]: the capability contract every engine implements (schema
//!   introspection, DDL, streamed reads, transactional writes)
//! - [`Dialect`]: SQL syntax strategy for one engine
//! - [`TypeMapper`]: maps column types from a source dialect to a target dialect

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::DialectKind;
use crate::dialect::GenericType;
use crate::error::Result;

use super::schema::{ColumnDescriptor, TableDescriptor};
use super::value::{Batch, Row, SqlValue};

/// Uniform access to one database endpoint.
///
/// An adapter owns its connection(s) exclusively. At most one transaction is
/// open at a time; `write_rows` outside an explicit transaction runs in an
/// implicit one.
///
/// # Streaming
///
/// [`read_rows`](Adapter::read_rows) spawns a background task feeding a
/// bounded channel, so a table is never materialized in memory and the writer
/// applies backpressure to the reader.
#[async_trait]
pub trait Adapter: Send {
    /// Engine of this endpoint.
    fn dialect(&self) -> DialectKind;

    /// Human readable engine name (MySQL, SQLite, PostgreSQL).
    fn display_name(&self) -> &'static str {
        self.dialect().display_name()
    }

    /// Quote a table or column name for this engine.
    fn quote_identifier(&self, name: &str) -> Result<String>;

    /// Server version string, used by the health check.
    async fn server_version(&mut self) -> Result<String>;

    /// Base tables in listing order. Views and system tables are excluded.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Introspect a table.
    ///
    /// Fails with `SchemaIntrospection` when the table has no columns, which
    /// is how a table dropped since listing shows up.
    async fn get_schema(&mut self, table: &str) -> Result<TableDescriptor>;

    /// Create a table whose column `native_type`s are already in this
    /// engine's vocabulary.
    ///
    /// With `drop_first` the table is dropped if it exists; otherwise an
    /// existing table is kept.
    async fn create_table(&mut self, table: &TableDescriptor, drop_first: bool) -> Result<()>;

    /// Start streaming the table's rows in column order.
    ///
    /// Batches hold at most `batch_size` rows and at most `read_ahead`
    /// batches are buffered. The last batch has `is_last` set. A read error
    /// is delivered as the final item.
    fn read_rows(
        &self,
        table: &TableDescriptor,
        batch_size: usize,
        read_ahead: usize,
    ) -> mpsc::Receiver<Result<Batch>>;

    /// Insert rows, binding values positionally to `columns`.
    ///
    /// Either every row is written or none is: a failure rolls back to a
    /// savepoint taken at the start of the call and is reported as
    /// `DataCopy` carrying the index of the first failing row.
    async fn write_rows(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<u64>;

    /// Open a transaction on the pinned write connection.
    async fn begin_transaction(&mut self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction. A no-op when none is open.
    async fn rollback(&mut self) -> Result<()>;

    /// Whether a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Release every connection, rolling back any open transaction.
    ///
    /// Idempotent.
    async fn close(&mut self);
}

/// SQL syntax strategy for one engine.
///
/// The statement builders are template methods over [`quote_ident`],
/// [`qualify`] and [`param_placeholder`]; engines override only what differs.
///
/// [`quote_ident`]: Dialect::quote_ident
/// [`qualify`]: Dialect::qualify
/// [`param_placeholder`]: Dialect::param_placeholder
pub trait Dialect: Send + Sync {
    /// Engine this dialect speaks.
    fn kind(&self) -> DialectKind;

    /// Dialect identifier ("mysql", "sqlite", "postgresql").
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Quote a table name, schema-qualified where the engine needs it.
    fn qualify(&self, table: &str) -> Result<String> {
        self.quote_ident(table)
    }

    /// Parameter placeholder for the given 1-based index.
    fn param_placeholder(&self, index: usize) -> String;

    /// Maximum bind parameters in one statement.
    fn max_params(&self) -> usize;

    /// Render a value as a SQL literal.
    fn literal(&self, value: &SqlValue<'_>) -> String;

    /// Trailing table options appended after the closing parenthesis of
    /// CREATE TABLE (storage engine, charset).
    fn table_options(&self) -> &'static str {
        ""
    }

    /// Column definition: name, type, nullability, portable default.
    fn column_sql(&self, column: &ColumnDescriptor) -> Result<String> {
        let mut sql = format!("{} {}", self.quote_ident(&column.name)?, column.native_type);
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = column.portable_default() {
            if default != "NULL" {
                sql.push_str(" DEFAULT ");
                sql.push_str(default);
            }
        }
        Ok(sql)
    }

    /// CREATE TABLE with a table-level PRIMARY KEY.
    fn create_table_sql(&self, table: &TableDescriptor, if_not_exists: bool) -> Result<String> {
        let mut defs = table
            .columns
            .iter()
            .map(|c| self.column_sql(c))
            .collect::<Result<Vec<_>>>()?;

        if table.has_primary_key() {
            let pk = table
                .primary_key
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Result<Vec<_>>>()?;
            defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
        }

        Ok(format!(
            "CREATE TABLE {}{} (\n    {}\n){}",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            self.qualify(&table.name)?,
            defs.join(",\n    "),
            self.table_options()
        ))
    }

    /// DROP TABLE IF EXISTS.
    fn drop_table_sql(&self, table: &str) -> Result<String> {
        Ok(format!("DROP TABLE IF EXISTS {}", self.qualify(table)?))
    }

    /// Multi-row INSERT with `row_count` groups of placeholders.
    fn insert_sql(&self, table: &str, columns: &[String], row_count: usize) -> Result<String> {
        let cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Result<Vec<_>>>()?;

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ",
            self.qualify(table)?,
            cols.join(", ")
        );
        let mut index = 1;
        for row in 0..row_count {
            if row > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for col in 0..columns.len() {
                if col > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&self.param_placeholder(index));
                index += 1;
            }
            sql.push(')');
        }
        Ok(sql)
    }

    /// Select expression for one column. Engines cast here when the wire
    /// type needs normalizing.
    fn select_expr(&self, column: &ColumnDescriptor) -> Result<String> {
        self.quote_ident(&column.name)
    }

    /// SELECT of every column in ordinal order, in primary key order when
    /// the table has one.
    fn select_sql(&self, table: &TableDescriptor) -> Result<String> {
        let cols = table
            .columns
            .iter()
            .map(|c| self.select_expr(c))
            .collect::<Result<Vec<_>>>()?;
        let mut sql = format!(
            "SELECT {} FROM {}",
            cols.join(", "),
            self.qualify(&table.name)?
        );
        if table.has_primary_key() {
            let pk = table
                .primary_key
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&pk.join(", "));
        }
        Ok(sql)
    }

    /// Rows per INSERT statement that stay under the parameter limit.
    fn rows_per_statement(&self, column_count: usize, batch_size: usize) -> usize {
        (self.max_params() / column_count.max(1)).clamp(1, batch_size.max(1))
    }
}

/// Maps column types from one dialect to another.
pub trait TypeMapper: Send + Sync {
    /// Source dialect name.
    fn source_dialect(&self) -> &str;

    /// Target dialect name.
    fn target_dialect(&self) -> &str;

    /// Map a native source type string to a target type string.
    fn map_type(&self, native_type: &str) -> TypeMapping;

    /// Map a column from source to target.
    fn map_column(&self, col: &ColumnDescriptor) -> ColumnMapping {
        let mapping = self.map_type(&col.native_type);
        ColumnMapping {
            name: col.name.clone(),
            generic: mapping.generic,
            target_type: mapping.target_type,
            warning: mapping.warning,
        }
    }
}

/// Result of mapping a column from source to target.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    /// Column name (unchanged).
    pub name: String,
    /// Category the source type classified to.
    pub generic: GenericType,
    /// Target data type string.
    pub target_type: String,
    /// Warning if the mapping is lossy or fell back.
    pub warning: Option<String>,
}

/// Result of mapping a type from source to target.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMapping {
    /// Category the type went through.
    pub generic: GenericType,
    /// Target type string (e.g. "VARCHAR(255)", "BIGINT").
    pub target_type: String,
    /// Whether this mapping loses data or precision.
    pub is_lossy: bool,
    /// Warning message for lossy mappings.
    pub warning: Option<String>,
}

impl TypeMapping {
    /// Create a lossless type mapping.
    pub fn lossless(generic: GenericType, target_type: impl Into<String>) -> Self {
        Self {
            generic,
            target_type: target_type.into(),
            is_lossy: false,
            warning: None,
        }
    }

    /// Create a lossy type mapping with a warning.
    pub fn lossy(
        generic: GenericType,
        target_type: impl Into<String>,
        warning: impl Into<String>,
    ) -> Self {
        Self {
            generic,
            target_type: target_type.into(),
            is_lossy: true,
            warning: Some(warning.into()),
        }
    }
}
