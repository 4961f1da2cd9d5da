//! In-memory adapter for orchestrator and transfer tests.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::DialectKind;
use crate::core::identifier::quote_sqlite;
use crate::core::schema::{ColumnDescriptor, TableDescriptor};
use crate::core::traits::Adapter;
use crate::core::value::{Batch, Row, SqlValue};
use crate::dialect::GenericType;
use crate::error::{MigrateError, Result};

#[derive(Debug, Clone)]
struct MockTable {
    descriptor: TableDescriptor,
    rows: Vec<Row>,
}

/// Adapter keeping tables in memory, with failure injection.
///
/// A transaction snapshots every table; rollback restores the snapshot.
#[derive(Debug)]
pub struct MockAdapter {
    dialect: DialectKind,
    tables: Vec<MockTable>,
    snapshot: Option<Vec<MockTable>>,
    fail_values: Vec<(String, i64)>,
    fail_schema: HashSet<String>,
    fail_ddl: HashSet<String>,
    lock_failures: usize,
    pub write_calls: usize,
    pub closed: bool,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            dialect: DialectKind::Sqlite,
            tables: Vec::new(),
            snapshot: None,
            fail_values: Vec::new(),
            fail_schema: HashSet::new(),
            fail_ddl: HashSet::new(),
            lock_failures: 0,
            write_calls: 0,
            closed: false,
        }
    }

    pub fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_table(mut self, descriptor: TableDescriptor, rows: Vec<Row>) -> Self {
        self.tables.push(MockTable { descriptor, rows });
        self
    }

    /// Rows of `table` whose first column equals `value` are rejected.
    pub fn fail_on_value(mut self, table: &str, value: i64) -> Self {
        self.fail_values.push((table.to_string(), value));
        self
    }

    pub fn fail_schema(mut self, table: &str) -> Self {
        self.fail_schema.insert(table.to_string());
        self
    }

    pub fn fail_ddl(mut self, table: &str) -> Self {
        self.fail_ddl.insert(table.to_string());
        self
    }

    /// The next `n` `write_rows` calls fail with a retryable lock error.
    pub fn lock_failures(mut self, n: usize) -> Self {
        self.lock_failures = n;
        self
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.descriptor.name == name)
    }

    pub fn rows(&self, name: &str) -> Option<&[Row]> {
        self.find(name).map(|t| t.rows.as_slice())
    }

    pub fn descriptor(&self, name: &str) -> Option<&TableDescriptor> {
        self.find(name).map(|t| &t.descriptor)
    }

    fn find(&self, name: &str) -> Option<&MockTable> {
        self.tables.iter().find(|t| t.descriptor.name == name)
    }

    fn first_bad_row(&self, table: &str, rows: &[Row]) -> Option<usize> {
        rows.iter().position(|row| {
            let first = row.first().and_then(SqlValue::as_i64);
            self.fail_values
                .iter()
                .any(|(t, v)| t == table && first == Some(*v))
        })
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn dialect(&self) -> DialectKind {
        self.dialect
    }

    fn quote_identifier(&self, name: &str) -> Result<String> {
        quote_sqlite(name)
    }

    async fn server_version(&mut self) -> Result<String> {
        Ok("mock".to_string())
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.descriptor.name.clone()).collect())
    }

    async fn get_schema(&mut self, table: &str) -> Result<TableDescriptor> {
        if self.fail_schema.contains(table) {
            return Err(MigrateError::schema(table, "table not found or has no columns"));
        }
        self.find(table)
            .map(|t| t.descriptor.clone())
            .ok_or_else(|| MigrateError::schema(table, "table not found or has no columns"))
    }

    async fn create_table(&mut self, table: &TableDescriptor, drop_first: bool) -> Result<()> {
        if self.fail_ddl.contains(&table.name) {
            return Err(MigrateError::ddl(&table.name, "syntax error"));
        }
        if drop_first {
            self.tables.retain(|t| t.descriptor.name != table.name);
        }
        if !self.has_table(&table.name) {
            self.tables.push(MockTable {
                descriptor: table.clone(),
                rows: Vec::new(),
            });
        }
        Ok(())
    }

    fn read_rows(
        &self,
        table: &TableDescriptor,
        batch_size: usize,
        read_ahead: usize,
    ) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(read_ahead.max(1));
        let rows = self.find(&table.name).map(|t| t.rows.clone());
        let name = table.name.clone();

        tokio::spawn(async move {
            let Some(rows) = rows else {
                let _ = tx.send(Err(MigrateError::read(name, "no such table"))).await;
                return;
            };
            if rows.is_empty() {
                let _ = tx.send(Ok(Batch::empty_final(0))).await;
                return;
            }
            let chunks: Vec<Vec<Row>> = rows.chunks(batch_size.max(1)).map(|c| c.to_vec()).collect();
            let count = chunks.len();
            let mut offset = 0;
            for (i, chunk) in chunks.into_iter().enumerate() {
                let len = chunk.len();
                let mut batch = Batch::new(chunk, offset);
                if i + 1 == count {
                    batch = batch.mark_final();
                }
                if tx.send(Ok(batch)).await.is_err() {
                    return;
                }
                offset += len;
            }
        });

        rx
    }

    async fn write_rows(&mut self, table: &str, _columns: &[String], rows: &[Row]) -> Result<u64> {
        self.write_calls += 1;
        if self.lock_failures > 0 {
            self.lock_failures -= 1;
            return Err(MigrateError::write(table, 0, "database is locked", true));
        }
        if let Some(idx) = self.first_bad_row(table, rows) {
            return Err(MigrateError::write(table, idx, "malformed value", false));
        }
        let target = self
            .tables
            .iter_mut()
            .find(|t| t.descriptor.name == table)
            .ok_or_else(|| MigrateError::write(table, 0, "no such table", false))?;
        target.rows.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        if self.snapshot.is_some() {
            return Err(MigrateError::transaction("a transaction is already open"));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| MigrateError::transaction("commit without an open transaction"))
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(snapshot) = self.snapshot.take() {
            self.tables = snapshot;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    async fn close(&mut self) {
        let _ = self.rollback().await;
        self.closed = true;
    }
}

/// `(id INTEGER PRIMARY KEY, name TEXT)`.
pub fn simple_table(name: &str) -> TableDescriptor {
    TableDescriptor::new(
        name,
        vec![
            ColumnDescriptor::new("id", "INTEGER", GenericType::Integer).primary_key(),
            ColumnDescriptor::new("name", "TEXT", GenericType::Text),
        ],
    )
}

/// Rows `0..n` for [`simple_table`].
pub fn int_rows(n: usize) -> Vec<Row> {
    (0..n as i64)
        .map(|i| vec![SqlValue::I64(i), SqlValue::text_owned(format!("row {}", i))])
        .collect()
}
