//! SQL dump of source tables, translated to any supported dialect.
//!
//! The output is a plain script: a header comment block, then per table a
//! `DROP TABLE IF EXISTS`, the translated `CREATE TABLE` and, unless only
//! the schema is wanted, multi-row `INSERT` statements of `batch_size` rows.

use std::io::Write;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{DialectKind, MigrationJob};
use crate::core::traits::{Adapter, Dialect};
use crate::dialect::mapper;
use crate::drivers::{self, DialectImpl, Role};
use crate::error::{MigrateError, Result};
use crate::orchestrator::translate_table;

/// Rows written per exported table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableExport {
    pub name: String,
    pub rows: u64,
}

/// Connect to the job's source and export its filtered tables.
pub async fn export_sql<W: Write>(
    job: &MigrationJob,
    dialect: DialectKind,
    schema_only: bool,
    out: &mut W,
) -> Result<Vec<TableExport>> {
    let mut source = drivers::connect(&job.source, Role::Source).await?;
    let result = export_with(&mut source, job, dialect, schema_only, out).await;
    source.close().await;
    result
}

/// [`export_sql`] over an open source adapter.
pub async fn export_with<S, W>(
    source: &mut S,
    job: &MigrationJob,
    dialect: DialectKind,
    schema_only: bool,
    out: &mut W,
) -> Result<Vec<TableExport>>
where
    S: Adapter + ?Sized,
    W: Write,
{
    let schema = if job.target.dialect == DialectKind::Postgresql {
        job.target.schema.as_str()
    } else {
        "public"
    };
    let output = DialectImpl::for_kind(dialect, schema);
    let type_mapper = mapper(source.dialect(), dialect);

    writeln!(out, "-- db-migrate export")?;
    writeln!(out, "-- Exported at: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "-- Source database: {}", job.source.database)?;
    writeln!(out, "-- Source dialect: {}", source.dialect().name())?;
    writeln!(out, "-- Output dialect: {}", dialect.name())?;
    writeln!(out)?;

    let tables = job.filter_tables(source.list_tables().await?);
    info!("Exporting {} tables as {}", tables.len(), dialect.display_name());

    let mut exported = Vec::with_capacity(tables.len());
    for name in tables {
        let source_table = source.get_schema(&name).await?;
        let (table, warnings) = translate_table(&source_table, &type_mapper, dialect)?;

        writeln!(out, "-- Table: {}", name)?;
        for w in &warnings {
            warn!("{}: {}", name, w.message);
            match &w.column {
                Some(col) => writeln!(out, "-- Warning ({}): {}", col, w.message)?,
                None => writeln!(out, "-- Warning: {}", w.message)?,
            }
        }
        writeln!(out, "{};", output.drop_table_sql(&name)?)?;
        writeln!(out, "{};", output.create_table_sql(&table, false)?)?;
        writeln!(out)?;

        let mut rows = 0u64;
        if !schema_only {
            rows = write_inserts(source, &output, &source_table, job, out).await?;
            writeln!(out)?;
        }

        info!("Exported table {} ({} rows)", name, rows);
        exported.push(TableExport { name, rows });
    }

    out.flush()?;
    Ok(exported)
}

async fn write_inserts<S, W>(
    source: &mut S,
    output: &DialectImpl,
    table: &crate::core::schema::TableDescriptor,
    job: &MigrationJob,
    out: &mut W,
) -> Result<u64>
where
    S: Adapter + ?Sized,
    W: Write,
{
    let columns = table
        .columns
        .iter()
        .map(|c| output.quote_ident(&c.name))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let qualified = output.qualify(&table.name)?;

    let mut rx = source.read_rows(table, job.batch_size, job.read_ahead_batches);
    let mut rows = 0u64;
    loop {
        let batch = match rx.recv().await {
            Some(batch) => batch?,
            None => {
                return Err(MigrateError::read(
                    &table.name,
                    "reader stopped before the final batch",
                ))
            }
        };

        if !batch.is_empty() {
            writeln!(out, "INSERT INTO {} ({}) VALUES", qualified, columns)?;
            let last = batch.rows.len() - 1;
            for (i, row) in batch.rows.iter().enumerate() {
                let values: Vec<String> = row.iter().map(|v| output.literal(v)).collect();
                let end = if i == last { ";" } else { "," };
                writeln!(out, "  ({}){}", values.join(", "), end)?;
            }
            rows += batch.rows.len() as u64;
        }

        if batch.is_last {
            return Ok(rows);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, MigrationJob};
    use crate::testing::{int_rows, simple_table, MockAdapter};

    fn job() -> MigrationJob {
        let mut job = MigrationJob::new(
            ConnectionConfig::sqlite("/tmp/in.db"),
            ConnectionConfig::sqlite("/tmp/out.db"),
        );
        job.batch_size = 2;
        job
    }

    #[tokio::test]
    async fn test_export_mysql_script() {
        let mut source = MockAdapter::new()
            .with_table(simple_table("users"), int_rows(3))
            .with_table(simple_table("empty"), Vec::new());
        let mut out = Vec::new();

        let summary = export_with(&mut source, &job(), DialectKind::Mysql, false, &mut out)
            .await
            .unwrap();
        assert_eq!(
            summary,
            vec![
                TableExport { name: "users".into(), rows: 3 },
                TableExport { name: "empty".into(), rows: 0 },
            ]
        );

        let sql = String::from_utf8(out).unwrap();
        assert!(sql.starts_with("-- db-migrate export\n"));
        assert!(sql.contains("-- Source dialect: sqlite"));
        assert!(sql.contains("DROP TABLE IF EXISTS `users`;"));
        assert!(sql.contains("`id` INT NOT NULL"));
        // Two INSERT statements for three rows at batch size two.
        assert_eq!(sql.matches("INSERT INTO `users`").count(), 2);
        assert!(sql.contains("  (0, 'row 0'),\n  (1, 'row 1');"));
        assert!(!sql.contains("INSERT INTO `empty`"));
    }

    #[tokio::test]
    async fn test_export_schema_only() {
        let mut source = MockAdapter::new().with_table(simple_table("users"), int_rows(3));
        let mut out = Vec::new();
        let summary = export_with(&mut source, &job(), DialectKind::Postgresql, true, &mut out)
            .await
            .unwrap();
        assert_eq!(summary[0].rows, 0);
        let sql = String::from_utf8(out).unwrap();
        assert!(sql.contains("CREATE TABLE \"public\".\"users\""));
        assert!(!sql.contains("INSERT"));
    }
}
