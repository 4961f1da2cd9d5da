//! Configuration validation.

use std::path::{Path, PathBuf};

use super::types::{ConnectionConfig, DialectKind, MAX_BATCH_SIZE, MIN_BATCH_SIZE};
use super::MigrationJob;
use crate::error::{MigrateError, Result};

/// Validate a migration job.
pub fn validate(job: &MigrationJob) -> Result<()> {
    validate_endpoint("source", &job.source)?;
    validate_endpoint("target", &job.target)?;

    if same_database(&job.source, &job.target) {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&job.batch_size) {
        return Err(MigrateError::Config(format!(
            "batch_size must be between {} and {}, got {}",
            MIN_BATCH_SIZE, MAX_BATCH_SIZE, job.batch_size
        )));
    }
    if job.read_ahead_batches == 0 {
        return Err(MigrateError::Config(
            "read_ahead_batches must be at least 1".into(),
        ));
    }

    if let Some(table) = job
        .include_tables
        .iter()
        .find(|t| job.exclude_tables.contains(t))
    {
        return Err(MigrateError::Config(format!(
            "table '{}' is both included and excluded",
            table
        )));
    }

    Ok(())
}

fn validate_endpoint(role: &str, config: &ConnectionConfig) -> Result<()> {
    if config.database.is_empty() {
        let field = match config.dialect {
            DialectKind::Sqlite => "database (file path)",
            _ => "database",
        };
        return Err(MigrateError::Config(format!("{}.{} is required", role, field)));
    }

    if config.dialect == DialectKind::Sqlite {
        return Ok(());
    }

    if config.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", role)));
    }
    if config.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", role)));
    }
    if config.port() == 0 {
        return Err(MigrateError::Config(format!("{}.port must be non-zero", role)));
    }

    match config.ssl_mode().to_lowercase().as_str() {
        "disable" | "prefer" | "require" | "verify-ca" | "verify-full" => {}
        other => {
            return Err(MigrateError::Config(format!(
                "{}.ssl_mode '{}' is invalid. Valid values: disable, prefer, require, verify-ca, verify-full",
                role, other
            )))
        }
    }

    if config.dialect == DialectKind::Postgresql && config.schema.is_empty() {
        return Err(MigrateError::Config(format!("{}.schema is required", role)));
    }

    Ok(())
}

fn same_database(a: &ConnectionConfig, b: &ConnectionConfig) -> bool {
    if a.dialect != b.dialect {
        return false;
    }
    match a.dialect {
        DialectKind::Sqlite => {
            a.database != ":memory:" && sqlite_file(&a.database) == sqlite_file(&b.database)
        }
        DialectKind::Mysql => {
            a.host == b.host && a.port() == b.port() && a.database == b.database
        }
        DialectKind::Postgresql => {
            a.host == b.host
                && a.port() == b.port()
                && a.database == b.database
                && a.schema == b.schema
        }
    }
}

/// SQLite path in a comparable form: canonical when the file exists,
/// otherwise made absolute against the working directory.
fn sqlite_file(path: &str) -> PathBuf {
    let path = Path::new(path);
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OnErrorPolicy;

    fn mysql(database: &str) -> ConnectionConfig {
        ConnectionConfig {
            dialect: DialectKind::Mysql,
            host: "localhost".to_string(),
            port: None,
            user: "root".to_string(),
            password: "password".to_string(),
            database: database.to_string(),
            schema: "public".to_string(),
            ssl_mode: None,
            connect_timeout_secs: 30,
        }
    }

    fn valid_job() -> MigrationJob {
        MigrationJob::new(mysql("shop"), ConnectionConfig::sqlite("/tmp/shop.db"))
    }

    #[test]
    fn test_valid_job() {
        assert!(validate(&valid_job()).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut job = valid_job();
        job.source.host = "".to_string();
        assert!(validate(&job).is_err());
    }

    #[test]
    fn test_sqlite_needs_only_path() {
        let mut job = valid_job();
        job.target.database = "".to_string();
        let err = validate(&job).unwrap_err();
        assert!(err.to_string().contains("target.database"));
    }

    #[test]
    fn test_same_database_rejected() {
        let job = MigrationJob::new(mysql("shop"), mysql("shop"));
        assert!(validate(&job).is_err());

        let job = MigrationJob::new(mysql("shop"), mysql("shop_copy"));
        assert!(validate(&job).is_ok());
    }

    #[test]
    fn test_same_sqlite_file_rejected() {
        let job = MigrationJob::new(
            ConnectionConfig::sqlite("a.db"),
            ConnectionConfig::sqlite("a.db"),
        );
        assert!(validate(&job).is_err());

        let job = MigrationJob::new(
            ConnectionConfig::sqlite("./a.db"),
            ConnectionConfig::sqlite("a.db"),
        );
        assert!(validate(&job).is_err());

        let job = MigrationJob::new(
            ConnectionConfig::sqlite("data/../a.db"),
            ConnectionConfig::sqlite("b.db"),
        );
        assert!(validate(&job).is_ok());
    }

    #[test]
    fn test_same_sqlite_file_through_different_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let file = dir.path().join("a.db");
        std::fs::write(&file, b"").unwrap();

        let roundabout = dir.path().join("sub").join("..").join("a.db");
        let job = MigrationJob::new(
            ConnectionConfig::sqlite(file.to_string_lossy()),
            ConnectionConfig::sqlite(roundabout.to_string_lossy()),
        );
        let err = validate(&job).unwrap_err();
        assert!(err.to_string().contains("same database"));
    }

    #[test]
    fn test_in_memory_databases_are_distinct() {
        let job = MigrationJob::new(
            ConnectionConfig::sqlite(":memory:"),
            ConnectionConfig::sqlite(":memory:"),
        );
        assert!(validate(&job).is_ok());
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut job = valid_job();
        job.batch_size = 0;
        assert!(validate(&job).is_err());
        job.batch_size = 500;
        assert!(validate(&job).is_ok());
        job.batch_size = 1_000_000;
        assert!(validate(&job).is_err());
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut job = valid_job();
        job.source.ssl_mode = Some("sometimes".to_string());
        assert!(validate(&job).is_err());
    }

    #[test]
    fn test_table_in_both_lists() {
        let mut job = valid_job();
        job.include_tables = vec!["users".into()];
        job.exclude_tables = vec!["users".into()];
        job.on_error = OnErrorPolicy::SkipRow;
        assert!(validate(&job).is_err());
    }

    #[test]
    fn test_connection_debug_redacts_password() {
        let mut config = mysql("shop");
        config.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }
}
