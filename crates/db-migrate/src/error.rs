//! Error types for the migration library.

use thiserror::Error;

/// Exit code for configuration and YAML errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for connection failures.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code when a migration finished with failed or partial tables.
pub const EXIT_MIGRATION_INCOMPLETE: u8 = 3;
/// Exit code for table-level errors that escaped to the caller.
pub const EXIT_TABLE_ERROR: u8 = 4;
/// Exit code for a cancelled run.
pub const EXIT_CANCELLED: u8 = 5;
/// Exit code for JSON serialization errors.
pub const EXIT_JSON_ERROR: u8 = 6;
/// Exit code for IO errors (missing config file, unwritable export...).
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not open or test a connection. Fatal for the whole job.
    #[error("Connection error ({dialect}): {message}")]
    Connection { dialect: String, message: String },

    /// Table vanished or its catalog could not be read.
    #[error("Schema introspection failed for table {table}: {message}")]
    SchemaIntrospection { table: String, message: String },

    /// CREATE/DROP TABLE rejected by the target.
    #[error("DDL failed for table {table}: {message}")]
    Ddl { table: String, message: String },

    /// Reading or writing rows failed.
    ///
    /// `row_index` is the position of the first failing row inside the batch
    /// handed to `write_rows`; it is `None` for read-side failures.
    #[error("Data copy failed for table {table}{}: {message}", fmt_row(.row_index))]
    DataCopy {
        table: String,
        row_index: Option<usize>,
        message: String,
        retryable: bool,
    },

    /// BEGIN/COMMIT/ROLLBACK/SAVEPOINT failed.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

fn fmt_row(row_index: &Option<usize>) -> String {
    match row_index {
        Some(idx) => format!(" at row {}", idx),
        None => String::new(),
    }
}

impl MigrateError {
    /// Create a Connection error for the given dialect.
    pub fn connection(dialect: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::Connection {
            dialect: dialect.into(),
            message: message.to_string(),
        }
    }

    /// Create a SchemaIntrospection error
    pub fn schema(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::SchemaIntrospection {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Ddl error
    pub fn ddl(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::Ddl {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a non-retryable read-side DataCopy error.
    pub fn read(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::DataCopy {
            table: table.into(),
            row_index: None,
            message: message.to_string(),
            retryable: false,
        }
    }

    /// Create a write-side DataCopy error for a specific row.
    pub fn write(
        table: impl Into<String>,
        row_index: usize,
        message: impl std::fmt::Display,
        retryable: bool,
    ) -> Self {
        MigrateError::DataCopy {
            table: table.into(),
            row_index: Some(row_index),
            message: message.to_string(),
            retryable,
        }
    }

    /// Create a Transaction error
    pub fn transaction(message: impl std::fmt::Display) -> Self {
        MigrateError::Transaction(message.to_string())
    }

    /// Whether a single retry after a short backoff may succeed.
    ///
    /// Only lock contention (SQLite busy, lock wait timeouts, serialization
    /// failures) is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MigrateError::DataCopy { retryable: true, .. })
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::SchemaIntrospection { .. }
            | MigrateError::Ddl { .. }
            | MigrateError::DataCopy { .. }
            | MigrateError::Transaction(_) => EXIT_TABLE_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Json(_) => EXIT_JSON_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_copy_display_includes_row() {
        let err = MigrateError::write("users", 2, "duplicate key", false);
        assert_eq!(
            err.to_string(),
            "Data copy failed for table users at row 2: duplicate key"
        );

        let err = MigrateError::read("users", "connection reset");
        assert_eq!(
            err.to_string(),
            "Data copy failed for table users: connection reset"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(MigrateError::write("t", 0, "database is locked", true).is_retryable());
        assert!(!MigrateError::write("t", 0, "bad value", false).is_retryable());
        assert!(!MigrateError::transaction("lock").is_retryable());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            MigrateError::connection("mysql", "refused").exit_code(),
            EXIT_CONNECTION_ERROR
        );
        assert_eq!(MigrateError::ddl("t", "exists").exit_code(), EXIT_TABLE_ERROR);
        assert_eq!(MigrateError::Cancelled.exit_code(), EXIT_CANCELLED);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = MigrateError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: no such file"));
    }
}
