//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Database engine of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[serde(alias = "mariadb")]
    Mysql,
    #[serde(alias = "sqlite3")]
    Sqlite,
    #[serde(alias = "postgres", alias = "pg")]
    Postgresql,
}

impl DialectKind {
    /// Identifier used in config files and log records.
    pub fn name(&self) -> &'static str {
        match self {
            DialectKind::Mysql => "mysql",
            DialectKind::Sqlite => "sqlite",
            DialectKind::Postgresql => "postgresql",
        }
    }

    /// Human readable engine name.
    pub fn display_name(&self) -> &'static str {
        match self {
            DialectKind::Mysql => "MySQL",
            DialectKind::Sqlite => "SQLite",
            DialectKind::Postgresql => "PostgreSQL",
        }
    }

    /// Default TCP port, if the engine is networked.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DialectKind::Mysql => Some(3306),
            DialectKind::Sqlite => None,
            DialectKind::Postgresql => Some(5432),
        }
    }

    /// Parse a dialect identifier (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Some(DialectKind::Mysql),
            "sqlite" | "sqlite3" => Some(DialectKind::Sqlite),
            "postgresql" | "postgres" | "pg" => Some(DialectKind::Postgresql),
            _ => None,
        }
    }
}

impl std::fmt::Display for DialectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Connection settings for one endpoint.
///
/// For SQLite only `database` is used and holds the file path.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Engine of this endpoint.
    pub dialect: DialectKind,

    /// Database host (ignored for SQLite).
    #[serde(default)]
    pub host: String,

    /// Database port; the engine default when omitted.
    #[serde(default)]
    pub port: Option<u16>,

    /// Username.
    #[serde(default, alias = "username")]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Database name, or the file path for SQLite.
    #[serde(alias = "path")]
    pub database: String,

    /// PostgreSQL schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// TLS mode: disable, prefer, require, verify-ca, verify-full.
    /// Defaults to "prefer" for MySQL and "disable" for PostgreSQL.
    #[serde(default)]
    pub ssl_mode: Option<String>,

    /// Seconds to wait for a connection (default: 30).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl ConnectionConfig {
    /// Effective port, falling back to the engine default.
    pub fn port(&self) -> u16 {
        self.port
            .or_else(|| self.dialect.default_port())
            .unwrap_or_default()
    }

    /// Effective TLS mode string.
    pub fn ssl_mode(&self) -> &str {
        match (&self.ssl_mode, self.dialect) {
            (Some(mode), _) => mode.as_str(),
            (None, DialectKind::Mysql) => "prefer",
            (None, _) => "disable",
        }
    }

    /// Short description used in log records, without credentials.
    pub fn describe(&self) -> String {
        match self.dialect {
            DialectKind::Sqlite => format!("sqlite:{}", self.database),
            _ => format!(
                "{}://{}:{}/{}",
                self.dialect,
                self.host,
                self.port(),
                self.database
            ),
        }
    }

    /// Build a SQLite connection config for the given file path.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            dialect: DialectKind::Sqlite,
            host: String::new(),
            port: None,
            user: String::new(),
            password: String::new(),
            database: path.into(),
            schema: default_public_schema(),
            ssl_mode: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// What to do when a table or row fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnErrorPolicy {
    /// Stop the whole job at the first failed table.
    #[default]
    Abort,

    /// Roll the failed table back and continue with the next one.
    SkipTable,

    /// Re-issue a failed batch row by row, recording rows that fail.
    SkipRow,
}

impl OnErrorPolicy {
    /// Parse a policy name ("abort", "skip-table", "skip-row").
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "abort" => Some(OnErrorPolicy::Abort),
            "skip-table" => Some(OnErrorPolicy::SkipTable),
            "skip-row" => Some(OnErrorPolicy::SkipRow),
            _ => None,
        }
    }
}

/// One migration run: endpoints, table selection and transfer behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationJob {
    /// Endpoint rows are read from. Never written to.
    pub source: ConnectionConfig,

    /// Endpoint tables are created in.
    pub target: ConnectionConfig,

    /// Tables to migrate; empty means all.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables never migrated. Applied before `include_tables`.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Rows per batch (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Drop each target table before creating it.
    #[serde(default)]
    pub drop_target_tables_first: bool,

    /// Failure policy (default: abort).
    #[serde(default)]
    pub on_error: OnErrorPolicy,

    /// Batches buffered between the source reader and the writer (default: 4).
    #[serde(default = "default_read_ahead")]
    pub read_ahead_batches: usize,

    /// Wait before the single retry of a lock error, in ms (default: 100).
    #[serde(default = "default_lock_retry_backoff")]
    pub lock_retry_backoff_ms: u64,
}

impl MigrationJob {
    /// Create a job with default transfer settings.
    pub fn new(source: ConnectionConfig, target: ConnectionConfig) -> Self {
        Self {
            source,
            target,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            batch_size: default_batch_size(),
            drop_target_tables_first: false,
            on_error: OnErrorPolicy::default(),
            read_ahead_batches: default_read_ahead(),
            lock_retry_backoff_ms: default_lock_retry_backoff(),
        }
    }

    /// Apply the exclude list, then the include list, keeping listing order.
    pub fn filter_tables(&self, tables: Vec<String>) -> Vec<String> {
        tables
            .into_iter()
            .filter(|t| !self.exclude_tables.iter().any(|e| e == t))
            .filter(|t| self.include_tables.is_empty() || self.include_tables.contains(t))
            .collect()
    }
}

pub(crate) const MIN_BATCH_SIZE: usize = 1;
pub(crate) const MAX_BATCH_SIZE: usize = 100_000;

// Default value functions for serde
fn default_public_schema() -> String {
    "public".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_batch_size() -> usize {
    1_000
}

fn default_read_ahead() -> usize {
    4
}

fn default_lock_retry_backoff() -> u64 {
    100
}
