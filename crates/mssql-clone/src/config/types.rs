//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database the rows are read from.
    pub source: DatabaseConfig,

    /// Database the rows are written to.
    pub target: DatabaseConfig,

    /// Copy behavior configuration.
    #[serde(default)]
    pub copy: CopyConfig,
}

/// SQL Server endpoint configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

impl DatabaseConfig {
    /// Same endpoint pointed at another database on the server.
    ///
    /// Administrative statements (CREATE/DROP DATABASE) must run from `master`.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self.clone()
        }
    }

    /// Whether both configs address the same database on the same server.
    pub fn same_database_as(&self, other: &DatabaseConfig) -> bool {
        self.host.eq_ignore_ascii_case(&other.host)
            && self.port == other.port
            && self.database.eq_ignore_ascii_case(&other.database)
    }
}

/// Copy behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Rows fetched per page (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Tables to copy. Empty means every user table of the source.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Drop the target database before copying (default: false).
    #[serde(default)]
    pub drop_target_database: bool,

    /// Create the target database when it does not exist (default: true).
    #[serde(default = "default_true")]
    pub create_target_database: bool,

    /// Compare source and target row counts after the copy (default: false).
    #[serde(default)]
    pub verify_row_counts: bool,

    /// Maximum pooled connections per endpoint (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            tables: Vec::new(),
            drop_target_database: false,
            create_target_database: true,
            verify_row_counts: false,
            max_connections: default_max_connections(),
        }
    }
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_connections() -> u32 {
    4
}
