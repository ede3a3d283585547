//! Error types for the cloning library.

use thiserror::Error;

/// Main error type for clone operations.
///
/// Row-level insert failures never appear here: the batch copier absorbs them
/// and only counts them. Everything in this enum aborts at least the current
/// table.
#[derive(Error, Debug)]
pub enum CloneError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Query or connection error reported by SQL Server.
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Schema metadata could not be read or is inconsistent.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Data copy failed for a specific table
    #[error("Copy failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Row count verification failed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run stopped by SIGINT/SIGTERM before every table was copied
    #[error("Clone cancelled")]
    Cancelled,
}

impl CloneError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        CloneError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        CloneError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CloneError::Config(_) | CloneError::Yaml(_) => 2,
            CloneError::Database(_) | CloneError::Pool { .. } => 3,
            CloneError::Validation(_) => 4,
            CloneError::Cancelled => 130,
            _ => 1,
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

/// Result type alias for clone operations.
pub type Result<T> = std::result::Result<T, CloneError>;
