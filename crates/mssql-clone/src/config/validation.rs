//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::error::{CloneError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_endpoint("source", &config.source)?;
    validate_endpoint("target", &config.target)?;

    // Cloning a database onto itself would read back its own inserts
    if config.source.same_database_as(&config.target) {
        return Err(CloneError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    if config.copy.batch_size == 0 {
        return Err(CloneError::Config(
            "copy.batch_size must be at least 1".into(),
        ));
    }
    if config.copy.max_connections == 0 {
        return Err(CloneError::Config(
            "copy.max_connections must be at least 1".into(),
        ));
    }
    if config.copy.tables.iter().any(|t| t.trim().is_empty()) {
        return Err(CloneError::Config(
            "copy.tables must not contain empty names".into(),
        ));
    }

    Ok(())
}

fn validate_endpoint(side: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(CloneError::Config(format!("{}.host is required", side)));
    }
    if db.database.is_empty() {
        return Err(CloneError::Config(format!("{}.database is required", side)));
    }
    if db.user.is_empty() {
        return Err(CloneError::Config(format!("{}.user is required", side)));
    }
    Ok(())
}
