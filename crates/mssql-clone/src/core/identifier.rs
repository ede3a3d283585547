//! Identifier validation and quoting for dynamic T-SQL.
//!
//! Table and column names cannot be bound as parameters, so every statement
//! that names one goes through [`quote_ident`]. Names coming from outside the
//! server (config, CLI) are checked with [`validate_identifier`] first.

use crate::error::{CloneError, Result};

/// SQL Server `sysname` limit.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Reject identifiers SQL Server could never have produced.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CloneError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(CloneError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(CloneError::Config(format!(
            "Identifier exceeds {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Bracket-quote an identifier, doubling any closing bracket.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}
