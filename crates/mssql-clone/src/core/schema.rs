//! Column metadata for a single table snapshot.

use serde::{Deserialize, Serialize};

use crate::error::{CloneError, Result};

/// Column definition as read from INFORMATION_SCHEMA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,

    /// Declared type including qualifiers, e.g. `nvarchar(50)` or `varbinary(MAX)`.
    pub data_type: String,

    /// Whether the column accepts NULL.
    pub is_nullable: bool,

    /// Whether the column is an IDENTITY column.
    pub is_identity: bool,

    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub is_primary_key: bool,
}

impl ColumnDef {
    /// Nullable, non-identity column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            is_identity: false,
            is_primary_key: false,
        }
    }

    /// Mark as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    /// Mark as IDENTITY (implies NOT NULL).
    #[must_use]
    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self.is_nullable = false;
        self
    }

    /// Mark as primary key member (implies NOT NULL).
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    /// Lowercased type name without qualifiers: `nvarchar(50)` -> `nvarchar`.
    pub fn base_type(&self) -> String {
        base_type_name(&self.data_type)
    }
}

/// Column set of one table, in declaration order.
///
/// Names are unique under case-insensitive comparison. A `ColumnSchema` is a
/// snapshot: callers re-read it instead of caching it across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    columns: Vec<ColumnDef>,
}

impl ColumnSchema {
    /// Build a schema, rejecting case-insensitive duplicate names.
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self> {
        for (i, col) in columns.iter().enumerate() {
            if columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&col.name))
            {
                return Err(CloneError::Schema(format!(
                    "duplicate column name '{}'",
                    col.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Look up a column by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Declared type of a column.
    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.get(name).map(|c| c.data_type.as_str())
    }

    /// Whether the schema has a column with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Column names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Primary key columns in declaration order.
    pub fn primary_key(&self) -> Vec<&ColumnDef> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }

    /// Whether any column is an IDENTITY column.
    pub fn has_identity(&self) -> bool {
        self.columns.iter().any(|c| c.is_identity)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnDef> {
        self.columns.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<'a> IntoIterator for &'a ColumnSchema {
    type Item = &'a ColumnDef;
    type IntoIter = std::slice::Iter<'a, ColumnDef>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

/// Lowercased type name with any `(...)` qualifier stripped.
pub fn base_type_name(data_type: &str) -> String {
    data_type
        .split('(')
        .next()
        .unwrap_or(data_type)
        .trim()
        .to_lowercase()
}

/// Render a declared type from INFORMATION_SCHEMA parts.
///
/// `max_length` is CHARACTER_MAXIMUM_LENGTH: characters for text types,
/// bytes for binary types, `-1` for MAX. `scale` is NUMERIC_SCALE for
/// decimals and DATETIME_PRECISION for temporal types. `None` leaves the
/// type unqualified.
pub fn render_type(
    data_type: &str,
    max_length: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> String {
    let lower = data_type.to_lowercase();
    match lower.as_str() {
        "char" | "nchar" | "varchar" | "nvarchar" | "binary" | "varbinary" => match max_length {
            Some(-1) => format!("{}(MAX)", lower),
            Some(n) if n > 0 => format!("{}({})", lower, n),
            _ => lower,
        },

        "decimal" | "numeric" => match precision {
            Some(p) if p > 0 => format!("{}({},{})", lower, p, scale.unwrap_or(0)),
            _ => lower,
        },

        // Default fractional precision is 7; only non-default scales are spelled out
        "datetime2" | "datetimeoffset" | "time" => match scale {
            Some(s) if (0..7).contains(&s) => format!("{}({})", lower, s),
            _ => lower,
        },

        _ => lower,
    }
}
