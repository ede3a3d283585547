//! Dynamically typed cell values and rows.
//!
//! Source rows carry heterogeneous column types that are only known at
//! runtime. Every cell is represented as a [`SqlValue`] and a row keeps its
//! cells in source column order, keyed by column name.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Type hint carried by NULL values.
///
/// SQL Server needs a typed NULL parameter: binding an untyped NULL to a
/// `varbinary` column fails with an implicit conversion error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with a type hint for parameter binding.
    Null(SqlNullType),

    /// bit
    Bool(bool),

    /// smallint (tinyint is widened into this)
    I16(i16),

    /// int
    I32(i32),

    /// bigint
    I64(i64),

    /// real
    F32(f32),

    /// float
    F64(f64),

    /// Character data of any width.
    Text(String),

    /// Binary data of any width.
    Bytes(Vec<u8>),

    /// uniqueidentifier
    Uuid(Uuid),

    /// decimal, numeric, money
    Decimal(Decimal),

    /// datetime, datetime2, smalldatetime
    DateTime(NaiveDateTime),

    /// datetimeoffset
    DateTimeOffset(DateTime<FixedOffset>),

    /// date
    Date(NaiveDate),

    /// time
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// The NULL type hint matching this value's kind.
    #[must_use]
    pub fn null_type(&self) -> SqlNullType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => SqlNullType::Bool,
            SqlValue::I16(_) => SqlNullType::I16,
            SqlValue::I32(_) => SqlNullType::I32,
            SqlValue::I64(_) => SqlNullType::I64,
            SqlValue::F32(_) => SqlNullType::F32,
            SqlValue::F64(_) => SqlNullType::F64,
            SqlValue::Text(_) => SqlNullType::String,
            SqlValue::Bytes(_) => SqlNullType::Bytes,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::Decimal(_) => SqlNullType::Decimal,
            SqlValue::DateTime(_) => SqlNullType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Time(_) => SqlNullType::Time,
        }
    }

    /// Render the value as text, the way SQL Server would convert it to
    /// `nvarchar`. Returns `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        let text = match self {
            SqlValue::Null(_) => return None,
            SqlValue::Bool(v) => (if *v { "1" } else { "0" }).to_string(),
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::Text(v) => v.clone(),
            SqlValue::Bytes(v) => String::from_utf8_lossy(v).into_owned(),
            SqlValue::Uuid(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::DateTime(v) => v.to_string(),
            SqlValue::DateTimeOffset(v) => v.to_rfc3339(),
            SqlValue::Date(v) => v.to_string(),
            SqlValue::Time(v) => v.to_string(),
        };
        Some(text)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

/// One fetched source record: column name to value, in source column order.
///
/// Lookups by name are case-insensitive. An absent column and a NULL cell
/// are distinct: the former is `None` from [`Row::get`], the latter is
/// `Some(SqlValue::Null(_))`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, SqlValue)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty row with room for `capacity` cells.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    /// Set a cell, replacing any existing cell with the same name.
    pub fn set(&mut self, column: impl Into<String>, value: SqlValue) {
        let column = column.into();
        match self
            .cells
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&column))
        {
            Some((_, existing)) => *existing = value,
            None => self.cells.push((column, value)),
        }
    }

    /// Builder form of [`Row::set`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.set(column, value.into());
        self
    }

    /// Look up a cell by column name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.cells
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// Column names in row order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate `(column, value)` pairs in row order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Mutable iteration over `(column, value)` pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut SqlValue)> {
        self.cells
            .iter_mut()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the row has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// One page of fetched rows, in fetch order.
pub type Batch = Vec<Row>;
