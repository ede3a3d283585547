//! Value normalization between the source read and the target insert.
//!
//! Two rules apply, both keyed by the column's declared type on the source:
//! date/time values outside the `datetime` range are replaced by its minimum,
//! and `varbinary` cells are forced into byte form. Neither rule can fail; a
//! value that cannot be normalized becomes a typed NULL.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::core::{base_type_name, SqlNullType, SqlValue};

const DATE_TYPES: &[&str] = &[
    "datetime",
    "datetime2",
    "smalldatetime",
    "date",
    "datetimeoffset",
];

/// Why a value was changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Adjustment {
    /// A date/time outside the representable range was replaced.
    DateClamped { original: String, replacement: String },

    /// A non-binary value in a `varbinary` column was not valid base64.
    BinaryDecodeFailed { original: String },
}

impl std::fmt::Display for Adjustment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Adjustment::DateClamped {
                original,
                replacement,
            } => write!(f, "out-of-range date {} replaced by {}", original, replacement),
            Adjustment::BinaryDecodeFailed { original } => {
                let preview: String = original.chars().take(32).collect();
                write!(f, "value '{}' is not base64, stored as NULL", preview)
            }
        }
    }
}

/// Result of coercing one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub value: SqlValue,
    pub adjustment: Option<Adjustment>,
}

impl Coerced {
    fn unchanged(value: SqlValue) -> Self {
        Self {
            value,
            adjustment: None,
        }
    }
}

/// Applies the date range and binary rules.
#[derive(Debug, Clone)]
pub struct TypeCoercer {
    min: NaiveDateTime,
    max: NaiveDateTime,
}

impl Default for TypeCoercer {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeCoercer {
    /// Coercer for the SQL Server `datetime` range,
    /// `1753-01-01 00:00:00` through `9999-12-31 23:59:59.997`.
    pub fn new() -> Self {
        let min = NaiveDate::from_ymd_opt(1753, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or(NaiveDateTime::MIN);
        let max = NaiveDate::from_ymd_opt(9999, 12, 31)
            .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 997))
            .unwrap_or(NaiveDateTime::MAX);
        Self { min, max }
    }

    /// Smallest representable date/time.
    pub fn min(&self) -> NaiveDateTime {
        self.min
    }

    /// Coerce one cell given the column's declared type.
    pub fn coerce(&self, value: SqlValue, declared_type: &str) -> Coerced {
        let base = base_type_name(declared_type);
        if base == "varbinary" {
            return self.coerce_binary(value);
        }
        if DATE_TYPES.contains(&base.as_str()) {
            return self.coerce_date(value);
        }
        Coerced::unchanged(value)
    }

    fn in_range(&self, dt: NaiveDateTime) -> bool {
        dt >= self.min && dt <= self.max
    }

    fn clamped(&self, original: String, value: SqlValue) -> Coerced {
        Coerced {
            adjustment: Some(Adjustment::DateClamped {
                original,
                replacement: self.min.to_string(),
            }),
            value,
        }
    }

    // Both ends map to the minimum: the upper bound is not clamped to the maximum.
    fn coerce_date(&self, value: SqlValue) -> Coerced {
        match value {
            SqlValue::DateTime(dt) if !self.in_range(dt) => {
                self.clamped(dt.to_string(), SqlValue::DateTime(self.min))
            }
            SqlValue::Date(d) if !self.in_range(d.and_time(NaiveTime::MIN)) => {
                self.clamped(d.to_string(), SqlValue::Date(self.min.date()))
            }
            SqlValue::DateTimeOffset(dto) if !self.in_range(dto.naive_utc()) => {
                let min = self.min.and_utc().fixed_offset();
                self.clamped(dto.to_rfc3339(), SqlValue::DateTimeOffset(min))
            }
            other => Coerced::unchanged(other),
        }
    }

    fn coerce_binary(&self, value: SqlValue) -> Coerced {
        match value {
            SqlValue::Bytes(_) => Coerced::unchanged(value),
            SqlValue::Null(_) => Coerced::unchanged(SqlValue::Null(SqlNullType::Bytes)),
            other => {
                let text = other.to_text().unwrap_or_default();
                match STANDARD.decode(text.trim()) {
                    Ok(bytes) => Coerced::unchanged(SqlValue::Bytes(bytes)),
                    Err(_) => Coerced {
                        value: SqlValue::Null(SqlNullType::Bytes),
                        adjustment: Some(Adjustment::BinaryDecodeFailed { original: text }),
                    },
                }
            }
        }
    }
}
