//! Scalar values and value-type coercion shared by every adapter.
//!
//! # Responsibility
//! - Define the scalar `Value` carried between entities and data sources.
//! - Apply the single value-type preparation rule (`i`/`s`/`d`/`b`) that all
//!   adapters must reproduce identically.
//!
//! # Invariants
//! - Decimal preparation strips spaces, converts comma to dot, then parses as
//!   integer when no dot is present, otherwise as double.
//! - An unknown value-type tag is a configuration error, never deferred to
//!   execute time.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Scalar value stored in entity properties and bound into queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns whether this value counts as absent for write/condition
    /// skipping purposes.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    /// Canonical text form used for grouping and key lookups.
    pub fn group_key(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Integer(value) => value.to_string(),
            Self::Real(value) => value.to_string(),
            Self::Text(text) => text.clone(),
            Self::Bytes(bytes) => bytes.iter().map(|b| format!("{b:02x}")).collect(),
        }
    }

    /// Numeric view, when the value is numeric or numeric-looking text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(text) => write!(f, "{text}"),
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Field value type driving serialization into the data source.
///
/// Tags follow the storage configuration contract: `i` integer, `s` string,
/// `d` decimal, `b` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Integer,
    Text,
    Decimal,
    Binary,
}

impl ValueType {
    /// Resolves a value-type tag character. Any tag outside `idsb` is a
    /// configuration error and yields `None`.
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag.to_ascii_lowercase() {
            'i' => Some(Self::Integer),
            's' => Some(Self::Text),
            'd' => Some(Self::Decimal),
            'b' => Some(Self::Binary),
            _ => None,
        }
    }

    pub fn tag(self) -> char {
        match self {
            Self::Integer => 'i',
            Self::Text => 's',
            Self::Decimal => 'd',
            Self::Binary => 'b',
        }
    }
}

/// Prepares a value for the data source according to its declared type.
///
/// Every adapter routes values through this one function so type coercion is
/// identical across SQL, XML and dummy sources. Empty values pass through
/// unchanged; adapters decide how absence is rendered.
pub fn prepare_typed(value: &Value, value_type: ValueType) -> Value {
    if value.is_empty() {
        return Value::Null;
    }

    match value_type {
        ValueType::Integer => Value::Integer(coerce_integer(value)),
        ValueType::Decimal => normalize_decimal(&value.group_key()),
        ValueType::Text => match value {
            Value::Text(_) => value.clone(),
            other => Value::Text(other.group_key()),
        },
        ValueType::Binary => match value {
            Value::Bytes(_) => value.clone(),
            Value::Text(text) => Value::Bytes(text.clone().into_bytes()),
            other => Value::Bytes(other.group_key().into_bytes()),
        },
    }
}

/// Normalizes a locale-aware decimal: spaces stripped, comma-decimal accepted.
///
/// `"1 234,56"` becomes `1234.56`; input without a decimal separator parses
/// as an integer. Unparseable input collapses to zero, matching the lenient
/// cast the sources historically applied.
pub fn normalize_decimal(raw: &str) -> Value {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if cleaned.contains('.') {
        Value::Real(cleaned.parse().unwrap_or(0.0))
    } else {
        Value::Integer(cleaned.parse().unwrap_or(0))
    }
}

fn coerce_integer(value: &Value) -> i64 {
    match value {
        Value::Integer(n) => *n,
        Value::Real(r) => *r as i64,
        Value::Text(text) => text.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_decimal, prepare_typed, Value, ValueType};

    #[test]
    fn decimal_normalization_accepts_comma_and_spaces() {
        assert_eq!(normalize_decimal("1 234,56"), Value::Real(1234.56));
        assert_eq!(normalize_decimal("1234"), Value::Integer(1234));
        assert_eq!(normalize_decimal("12.5"), Value::Real(12.5));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(ValueType::from_tag('x').is_none());
        assert_eq!(ValueType::from_tag('D'), Some(ValueType::Decimal));
    }

    #[test]
    fn integer_preparation_coerces_text() {
        let prepared = prepare_typed(&Value::Text("42".into()), ValueType::Integer);
        assert_eq!(prepared, Value::Integer(42));
    }

    #[test]
    fn empty_values_prepare_to_null() {
        assert_eq!(prepare_typed(&Value::Text(String::new()), ValueType::Text), Value::Null);
        assert_eq!(prepare_typed(&Value::Null, ValueType::Integer), Value::Null);
    }
}
