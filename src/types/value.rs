//! Tagged scalar values with per-tag comparison rules

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Column data types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Integer,
    Decimal,
    String,
    Timestamp,
    Nullable(Box<DataType>),
}

impl DataType {
    pub fn is_nullable(&self) -> bool {
        matches!(self, DataType::Nullable(_))
    }

    pub fn base_type(&self) -> &DataType {
        match self {
            DataType::Nullable(inner) => inner.base_type(),
            _ => self,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Decimal => write!(f, "DECIMAL"),
            DataType::String => write!(f, "STRING"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Nullable(inner) => write!(f, "{} NULL", inner),
        }
    }
}

/// A row is the ordered column values of one record, positional against
/// its table schema.
pub type Row = Vec<Value>;

/// A tagged scalar value.
///
/// Equality and hashing are structural so values can key index maps.
/// Ordering is explicit through [`Value::compare`]; comparing values of
/// different tags is an error rather than an arbitrary total order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    /// Logical timestamp, not wall clock.
    Timestamp(u64),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Nullable(Box::new(DataType::String)),
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Decimal(_) => DataType::Decimal,
            Value::String(_) => DataType::String,
            Value::Timestamp(_) => DataType::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Check that this value is acceptable for a column of the given type.
    pub fn check_type(&self, expected: &DataType) -> Result<()> {
        match (self, expected) {
            (Value::Null, DataType::Nullable(_)) => Ok(()),
            (Value::Boolean(_), DataType::Boolean) => Ok(()),
            (Value::Integer(_), DataType::Integer) => Ok(()),
            (Value::Decimal(_), DataType::Decimal) => Ok(()),
            (Value::String(_), DataType::String) => Ok(()),
            (Value::Timestamp(_), DataType::Timestamp) => Ok(()),
            (_, DataType::Nullable(inner)) => self.check_type(inner),
            _ => Err(Error::TypeMismatch {
                expected: expected.to_string(),
                found: self.data_type().to_string(),
            }),
        }
    }

    /// Compare two values for ordering. Nulls sort first; comparing
    /// values of different tags is a type error.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            (Value::Null, _) => Ok(Ordering::Less),
            (_, Value::Null) => Ok(Ordering::Greater),

            (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Ok(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Ok(a.cmp(b)),

            _ => Err(Error::TypeMismatch {
                expected: self.data_type().to_string(),
                found: other.data_type().to_string(),
            }),
        }
    }

    /// Add two numeric values.
    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a
                .checked_add(*b)
                .map(Value::Integer)
                .ok_or_else(|| Error::InvalidValue("Integer overflow".into())),
            (Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(a + b)),
            _ => Err(Error::TypeMismatch {
                expected: "numeric".into(),
                found: format!("{} and {}", self.data_type(), other.data_type()),
            }),
        }
    }

    /// Subtract two numeric values.
    pub fn subtract(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a
                .checked_sub(*b)
                .map(Value::Integer)
                .ok_or_else(|| Error::InvalidValue("Integer underflow".into())),
            (Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(a - b)),
            _ => Err(Error::TypeMismatch {
                expected: "numeric".into(),
                found: format!("{} and {}", self.data_type(), other.data_type()),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(t) => write!(f, "@{}", t),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_checks() {
        assert!(Value::Integer(1).check_type(&DataType::Integer).is_ok());
        assert!(Value::Integer(1).check_type(&DataType::String).is_err());
        assert!(Value::Null.check_type(&DataType::Integer).is_err());
        assert!(Value::Null
            .check_type(&DataType::Nullable(Box::new(DataType::Integer)))
            .is_ok());
        assert!(Value::Integer(1)
            .check_type(&DataType::Nullable(Box::new(DataType::Integer)))
            .is_ok());
    }

    #[test]
    fn same_tag_comparison() {
        assert_eq!(
            Value::Integer(1).compare(&Value::Integer(2)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::String("b".into())
                .compare(&Value::String("a".into()))
                .unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            Value::Decimal(Decimal::from(5))
                .compare(&Value::Decimal(Decimal::from(5)))
                .unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn cross_tag_comparison_is_an_error() {
        assert!(Value::Integer(1)
            .compare(&Value::String("1".into()))
            .is_err());
        assert!(Value::Integer(1)
            .compare(&Value::Decimal(Decimal::from(1)))
            .is_err());
    }

    #[test]
    fn checked_arithmetic() {
        assert_eq!(
            Value::Integer(2).add(&Value::Integer(3)).unwrap(),
            Value::Integer(5)
        );
        assert!(Value::Integer(i64::MAX).add(&Value::Integer(1)).is_err());
        assert_eq!(
            Value::Decimal(Decimal::from(10))
                .subtract(&Value::Decimal(Decimal::from(3)))
                .unwrap(),
            Value::Decimal(Decimal::from(7))
        );
        assert!(Value::String("a".into()).add(&Value::Integer(1)).is_err());
    }
}
