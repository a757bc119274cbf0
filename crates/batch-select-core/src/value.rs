//! Dynamic SQL values.

use serde::{Deserialize, Serialize};

/// A dynamically-typed SQL value.
///
/// Used for parameter binding, result rows, and primary key extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Boolean value
    Bool(bool),

    /// 32-bit signed integer
    Int(i32),

    /// 64-bit signed integer
    BigInt(i64),

    /// 64-bit floating point
    Double(f64),

    /// Text string
    Text(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// JSON value
    Json(serde_json::Value),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Double(_) => "DOUBLE",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Json(_) => "JSON",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            Value::BigInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(f64::from(*v)),
            Value::BigInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Hashable form of this value for grouping rows by owner.
    ///
    /// Integer widths collapse into one key so an `Int(1)` primary key
    /// matches a `BigInt(1)` read back from the store. NULL has no key.
    pub fn group_key(&self) -> Option<GroupKey> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(GroupKey::Int(i64::from(*b))),
            Value::Int(v) => Some(GroupKey::Int(i64::from(*v))),
            Value::BigInt(v) => Some(GroupKey::Int(*v)),
            Value::Double(f) => Some(GroupKey::Float(f.to_bits())),
            Value::Text(s) => Some(GroupKey::Text(s.clone())),
            Value::Bytes(b) => Some(GroupKey::Bytes(b.clone())),
            Value::Json(j) => Some(GroupKey::Text(j.to_string())),
        }
    }
}

/// Normalized, hashable identity of a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKey {
    Int(i64),
    Float(u64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widths_share_a_group_key() {
        assert_eq!(Value::Int(7).group_key(), Value::BigInt(7).group_key());
        assert_ne!(Value::Int(7).group_key(), Value::Text("7".into()).group_key());
    }

    #[test]
    fn null_has_no_group_key() {
        assert_eq!(Value::Null.group_key(), None);
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from(3_i64).as_i64(), Some(3));
        assert_eq!(Value::from("red").as_str(), Some("red"));
        assert_eq!(Value::Int(0).as_bool(), Some(false));
        assert_eq!(Value::BigInt(2).as_f64(), Some(2.0));
        assert_eq!(Value::Text("x".into()).type_name(), "TEXT");
    }

    #[test]
    fn serde_round_trip_of_text() {
        let json = serde_json::to_string(&Value::Text("blue".into())).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Text("blue".into()));
    }
}
