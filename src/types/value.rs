//! Value cells: the tagged union exchanged between extraction and consumer code.

use crate::types::ColumnType;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single runtime value of any supported type, or SQL NULL.
///
/// The variant is the type tag; `Null` carries no payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    #[default]
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Char(char),
    String(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Type tag of the cell, `None` for NULL.
    pub fn type_tag(&self) -> Option<ColumnType> {
        let column_type = match self {
            Value::Null => return None,
            Value::Bool(_) => ColumnType::Bool,
            Value::Int8(_) => ColumnType::Int8,
            Value::Int16(_) => ColumnType::Int16,
            Value::Int32(_) => ColumnType::Int32,
            Value::Int64(_) => ColumnType::Int64,
            Value::UInt8(_) => ColumnType::UInt8,
            Value::UInt16(_) => ColumnType::UInt16,
            Value::UInt32(_) => ColumnType::UInt32,
            Value::UInt64(_) => ColumnType::UInt64,
            Value::Float32(_) => ColumnType::Float32,
            Value::Float64(_) => ColumnType::Float64,
            Value::Char(_) => ColumnType::Char,
            Value::String(_) => ColumnType::String,
            Value::Blob(_) => ColumnType::Blob,
            Value::Date(_) => ColumnType::Date,
            Value::Time(_) => ColumnType::Time,
            Value::Timestamp(_) => ColumnType::Timestamp,
        };
        Some(column_type)
    }

    /// Check if this is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Size of the payload in bytes.
    ///
    /// For strings and blobs this is the data length, used for buffer capacity checks.
    pub fn byte_len(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Bool(_) | Value::Int8(_) | Value::UInt8(_) => 1,
            Value::Int16(_) | Value::UInt16(_) => 2,
            Value::Int32(_) | Value::UInt32(_) | Value::Float32(_) | Value::Char(_) => 4,
            Value::Int64(_) | Value::UInt64(_) | Value::Float64(_) => 8,
            Value::String(s) => s.len(),
            Value::Blob(b) => b.len(),
            Value::Date(d) => std::mem::size_of_val(d),
            Value::Time(t) => std::mem::size_of_val(t),
            Value::Timestamp(ts) => std::mem::size_of_val(ts),
        }
    }

    /// Get a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get any integer value widened to i64, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int8(v) => Some(i64::from(*v)),
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::UInt8(v) => Some(i64::from(*v)),
            Value::UInt16(v) => Some(i64::from(*v)),
            Value::UInt32(v) => Some(i64::from(*v)),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get any floating point value widened to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Get a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get a blob value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Convert to a JSON value.
    ///
    /// Blobs are encoded as hex strings, temporal values as ISO-8601 text, and
    /// non-finite floats as JSON null.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int8(v) => Json::from(*v),
            Value::Int16(v) => Json::from(*v),
            Value::Int32(v) => Json::from(*v),
            Value::Int64(v) => Json::from(*v),
            Value::UInt8(v) => Json::from(*v),
            Value::UInt16(v) => Json::from(*v),
            Value::UInt32(v) => Json::from(*v),
            Value::UInt64(v) => Json::from(*v),
            Value::Float32(v) => serde_json::Number::from_f64(f64::from(*v))
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Float64(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Char(c) => Json::String(c.to_string()),
            Value::String(s) => Json::String(s.clone()),
            Value::Blob(b) => Json::String(hex::encode(b)),
            Value::Date(d) => Json::String(d.to_string()),
            Value::Time(t) => Json::String(t.to_string()),
            Value::Timestamp(ts) => Json::String(ts.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Char(c) => write!(f, "{}", c),
            Value::String(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "{}", hex::encode(b)),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}", t),
            Value::Timestamp(ts) => write!(f, "{}", ts),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Blob(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        value.to_json()
    }
}
