//! Type mapping between backend column types and Rust slot types.

use crate::types::Value;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column type tag reported by a backend for a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    /// BOOLEAN
    Bool,
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit unsigned integer
    UInt64,
    /// Single precision float
    Float32,
    /// Double precision float
    Float64,
    /// Single character
    Char,
    /// Variable-length character data
    String,
    /// Variable-length binary data
    Blob,
    /// Calendar date
    Date,
    /// Time of day
    Time,
    /// Date and time
    Timestamp,
    /// Any backend type without a value cell representation
    Unknown,
}

impl ColumnType {
    /// Whether values of this type have a variable length.
    ///
    /// Variable-length columns need a buffer capacity in bound mode and can be
    /// transferred chunk by chunk in manual mode.
    pub fn is_variable_length(&self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Blob)
    }

    /// Canonical upper-case name.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Bool => "BOOL",
            ColumnType::Int8 => "INT8",
            ColumnType::Int16 => "INT16",
            ColumnType::Int32 => "INT32",
            ColumnType::Int64 => "INT64",
            ColumnType::UInt8 => "UINT8",
            ColumnType::UInt16 => "UINT16",
            ColumnType::UInt32 => "UINT32",
            ColumnType::UInt64 => "UINT64",
            ColumnType::Float32 => "FLOAT32",
            ColumnType::Float64 => "FLOAT64",
            ColumnType::Char => "CHAR",
            ColumnType::String => "STRING",
            ColumnType::Blob => "BLOB",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let column_type = match s.trim().to_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => ColumnType::Bool,
            "INT8" | "TINYINT" => ColumnType::Int8,
            "INT16" | "SMALLINT" => ColumnType::Int16,
            "INT32" | "INT" | "INTEGER" => ColumnType::Int32,
            "INT64" | "BIGINT" => ColumnType::Int64,
            "UINT8" => ColumnType::UInt8,
            "UINT16" => ColumnType::UInt16,
            "UINT32" => ColumnType::UInt32,
            "UINT64" => ColumnType::UInt64,
            "FLOAT32" | "FLOAT" | "REAL" => ColumnType::Float32,
            "FLOAT64" | "DOUBLE" => ColumnType::Float64,
            "CHAR" => ColumnType::Char,
            "STRING" | "VARCHAR" | "TEXT" => ColumnType::String,
            "BLOB" | "BINARY" => ColumnType::Blob,
            "DATE" => ColumnType::Date,
            "TIME" => ColumnType::Time,
            "TIMESTAMP" | "DATETIME" => ColumnType::Timestamp,
            "UNKNOWN" => ColumnType::Unknown,
            other => return Err(format!("unrecognized column type '{}'", other)),
        };
        Ok(column_type)
    }
}

/// Capability set of a Rust type usable as a binding or extraction slot.
///
/// Implemented for every supported scalar, temporal and blob type, and for
/// [`Value`] itself, which acts as the generic "any" slot: its column type is
/// `None` and extraction dispatches on the backend-reported column type.
pub trait SqlType: Sized + Clone + Send + 'static {
    /// The column type this slot requires, `None` for the dynamic value cell.
    fn column_type() -> Option<ColumnType>;

    /// Box the value into a value cell.
    fn into_value(self) -> Value;

    /// Unbox a value cell, `None` if the cell holds a different type.
    ///
    /// No coercion is performed: an `Int64` cell never converts into `i32`.
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! impl_sql_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl SqlType for $ty {
                fn column_type() -> Option<ColumnType> {
                    Some(ColumnType::$variant)
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_sql_type! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    char => Char,
    String => String,
    Vec<u8> => Blob,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
}

impl SqlType for Value {
    fn column_type() -> Option<ColumnType> {
        None
    }

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}
