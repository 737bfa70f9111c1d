//! Column types and dynamic values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean, 1 byte.
    Bool,
    /// 16-bit signed integer.
    SmallInt,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    BigInt,
    /// Milliseconds since the Unix epoch, stored as i64.
    Timestamp,
    /// 32-bit IEEE float.
    Float,
    /// 64-bit IEEE float.
    Double,
    /// Variable-length UTF-8 string.
    Varchar,
}

impl DataType {
    /// Width of the column's fixed slot in an encoded row.
    ///
    /// Varchar slots hold an `(offset, len)` pair into the variable area.
    #[must_use]
    pub const fn slot_width(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::SmallInt => 2,
            Self::Int | Self::Float => 4,
            Self::BigInt | Self::Timestamp | Self::Double | Self::Varchar => 8,
        }
    }

    /// Whether the type is stored entirely in its fixed slot.
    #[must_use]
    pub const fn is_fixed(self) -> bool {
        !matches!(self, Self::Varchar)
    }

    /// Lower-case type name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::SmallInt => "smallint",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Timestamp => "timestamp",
            Self::Float => "float",
            Self::Double => "double",
            Self::Varchar => "varchar",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically typed column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 16-bit integer.
    SmallInt(i16),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    BigInt(i64),
    /// Epoch milliseconds.
    Timestamp(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    Varchar(String),
}

impl Value {
    /// Returns true for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the value's own type, `"null"` for null.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self.data_type() {
            Some(t) => t.name(),
            None => "null",
        }
    }

    /// The natural column type of this value.
    #[must_use]
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(DataType::Bool),
            Self::SmallInt(_) => Some(DataType::SmallInt),
            Self::Int(_) => Some(DataType::Int),
            Self::BigInt(_) => Some(DataType::BigInt),
            Self::Timestamp(_) => Some(DataType::Timestamp),
            Self::Float(_) => Some(DataType::Float),
            Self::Double(_) => Some(DataType::Double),
            Self::Varchar(_) => Some(DataType::Varchar),
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::SmallInt(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::BigInt(v) | Self::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Converts the value to `target`, or `None` if it does not fit.
    ///
    /// Integers convert between integer types when in range, and to
    /// timestamps and floats. Floats only convert to floats. Null converts
    /// to null of any type.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn coerce(&self, target: DataType) -> Option<Value> {
        if self.is_null() {
            return Some(Self::Null);
        }
        match target {
            DataType::Bool => match self {
                Self::Bool(b) => Some(Self::Bool(*b)),
                _ => None,
            },
            DataType::SmallInt => self
                .as_i64()
                .and_then(|v| i16::try_from(v).ok())
                .map(Self::SmallInt),
            DataType::Int => self
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Self::Int),
            DataType::BigInt => self.as_i64().map(Self::BigInt),
            DataType::Timestamp => self.as_i64().map(Self::Timestamp),
            DataType::Float => self.as_f64().map(|v| Self::Float(v as f32)),
            DataType::Double => self.as_f64().map(Self::Double),
            DataType::Varchar => match self {
                Self::Varchar(s) => Some(Self::Varchar(s.clone())),
                _ => None,
            },
        }
    }

    /// Borrows the string of a varchar value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Varchar(s) => Some(s),
            _ => None,
        }
    }

    /// Returns any integer-typed value widened to i64.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        self.as_i64()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::SmallInt(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::BigInt(v) | Self::Timestamp(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Varchar(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::BigInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Varchar(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Varchar(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
