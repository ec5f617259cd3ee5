//! Database values and conversions into Rust types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MapError;

/// A single parameter or column value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum DbValue {
    #[default]
    Null,
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
    Binary(Bytes),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Name of the variant, used in conversion errors
    pub fn type_name(&self) -> &'static str {
        match self {
            DbValue::Null => "null",
            DbValue::Bool(_) => "bool",
            DbValue::SmallInt(_) => "smallint",
            DbValue::Int(_) => "int",
            DbValue::BigInt(_) => "bigint",
            DbValue::Double(_) => "double",
            DbValue::Text(_) => "text",
            DbValue::Binary(_) => "binary",
            DbValue::Uuid(_) => "uuid",
            DbValue::Timestamp(_) => "timestamp",
        }
    }

    /// Widen any integer variant to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DbValue::SmallInt(v) => Some(*v as i64),
            DbValue::Int(v) => Some(*v as i64),
            DbValue::BigInt(v) => Some(*v),
            _ => None,
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for DbValue {
                fn from(v: $ty) -> Self {
                    DbValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_for_value!(
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f64 => Double,
    String => Text,
    Bytes => Binary,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
);

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(DbValue::Null)
    }
}

/// Conversion from a database value
pub trait FromValue: Sized {
    /// Whether a procedure's integer return value can satisfy this type
    const INTEGER_LIKE: bool = false;

    fn from_value(value: &DbValue) -> Result<Self, MapError>;
}

fn mismatch(expected: &'static str, value: &DbValue) -> MapError {
    if value.is_null() {
        MapError::UnexpectedNull(expected)
    } else {
        MapError::TypeMismatch {
            expected,
            found: value.type_name(),
        }
    }
}

macro_rules! impl_integer_from_value {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                const INTEGER_LIKE: bool = true;

                fn from_value(value: &DbValue) -> Result<Self, MapError> {
                    let wide = value
                        .as_i64()
                        .ok_or_else(|| mismatch(stringify!($ty), value))?;
                    <$ty>::try_from(wide).map_err(|_| MapError::OutOfRange {
                        expected: stringify!($ty),
                        value: wide,
                    })
                }
            }
        )*
    };
}

impl_integer_from_value!(i16, i32, i64);

impl FromValue for bool {
    fn from_value(value: &DbValue) -> Result<Self, MapError> {
        match value {
            DbValue::Bool(v) => Ok(*v),
            // bit columns often arrive as integers
            other => match other.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(mismatch("bool", other)),
            },
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &DbValue) -> Result<Self, MapError> {
        match value {
            DbValue::Double(v) => Ok(*v),
            other => other
                .as_i64()
                .map(|v| v as f64)
                .ok_or_else(|| mismatch("f64", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &DbValue) -> Result<Self, MapError> {
        match value {
            DbValue::Text(v) => Ok(v.clone()),
            other => Err(mismatch("String", other)),
        }
    }
}

impl FromValue for Bytes {
    fn from_value(value: &DbValue) -> Result<Self, MapError> {
        match value {
            DbValue::Binary(v) => Ok(v.clone()),
            other => Err(mismatch("Bytes", other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &DbValue) -> Result<Self, MapError> {
        match value {
            DbValue::Uuid(v) => Ok(*v),
            DbValue::Text(s) => Uuid::parse_str(s).map_err(|e| MapError::Invalid(e.to_string())),
            other => Err(mismatch("Uuid", other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &DbValue) -> Result<Self, MapError> {
        match value {
            DbValue::Timestamp(v) => Ok(*v),
            other => Err(mismatch("DateTime<Utc>", other)),
        }
    }
}

impl FromValue for DbValue {
    fn from_value(value: &DbValue) -> Result<Self, MapError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const INTEGER_LIKE: bool = T::INTEGER_LIKE;

    fn from_value(value: &DbValue) -> Result<Self, MapError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
