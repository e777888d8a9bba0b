//! Dynamic values and host-type conversions.
//!
//! [`Value`] is the only representation that crosses the engine boundary: the
//! four SQLite storage classes plus NULL. [`ToValue`] and [`FromValue`] map
//! Rust scalars onto it and back.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::{ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// The engine's dynamic storage classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageClass {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Null => "NULL",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        })
    }
}

impl Value {
    pub fn storage_class(&self) -> StorageClass {
        match self {
            Self::Null => StorageClass::Null,
            Self::Integer(_) => StorageClass::Integer,
            Self::Real(_) => StorageClass::Real,
            Self::Text(_) => StorageClass::Text,
            Self::Blob(_) => StorageClass::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn mismatch(&self, expected: &'static str) -> DecodeError {
        match self {
            Self::Null => DecodeError::UnexpectedNull(expected),
            other => DecodeError::TypeMismatch {
                expected,
                found: other.storage_class(),
            },
        }
    }
}

impl TryFrom<ValueRef<'_>> for Value {
    type Error = DecodeError;

    /// Text must be valid UTF-8; malformed bytes are an error, never replaced.
    fn try_from(value: ValueRef<'_>) -> Result<Self, Self::Error> {
        Ok(match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(r) => Self::Real(r),
            ValueRef::Text(t) => Self::Text(
                std::str::from_utf8(t)
                    .map_err(|e| DecodeError::InvalidFormat(format!("invalid utf-8 text: {e}")))?
                    .to_string(),
            ),
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        })
    }
}

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            Self::Null => ValueRef::Null,
            Self::Integer(i) => ValueRef::Integer(*i),
            Self::Real(r) => ValueRef::Real(*r),
            Self::Text(t) => ValueRef::Text(t.as_bytes()),
            Self::Blob(b) => ValueRef::Blob(b),
        }))
    }
}

/// Converts a host scalar into a dynamic value.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Converts a dynamic value back into a host type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, DecodeError>;
}

/// Encodes a host value as a dynamic value.
pub fn bind<T: ToValue + ?Sized>(value: &T) -> Value {
    value.to_value()
}

/// Decodes a dynamic value into the requested host type.
pub fn extract<T: FromValue>(value: Value) -> Result<T, DecodeError> {
    T::from_value(value)
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        Ok(value)
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

macro_rules! integer_value {
    ($($ty:ty),*) => {$(
        impl ToValue for $ty {
            fn to_value(&self) -> Value {
                Value::Integer(i64::from(*self))
            }
        }

        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self, DecodeError> {
                match value {
                    Value::Integer(i) => <$ty>::try_from(i).map_err(|_| DecodeError::OutOfRange {
                        value: i,
                        target: stringify!($ty),
                    }),
                    other => Err(other.mismatch(stringify!($ty))),
                }
            }
        }
    )*};
}

integer_value!(i8, i16, i32, i64, u8, u16, u32);

impl FromValue for usize {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Integer(i) => usize::try_from(i).map_err(|_| DecodeError::OutOfRange {
                value: i,
                target: "usize",
            }),
            other => Err(other.mismatch("usize")),
        }
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Real(*self)
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Real(f64::from(*self))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Real(r) => Ok(r),
            Value::Integer(i) => Ok(i as f64),
            other => Err(other.mismatch("f64")),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        f64::from_value(value).map(|r| r as f32)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            Value::Integer(i) => Err(DecodeError::OutOfRange {
                value: i,
                target: "bool",
            }),
            other => Err(other.mismatch("bool")),
        }
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Text(t) => Ok(t),
            other => Err(other.mismatch("String")),
        }
    }
}

impl ToValue for [u8] {
    fn to_value(&self) -> Value {
        Value::Blob(self.to_vec())
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Blob(b) => Ok(b),
            other => Err(other.mismatch("Vec<u8>")),
        }
    }
}

// Date/time values use SQLite's own text representations so the engine's
// date functions accept them.

impl ToValue for NaiveDate {
    fn to_value(&self) -> Value {
        Value::Text(self.format(DATE_FORMAT).to_string())
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Text(t) => NaiveDate::parse_from_str(&t, DATE_FORMAT)
                .map_err(|e| DecodeError::InvalidFormat(format!("date {t:?}: {e}"))),
            other => Err(other.mismatch("NaiveDate")),
        }
    }
}

impl ToValue for NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::Text(self.format(DATETIME_FORMAT).to_string())
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Text(t) => NaiveDateTime::parse_from_str(&t, DATETIME_FORMAT)
                .map_err(|e| DecodeError::InvalidFormat(format!("datetime {t:?}: {e}"))),
            other => Err(other.mismatch("NaiveDateTime")),
        }
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Text(self.to_rfc3339())
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Text(t) => DateTime::parse_from_rfc3339(&t)
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|_| {
                    NaiveDateTime::parse_from_str(&t, DATETIME_FORMAT).map(|dt| dt.and_utc())
                })
                .map_err(|e| DecodeError::InvalidFormat(format!("timestamp {t:?}: {e}"))),
            other => Err(other.mismatch("DateTime<Utc>")),
        }
    }
}
