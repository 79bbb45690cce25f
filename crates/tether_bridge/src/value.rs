//! Host-side view of values exchanged with script.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::HostError;
use crate::proxy::ForeignObject;
use crate::reflect::{HostObject, HostType};

/// A value on the host side of the bridge.
///
/// Scalars are copied across the boundary. `Object` pins a host object for
/// script and `Foreign` refers to an object living in the engine. Both compare
/// by identity.
#[derive(Clone, Default)]
pub enum HostValue {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<HostValue>),
    Object(HostObject),
    Foreign(ForeignObject),
}

impl HostValue {
    /// Wraps a host object so script can reach its members.
    pub fn object<T: HostType>(value: T) -> Self {
        HostValue::Object(HostObject::new(value))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Number(_) => "number",
            HostValue::String(_) => "string",
            HostValue::Date(_) => "date",
            HostValue::Array(_) => "array",
            HostValue::Object(_) => "host object",
            HostValue::Foreign(_) => "foreign object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Integers, plus numbers with no fractional part that fit in `i32`.
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            HostValue::Int(value) => Some(value),
            HostValue::Number(value)
                if value.fract() == 0.0 && value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX) =>
            {
                Some(value as i32)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            HostValue::Int(value) => Some(f64::from(value)),
            HostValue::Number(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            HostValue::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            HostValue::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_foreign(&self) -> Option<&ForeignObject> {
        match self {
            HostValue::Foreign(object) => Some(object),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<HostValue>> {
        match self {
            HostValue::Array(items) => Some(items),
            _ => None,
        }
    }

    // Fallible accessors for setters, reported against position 0.

    pub fn to_bool(&self) -> Result<bool, HostError> {
        self.as_bool().ok_or_else(|| self.mismatch("bool"))
    }

    pub fn to_i32(&self) -> Result<i32, HostError> {
        self.as_i32().ok_or_else(|| self.mismatch("int"))
    }

    pub fn to_f64(&self) -> Result<f64, HostError> {
        self.as_f64().ok_or_else(|| self.mismatch("number"))
    }

    pub fn to_str(&self) -> Result<&str, HostError> {
        self.as_str().ok_or_else(|| self.mismatch("string"))
    }

    pub(crate) fn mismatch(&self, expected: &'static str) -> HostError {
        HostError::ArgumentType {
            position: 0,
            expected,
            found: self.kind(),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Number(a), HostValue::Number(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Date(a), HostValue::Date(b)) => a == b,
            (HostValue::Array(a), HostValue::Array(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => a.same(b),
            (HostValue::Foreign(a), HostValue::Foreign(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => f.write_str("Null"),
            HostValue::Bool(value) => write!(f, "Bool({value})"),
            HostValue::Int(value) => write!(f, "Int({value})"),
            HostValue::Number(value) => write!(f, "Number({value})"),
            HostValue::String(value) => write!(f, "String({value:?})"),
            HostValue::Date(value) => write!(f, "Date({})", value.to_rfc3339()),
            HostValue::Array(items) => f.debug_tuple("Array").field(items).finish(),
            HostValue::Object(object) => write!(f, "Object({})", object.type_name()),
            HostValue::Foreign(object) => write!(f, "{object:?}"),
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

// Up to 32 bits everything shares the integer slot; wider types become
// doubles.
macro_rules! from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for HostValue {
            fn from(value: $ty) -> Self {
                HostValue::Int(i32::from(value))
            }
        })*
    };
}

macro_rules! from_wide {
    ($($ty:ty),*) => {
        $(impl From<$ty> for HostValue {
            fn from(value: $ty) -> Self {
                HostValue::Number(value as f64)
            }
        })*
    };
}

from_int!(i8, u8, i16, u16, i32);
from_wide!(i64, u64, isize, usize, f32, f64);

/// Wraps: values above `i32::MAX` come out negative.
impl From<u32> for HostValue {
    fn from(value: u32) -> Self {
        HostValue::Int(value as i32)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<char> for HostValue {
    fn from(value: char) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl From<&String> for HostValue {
    fn from(value: &String) -> Self {
        HostValue::String(value.clone())
    }
}

impl From<DateTime<Utc>> for HostValue {
    fn from(value: DateTime<Utc>) -> Self {
        HostValue::Date(value)
    }
}

impl From<()> for HostValue {
    fn from(_: ()) -> Self {
        HostValue::Null
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(HostValue::Null, Into::into)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        HostValue::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<HostObject> for HostValue {
    fn from(value: HostObject) -> Self {
        HostValue::Object(value)
    }
}

impl From<ForeignObject> for HostValue {
    fn from(value: ForeignObject) -> Self {
        HostValue::Foreign(value)
    }
}
