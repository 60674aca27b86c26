// Copyright © 2024 Pathway

use std::fmt::{self, Display};
use std::sync::Arc;

use itertools::Itertools as _;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// A dynamically typed aggregator payload. The derived order is total,
/// which is what the min/max reducers and the sorted append rely on.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(Arc<str>),
    Tuple(Arc<[Self]>),
}

impl Value {
    #[inline(never)]
    #[cold]
    fn type_mismatch(&self, expected: &'static str) -> Error {
        Error::TypeMismatch {
            expected,
            value: self.clone(),
        }
    }

    pub fn get_type(&self) -> Type {
        match self {
            Self::None => Type::None,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::String(_) => Type::String,
            Self::Tuple(_) => Type::Tuple,
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        if let Value::Int(i) = self {
            Ok(*i)
        } else {
            Err(self.type_mismatch("integer"))
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        if let Value::Bool(b) = self {
            Ok(*b)
        } else {
            Err(self.type_mismatch("bool"))
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        if let Self::Float(f) = self {
            Ok(f.into_inner())
        } else {
            Err(self.type_mismatch("float"))
        }
    }

    pub fn as_string(&self) -> Result<&Arc<str>> {
        if let Self::String(s) = self {
            Ok(s)
        } else {
            Err(self.type_mismatch("string"))
        }
    }

    pub fn as_tuple(&self) -> Result<&Arc<[Self]>> {
        if let Self::Tuple(t) = self {
            Ok(t)
        } else {
            Err(self.type_mismatch("tuple"))
        }
    }
}

impl Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::None => write!(fmt, "None"),
            Self::Bool(b) => write!(fmt, "{}", if *b { "True" } else { "False" }),
            Self::Int(i) => write!(fmt, "{i}"),
            Self::Float(OrderedFloat(f)) => write!(fmt, "{f:?}"),
            Self::String(s) => write!(fmt, "{s:?}"),
            Self::Tuple(vals) => write!(fmt, "({})", vals.iter().format(", ")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(OrderedFloat(f))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<&[Value]> for Value {
    fn from(t: &[Value]) -> Self {
        Self::Tuple(t.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(t: Vec<Value>) -> Self {
        Self::Tuple(t.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    None,
    Bool,
    Int,
    Float,
    String,
    Tuple,
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Tuple => "tuple",
        };
        fmt.write_str(name)
    }
}

/// Conversion between Rust values and aggregator payloads.
///
/// `aggregate::<T>` lifts a `T` with [`Aggregatable::into_value`] and
/// `get_aggregated_value::<T>` reads one back with
/// [`Aggregatable::from_value`]. An append aggregator over `T` is read as
/// `Vec<T>`, an overwrite aggregator that may be empty as `Option<T>`.
pub trait Aggregatable: Sized {
    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Result<Self>;
}

impl Aggregatable for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_int()
    }
}

impl Aggregatable for f64 {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_float()
    }
}

impl Aggregatable for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool()
    }
}

impl Aggregatable for String {
    fn into_value(self) -> Value {
        Value::String(self.into())
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_string().map(|s| s.to_string())
    }
}

impl Aggregatable for Value {
    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl<T: Aggregatable> Aggregatable for Vec<T> {
    fn into_value(self) -> Value {
        Value::Tuple(self.into_iter().map(Aggregatable::into_value).collect())
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_tuple()?.iter().map(T::from_value).collect()
    }
}

impl<T: Aggregatable> Aggregatable for Option<T> {
    fn into_value(self) -> Value {
        match self {
            None => Value::None,
            Some(v) => v.into_value(),
        }
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::None => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }
}
