use std::fmt::{self, Display};
use std::mem::replace;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use super::value::{Type, Value};

/// Built-in commutative reducers backing aggregator cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reducer {
    Sum,
    Product,
    Min,
    Max,
    Overwrite,
    And,
    Or,
    Append,
}

impl Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Sum => "sum",
            Self::Product => "product",
            Self::Min => "min",
            Self::Max => "max",
            Self::Overwrite => "overwrite",
            Self::And => "and",
            Self::Or => "or",
            Self::Append => "append",
        };
        f.write_str(name)
    }
}

impl Reducer {
    pub fn supports(self, element: Type) -> bool {
        match self {
            Self::Sum | Self::Product | Self::Min | Self::Max => {
                matches!(element, Type::Int | Type::Float)
            }
            Self::And | Self::Or => element == Type::Bool,
            Self::Overwrite | Self::Append => matches!(
                element,
                Type::Bool | Type::Int | Type::Float | Type::String
            ),
        }
    }

    /// Neutral state of the reducer; only meaningful for supported elements.
    pub fn identity(self, element: Type) -> Value {
        match (self, element) {
            (Self::Sum, Type::Float) => Value::from(0.0),
            (Self::Product, Type::Float) => Value::from(1.0),
            (Self::Min, Type::Float) => Value::from(f64::INFINITY),
            (Self::Max, Type::Float) => Value::from(f64::NEG_INFINITY),
            (Self::Sum, _) => Value::Int(0),
            (Self::Product, _) => Value::Int(1),
            (Self::Min, _) => Value::Int(i64::MAX),
            (Self::Max, _) => Value::Int(i64::MIN),
            (Self::And, _) => Value::Bool(true),
            (Self::Or, _) => Value::Bool(false),
            (Self::Overwrite, _) => Value::None,
            (Self::Append, _) => Value::Tuple(Vec::new().into()),
        }
    }

    /// Lifts a single aggregated element into a reducer state.
    pub fn init(self, value: Value) -> Value {
        match self {
            Self::Append => Value::Tuple([value].into()),
            _ => value,
        }
    }

    /// Merges two states. The operation is associative and commutative for
    /// every reducer except `Overwrite`, where the right-hand side wins.
    pub fn combine(self, lhs: Value, rhs: Value) -> Result<Value> {
        let combined = match (self, lhs, rhs) {
            (Self::Sum, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(b)),
            (Self::Sum, Value::Float(a), Value::Float(b)) => Value::Float(a + b),
            (Self::Product, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_mul(b)),
            (Self::Product, Value::Float(a), Value::Float(b)) => Value::Float(a * b),
            (Self::Min, a @ Value::Int(_), b @ Value::Int(_))
            | (Self::Min, a @ Value::Float(_), b @ Value::Float(_)) => a.min(b),
            (Self::Max, a @ Value::Int(_), b @ Value::Int(_))
            | (Self::Max, a @ Value::Float(_), b @ Value::Float(_)) => a.max(b),
            (Self::And, Value::Bool(a), Value::Bool(b)) => Value::Bool(a && b),
            (Self::Or, Value::Bool(a), Value::Bool(b)) => Value::Bool(a || b),
            (Self::Overwrite, lhs, Value::None) => lhs,
            (Self::Overwrite, _, rhs) => rhs,
            // both sides are sorted
            (Self::Append, Value::Tuple(a), Value::Tuple(b)) => {
                Value::Tuple(a.iter().merge(b.iter()).cloned().collect())
            }
            (reducer, lhs, rhs) => {
                return Err(Error::ReducerTypeMismatch { reducer, lhs, rhs });
            }
        };
        Ok(combined)
    }

    /// In-place variant of [`Reducer::combine`].
    pub fn plus_equals(self, state: &mut Value, rhs: Value) -> Result<()> {
        let lhs = replace(state, Value::None);
        *state = self.combine(lhs, rhs)?;
        Ok(())
    }
}

/// A reducer together with the element type its cell accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregatorKind {
    pub reducer: Reducer,
    pub element: Type,
}

impl AggregatorKind {
    pub const INT64_SUM: Self = Self::new(Reducer::Sum, Type::Int);
    pub const INT64_PRODUCT: Self = Self::new(Reducer::Product, Type::Int);
    pub const INT64_MIN: Self = Self::new(Reducer::Min, Type::Int);
    pub const INT64_MAX: Self = Self::new(Reducer::Max, Type::Int);
    pub const INT64_OVERWRITE: Self = Self::new(Reducer::Overwrite, Type::Int);
    pub const INT64_APPEND: Self = Self::new(Reducer::Append, Type::Int);
    pub const DOUBLE_SUM: Self = Self::new(Reducer::Sum, Type::Float);
    pub const DOUBLE_PRODUCT: Self = Self::new(Reducer::Product, Type::Float);
    pub const DOUBLE_MIN: Self = Self::new(Reducer::Min, Type::Float);
    pub const DOUBLE_MAX: Self = Self::new(Reducer::Max, Type::Float);
    pub const DOUBLE_OVERWRITE: Self = Self::new(Reducer::Overwrite, Type::Float);
    pub const DOUBLE_APPEND: Self = Self::new(Reducer::Append, Type::Float);
    pub const BOOL_AND: Self = Self::new(Reducer::And, Type::Bool);
    pub const BOOL_OR: Self = Self::new(Reducer::Or, Type::Bool);
    pub const BOOL_OVERWRITE: Self = Self::new(Reducer::Overwrite, Type::Bool);
    pub const TEXT_OVERWRITE: Self = Self::new(Reducer::Overwrite, Type::String);
    pub const TEXT_APPEND: Self = Self::new(Reducer::Append, Type::String);

    pub const fn new(reducer: Reducer, element: Type) -> Self {
        Self { reducer, element }
    }

    pub fn identity(&self) -> Value {
        self.reducer.identity(self.element)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reducer.supports(self.element) {
            Ok(())
        } else {
            Err(Error::UnsupportedAggregator {
                reducer: self.reducer,
                element: self.element,
            })
        }
    }

    /// Whether `state` is a well-formed state of this kind.
    pub fn accepts_state(&self, state: &Value) -> bool {
        match (self.reducer, state) {
            (Reducer::Overwrite, Value::None) => true,
            (Reducer::Append, Value::Tuple(items)) => {
                items.iter().all(|item| item.get_type() == self.element)
            }
            (Reducer::Append, _) => false,
            (_, state) => state.get_type() == self.element,
        }
    }
}

impl Display for AggregatorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}<{}>", self.reducer, self.element)
    }
}
