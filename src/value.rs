//! The runtime value type threaded through formula evaluation.
//!
//! Stands in for whatever a real embedded expression compiler would hand
//! back as a computed value; see `bingo-types::FactValue` for the shape this
//! is modeled on.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single computed or context-supplied value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Boolean(bool),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
    Null,
}

impl Value {
    /// Truthiness used by `if`/`cond` evaluation.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Decimal(d) => !d.is_zero(),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::Date(_) => true,
            Value::Null => false,
        }
    }

    /// The declared [`Type`] this value would be reported as.
    pub fn value_type(&self) -> Type {
        match self {
            Value::Integer(_) => Type::Integer,
            Value::Float(_) => Type::Float,
            Value::Decimal(_) => Type::Decimal,
            Value::Boolean(_) => Type::Boolean,
            Value::String(_) => Type::String,
            Value::Date(_) => Type::Date,
            Value::Array(_) => Type::Array,
            Value::Object(_) => Type::Object,
            Value::Null => Type::Any,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Value::Array(_) => write!(f, "<array>"),
            Value::Object(_) => write!(f, "<object>"),
            Value::Null => write!(f, "null"),
        }
    }
}

/// The declared data type of a formula or variable.
///
/// `Any` is reserved for context lookups whose type the context does not
/// advertise up front; a formula's own `data_type` is never `Any`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Type {
    Integer,
    Float,
    Decimal,
    Boolean,
    String,
    Date,
    Array,
    Object,
    Any,
}

impl Type {
    /// Whether a value of `Type::Decimal` is assignable to this type,
    /// either directly or through a known implicit widening.
    ///
    /// This is the "assignable via implicit conversion" rule the spec
    /// adopts for rounding applicability (open question 3): `Decimal` is
    /// assignable to `Decimal` itself and to `Any` (an untyped context
    /// slot is permissive about what it accepts).
    pub fn decimal_is_assignable_to(self) -> bool {
        matches!(self, Type::Decimal | Type::Any)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Type::Integer => "int",
            Type::Float => "float",
            Type::Decimal => "decimal",
            Type::Boolean => "bool",
            Type::String => "string",
            Type::Date => "date",
            Type::Array => "array",
            Type::Object => "object",
            Type::Any => "any",
        };
        write!(f, "{s}")
    }
}
