//! Scalar leaf values
//!
//! The only kind of value a backing store ever holds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A leaf value of the configuration tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// `None`, `()` and unit structs
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// Short name of the scalar's type, used in mismatch messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Str(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Convert `self` to the declared type of `target`
    ///
    /// A null target has no declared type and accepts anything; a null value
    /// is accepted everywhere and left to the typed decode to reject.
    pub fn coerce_like(&self, target: &Scalar) -> Option<Scalar> {
        match (target, self) {
            (Scalar::Null, value) | (_, value @ Scalar::Null) => Some(value.clone()),

            (Scalar::Bool(_), Scalar::Bool(b)) => Some(Scalar::Bool(*b)),
            (Scalar::Bool(_), Scalar::Str(s)) => s.trim().parse().ok().map(Scalar::Bool),

            (Scalar::Int(_), Scalar::Int(i)) => Some(Scalar::Int(*i)),
            (Scalar::Int(_), Scalar::Float(f))
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 =>
            {
                Some(Scalar::Int(*f as i64))
            }
            (Scalar::Int(_), Scalar::Str(s)) => s.trim().parse().ok().map(Scalar::Int),

            (Scalar::Float(_), Scalar::Float(f)) => Some(Scalar::Float(*f)),
            (Scalar::Float(_), Scalar::Int(i)) => Some(Scalar::Float(*i as f64)),
            (Scalar::Float(_), Scalar::Str(s)) => s.trim().parse().ok().map(Scalar::Float),

            (Scalar::Str(_), Scalar::Str(s)) => Some(Scalar::Str(s.clone())),

            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Str(value)
    }
}
