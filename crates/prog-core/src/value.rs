//! Dynamic data values.
//!
//! Every variable in a character snapshot holds one of three value types.
//! Coercions follow the rules an `ASSIGN <TYPE>` operation applies: floats
//! truncate toward zero when forced to integers, strings are parsed after
//! trimming, and anything can become a string.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::ExprError;

/// The type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    /// A text value.
    String,
    /// A 64-bit signed integer.
    Integer,
    /// A 64-bit float.
    Float,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "STRING"),
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
        }
    }
}

/// A dynamic data value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A 64-bit signed integer value.
    Integer(i64),
    /// A 64-bit floating-point value.
    Float(f64),
    /// A text value.
    String(String),
}

impl Value {
    /// The type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,
            Self::Integer(_) => ValueType::Integer,
            Self::Float(_) => ValueType::Float,
        }
    }

    /// Interpret raw text the way entry field values are read: integers
    /// first, then floats, otherwise the text itself.
    pub fn infer(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            Self::Integer(n)
        } else if let Ok(n) = trimmed.parse::<f64>()
            && n.is_finite()
        {
            Self::Float(n)
        } else {
            Self::String(text.to_string())
        }
    }

    /// Coerce to an integer.
    pub fn to_integer(&self) -> Result<i64, ExprError> {
        match self {
            Self::Integer(n) => Ok(*n),
            Self::Float(n) => {
                if n.is_finite() && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 {
                    Ok(n.trunc() as i64)
                } else {
                    Err(ExprError::new(format!("cannot convert {n} to an integer")))
                }
            }
            Self::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| ExprError::new(format!("invalid integer: \"{s}\""))),
        }
    }

    /// Coerce to a float.
    pub fn to_float(&self) -> Result<f64, ExprError> {
        match self {
            Self::Integer(n) => Ok(*n as f64),
            Self::Float(n) => Ok(*n),
            Self::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| ExprError::new(format!("invalid float: \"{s}\""))),
        }
    }

    /// Coerce to the given type.
    pub fn coerce(&self, ty: ValueType) -> Result<Self, ExprError> {
        match ty {
            ValueType::String => Ok(Self::String(self.to_string())),
            ValueType::Integer => self.to_integer().map(Self::Integer),
            ValueType::Float => self.to_float().map(Self::Float),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(n) if n.is_finite() && n.fract() == 0.0 => write!(f, "{n:.1}"),
            Self::Float(n) => write!(f, "{n}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}
