//! Dynamic data operations.
//!
//! An operation is a `(target key, kind, expression)` triple. Categories and
//! entries carry them in [`OperationTable`]s keyed by target.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::expr::{ExprError, eval};
use crate::value::{Value, ValueType};

/// What an operation does to its target key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Set the key to a string.
    #[serde(rename = "ASSIGN STRING")]
    AssignString,
    /// Set the key to an integer.
    #[serde(rename = "ASSIGN INTEGER")]
    AssignInteger,
    /// Set the key to a float.
    #[serde(rename = "ASSIGN FLOAT")]
    AssignFloat,
    /// Integer addition.
    #[serde(rename = "ADD INTEGER")]
    AddInteger,
    /// Float addition.
    #[serde(rename = "ADD FLOAT")]
    AddFloat,
    /// Integer subtraction.
    #[serde(rename = "SUBTRACT INTEGER")]
    SubtractInteger,
    /// Float subtraction.
    #[serde(rename = "SUBTRACT FLOAT")]
    SubtractFloat,
    /// Integer multiplication.
    #[serde(rename = "MULTIPLY INTEGER")]
    MultiplyInteger,
    /// Float multiplication.
    #[serde(rename = "MULTIPLY FLOAT")]
    MultiplyFloat,
    /// Integer floor division.
    #[serde(rename = "DIVIDE INTEGER")]
    DivideInteger,
    /// Float division.
    #[serde(rename = "DIVIDE FLOAT")]
    DivideFloat,
}

impl OperationKind {
    /// Every kind, in declaration order.
    pub const ALL: [OperationKind; 11] = [
        Self::AssignString,
        Self::AssignInteger,
        Self::AssignFloat,
        Self::AddInteger,
        Self::AddFloat,
        Self::SubtractInteger,
        Self::SubtractFloat,
        Self::MultiplyInteger,
        Self::MultiplyFloat,
        Self::DivideInteger,
        Self::DivideFloat,
    ];

    /// Assignments run before mutations within a history index.
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            Self::AssignString | Self::AssignInteger | Self::AssignFloat
        )
    }

    /// The value type this kind produces.
    pub fn value_type(self) -> ValueType {
        match self {
            Self::AssignString => ValueType::String,
            Self::AssignInteger
            | Self::AddInteger
            | Self::SubtractInteger
            | Self::MultiplyInteger
            | Self::DivideInteger => ValueType::Integer,
            Self::AssignFloat
            | Self::AddFloat
            | Self::SubtractFloat
            | Self::MultiplyFloat
            | Self::DivideFloat => ValueType::Float,
        }
    }

    /// The tag used in operation tables, e.g. `"ADD INTEGER"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssignString => "ASSIGN STRING",
            Self::AssignInteger => "ASSIGN INTEGER",
            Self::AssignFloat => "ASSIGN FLOAT",
            Self::AddInteger => "ADD INTEGER",
            Self::AddFloat => "ADD FLOAT",
            Self::SubtractInteger => "SUBTRACT INTEGER",
            Self::SubtractFloat => "SUBTRACT FLOAT",
            Self::MultiplyInteger => "MULTIPLY INTEGER",
            Self::MultiplyFloat => "MULTIPLY FLOAT",
            Self::DivideInteger => "DIVIDE INTEGER",
            Self::DivideFloat => "DIVIDE FLOAT",
        }
    }

    /// Compute the new value of the target key.
    ///
    /// `current` is the key's value before the operation; `operand` is the
    /// evaluated expression. Mutating kinds require an existing value.
    pub fn apply(self, current: Option<&Value>, operand: &Value) -> Result<Value, ExprError> {
        if self.is_assignment() {
            return operand.coerce(self.value_type());
        }

        let current = current
            .ok_or_else(|| ExprError::new(format!("{self} on a key that has no value yet")))?;

        match self.value_type() {
            ValueType::Integer => {
                let lhs = current.to_integer()?;
                let rhs = operand.to_integer()?;
                let result = match self {
                    Self::AddInteger => lhs.checked_add(rhs),
                    Self::SubtractInteger => lhs.checked_sub(rhs),
                    Self::MultiplyInteger => lhs.checked_mul(rhs),
                    _ => {
                        if rhs == 0 {
                            return Err(ExprError::new("integer division by zero"));
                        }
                        eval::floor_div(lhs, rhs)
                    }
                };
                result
                    .map(Value::Integer)
                    .ok_or_else(|| ExprError::new("integer overflow"))
            }
            _ => {
                let lhs = current.to_float()?;
                let rhs = operand.to_float()?;
                let result = match self {
                    Self::AddFloat => lhs + rhs,
                    Self::SubtractFloat => lhs - rhs,
                    Self::MultiplyFloat => lhs * rhs,
                    _ => {
                        if rhs == 0.0 {
                            return Err(ExprError::new("float division by zero"));
                        }
                        lhs / rhs
                    }
                };
                Ok(Value::Float(result))
            }
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| format!("unknown operation kind: \"{s}\""))
    }
}

/// The kind and expression of one declared operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// What the operation does to its key.
    pub kind: OperationKind,
    /// Expression text; may contain `!${key}$!` references.
    pub expression: String,
}

impl OperationSpec {
    /// Create an operation spec.
    pub fn new(kind: OperationKind, expression: impl Into<String>) -> Self {
        Self {
            kind,
            expression: expression.into(),
        }
    }
}

/// Target key → operation. Ordered so evaluation is deterministic.
pub type OperationTable = BTreeMap<String, OperationSpec>;
