//! A restricted expression language for operation expressions.
//!
//! Expressions support integer, float, and string literals, `!${name}$!`
//! references, `+ - * / // %`, parentheses, and a handful of built-in
//! functions (`abs min max round floor ceil int float str`). Nothing else is
//! ever executed.

/// Expression tree types.
pub mod ast;
/// Evaluation of expression trees.
pub mod eval;
/// Tokenizer built on logos.
pub mod lexer;
/// Parser built on chumsky.
pub mod parser;

use std::fmt;

use crate::value::Value;

pub use ast::{BinaryOp, Expr, UnaryOp};

/// An error from lexing, parsing, evaluating, or applying an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprError {
    /// Byte range of the problem in the source, when known.
    pub span: Option<std::ops::Range<usize>>,
    /// Human-readable description.
    pub message: String,
}

impl ExprError {
    /// An error without a source location.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            span: None,
            message: message.into(),
        }
    }

    /// An error at a source location.
    pub fn at(span: std::ops::Range<usize>, message: impl Into<String>) -> Self {
        Self {
            span: Some(span),
            message: message.into(),
        }
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExprError {}

/// Lex and parse an expression. Only the first problem is reported.
pub fn parse_expression(source: &str) -> Result<Expr, ExprError> {
    let (tokens, lex_errors) = lexer::lex(source);
    if let Some(e) = lex_errors.into_iter().next() {
        return Err(ExprError::at(e.span, e.message));
    }
    if tokens.is_empty() {
        return Err(ExprError::at(0..source.len(), "empty expression"));
    }
    parser::parse(&tokens).map_err(|errors| {
        errors
            .into_iter()
            .next()
            .map(|e| ExprError::at(e.span, e.message))
            .unwrap_or_else(|| ExprError::new("invalid expression"))
    })
}

/// Parse and evaluate an expression in one step.
pub fn evaluate_str<F>(source: &str, lookup: &F) -> Result<Value, ExprError>
where
    F: Fn(&str) -> Option<Value>,
{
    let expr = parse_expression(source)?;
    eval::evaluate(&expr, lookup)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_refs(_: &str) -> Option<Value> {
        None
    }

    #[test]
    fn parse_errors_carry_spans() {
        let err = parse_expression("1 + $").unwrap_err();
        assert_eq!(err.span, Some(4..5));
    }

    #[test]
    fn empty_expression_is_rejected() {
        let err = parse_expression("   ").unwrap_err();
        assert_eq!(err.message, "empty expression");
    }

    #[test]
    fn evaluate_literal() {
        assert_eq!(evaluate_str("10", &no_refs).unwrap(), Value::Integer(10));
        assert_eq!(evaluate_str("-3", &no_refs).unwrap(), Value::Integer(-3));
    }
}
