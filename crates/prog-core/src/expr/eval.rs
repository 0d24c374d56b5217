//! Tree-walking evaluator with Python-style numeric semantics.

use super::ExprError;
use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::value::Value;

/// Longest string, in bytes, that concatenation or repetition may produce.
pub const MAX_STRING_LEN: usize = 1 << 20;

/// Integer floor division. `None` on overflow or a zero divisor.
pub fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Integer remainder taking the sign of the divisor. `None` on a zero divisor.
fn floor_rem(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn float_rem(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        r + b
    } else {
        r
    }
}

/// Evaluate an expression tree, resolving references through `lookup`.
pub fn evaluate<F>(expr: &Expr, lookup: &F) -> Result<Value, ExprError>
where
    F: Fn(&str) -> Option<Value>,
{
    match expr {
        Expr::Integer(n) => Ok(Value::Integer(*n)),
        Expr::Float(n) => Ok(Value::Float(*n)),
        Expr::String(s) => Ok(Value::String(s.clone())),
        Expr::Reference(name) => {
            lookup(name).ok_or_else(|| ExprError::new(format!("unknown reference: {name}")))
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, lookup)?;
            match (op, value) {
                (UnaryOp::Pos, v @ (Value::Integer(_) | Value::Float(_))) => Ok(v),
                (UnaryOp::Neg, Value::Integer(n)) => n
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(|| ExprError::new("integer overflow")),
                (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
                (_, Value::String(s)) => {
                    Err(ExprError::new(format!("bad operand for unary sign: \"{s}\"")))
                }
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, lookup)?;
            let rhs = evaluate(rhs, lookup)?;
            binary(*op, lhs, rhs)
        }
        Expr::Call { name, args } => {
            let args = args
                .iter()
                .map(|a| evaluate(a, lookup))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, args)
        }
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    use Value::{Float, Integer, String};

    let overflow = || ExprError::new("integer overflow");

    match (op, lhs, rhs) {
        (BinaryOp::Add, String(a), String(b)) => {
            if a.len().saturating_add(b.len()) > MAX_STRING_LEN {
                return Err(ExprError::new("string concatenation too large"));
            }
            Ok(String(a + &b))
        }
        (BinaryOp::Mul, String(s), Integer(n)) | (BinaryOp::Mul, Integer(n), String(s)) => {
            let count = usize::try_from(n).unwrap_or(0);
            match s.len().checked_mul(count) {
                Some(len) if len <= MAX_STRING_LEN => Ok(String(s.repeat(count))),
                _ => Err(ExprError::new("string repetition too large")),
            }
        }
        (op, a @ String(_), b) | (op, a, b @ String(_)) => Err(ExprError::new(format!(
            "unsupported operand types for {op:?}: {} and {}",
            a.value_type(),
            b.value_type()
        ))),

        (BinaryOp::Add, Integer(a), Integer(b)) => a.checked_add(b).map(Integer).ok_or_else(overflow),
        (BinaryOp::Sub, Integer(a), Integer(b)) => a.checked_sub(b).map(Integer).ok_or_else(overflow),
        (BinaryOp::Mul, Integer(a), Integer(b)) => a.checked_mul(b).map(Integer).ok_or_else(overflow),
        (BinaryOp::FloorDiv, Integer(a), Integer(b)) => {
            if b == 0 {
                return Err(ExprError::new("integer division by zero"));
            }
            floor_div(a, b).map(Integer).ok_or_else(overflow)
        }
        (BinaryOp::Rem, Integer(a), Integer(b)) => {
            if b == 0 {
                return Err(ExprError::new("integer modulo by zero"));
            }
            floor_rem(a, b).map(Integer).ok_or_else(overflow)
        }

        (op, a, b) => {
            let a = a.to_float()?;
            let b = b.to_float()?;
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Rem if b == 0.0 => {
                    return Err(ExprError::new("division by zero"));
                }
                BinaryOp::Div => a / b,
                BinaryOp::FloorDiv => (a / b).floor(),
                BinaryOp::Rem => float_rem(a, b),
            };
            Ok(Float(result))
        }
    }
}

fn call(name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(ExprError::new(format!(
                "{name}() takes {n} argument(s), got {}",
                args.len()
            )))
        }
    };

    match name {
        "abs" => {
            arity(1)?;
            match &args[0] {
                Value::Integer(n) => n
                    .checked_abs()
                    .map(Value::Integer)
                    .ok_or_else(|| ExprError::new("integer overflow")),
                other => Ok(Value::Float(other.to_float()?.abs())),
            }
        }
        "round" | "floor" | "ceil" => {
            arity(1)?;
            let n = args[0].to_float()?;
            let rounded = match name {
                "round" => n.round(),
                "floor" => n.floor(),
                _ => n.ceil(),
            };
            Value::Float(rounded).to_integer().map(Value::Integer)
        }
        "int" => {
            arity(1)?;
            args[0].to_integer().map(Value::Integer)
        }
        "float" => {
            arity(1)?;
            args[0].to_float().map(Value::Float)
        }
        "str" => {
            arity(1)?;
            Ok(Value::String(args[0].to_string()))
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(ExprError::new(format!("{name}() needs at least one argument")));
            }
            let want_max = name == "max";
            let mut best: Option<(f64, Value)> = None;
            for arg in args {
                let key = arg.to_float()?;
                let better = match &best {
                    None => true,
                    Some((current, _)) => {
                        if want_max {
                            key > *current
                        } else {
                            key < *current
                        }
                    }
                };
                if better {
                    best = Some((key, arg));
                }
            }
            best.map(|(_, v)| v)
                .ok_or_else(|| ExprError::new(format!("{name}() needs at least one argument")))
        }
        other => Err(ExprError::new(format!("unknown function: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::evaluate_str;

    fn eval(source: &str) -> Result<Value, ExprError> {
        evaluate_str(source, &|name: &str| match name {
            "hp" => Some(Value::Integer(10)),
            "speed" => Some(Value::Float(1.5)),
            "name" => Some(Value::from("Aria")),
            _ => None,
        })
    }

    #[test]
    fn integer_arithmetic_stays_integer() {
        assert_eq!(eval("!${hp}$! - 3").unwrap(), Value::Integer(7));
        assert_eq!(eval("2 * (3 + 4)").unwrap(), Value::Integer(14));
    }

    #[test]
    fn true_division_yields_float() {
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval("8 / 2").unwrap(), Value::Float(4.0));
    }

    #[test]
    fn floor_division_and_remainder_follow_divisor_sign() {
        assert_eq!(eval("-7 // 2").unwrap(), Value::Integer(-4));
        assert_eq!(eval("7 // -2").unwrap(), Value::Integer(-4));
        assert_eq!(eval("-7 % 3").unwrap(), Value::Integer(2));
        assert_eq!(eval("7 % -3").unwrap(), Value::Integer(-2));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        assert_eq!(eval("!${speed}$! * 2").unwrap(), Value::Float(3.0));
    }

    #[test]
    fn string_concatenation_and_repetition() {
        assert_eq!(eval("'Sir ' + !${name}$!").unwrap(), Value::from("Sir Aria"));
        assert_eq!(eval("'ab' * 3").unwrap(), Value::from("ababab"));
    }

    #[test]
    fn oversized_repetition_is_an_error() {
        let err = eval("'ab' * 9223372036854775807").unwrap_err();
        assert_eq!(err.message, "string repetition too large");
        assert!(eval("'x' * 10000000000000").is_err());
        assert_eq!(eval("'ab' * -2").unwrap(), Value::from(""));
        assert_eq!(eval("'' * 9223372036854775807").unwrap(), Value::from(""));
    }

    #[test]
    fn string_plus_number_is_an_error() {
        assert!(eval("!${name}$! + 1").is_err());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(eval("1 // 0").is_err());
        assert!(eval("1 / 0").is_err());
        assert!(eval("1 % 0").is_err());
    }

    #[test]
    fn unknown_reference_is_an_error() {
        let err = eval("!${mana}$! + 1").unwrap_err();
        assert!(err.message.contains("mana"));
    }

    #[test]
    fn builtins() {
        assert_eq!(eval("max(1, !${hp}$!, 3)").unwrap(), Value::Integer(10));
        assert_eq!(eval("min(2, 1.5)").unwrap(), Value::Float(1.5));
        assert_eq!(eval("abs(-4)").unwrap(), Value::Integer(4));
        assert_eq!(eval("floor(2.7)").unwrap(), Value::Integer(2));
        assert_eq!(eval("ceil(2.1)").unwrap(), Value::Integer(3));
        assert_eq!(eval("int('12')").unwrap(), Value::Integer(12));
        assert_eq!(eval("str(3) + 'd6'").unwrap(), Value::from("3d6"));
        assert!(eval("system('rm')").is_err());
        assert!(eval("abs(1, 2)").is_err());
    }

    #[test]
    fn overflow_is_reported() {
        assert!(eval("9223372036854775807 + 1").is_err());
    }
}
