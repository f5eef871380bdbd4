use crate::ir::{BinaryOp, UnaryOp};

use super::RuntimeError;

/// Runtime value. Integer arithmetic wraps; `/` is floor division, checked
/// for a zero divisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
        }
    }

    pub(super) fn as_int(&self, line: u32) -> Result<i64, RuntimeError> {
        match self {
            Value::Int(value) => Ok(*value),
            other => Err(RuntimeError::TypeError {
                message: format!("Expected int, got {}", other.type_name()),
                line,
            }),
        }
    }

    pub(super) fn as_bool(&self, line: u32) -> Result<bool, RuntimeError> {
        match self {
            Value::Bool(value) => Ok(*value),
            other => Err(RuntimeError::TypeError {
                message: format!("Expected bool, got {}", other.type_name()),
                line,
            }),
        }
    }

    /// Rendering used in debug snapshots: strings keep their quotes so `5`
    /// and `"5"` stay distinguishable.
    pub fn binding_text(&self) -> String {
        match self {
            Value::Str(value) => format!("{value:?}"),
            other => other.to_string(),
        }
    }
}

/// Program output rendering: bare string contents, `true`/`false` for bools.
impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Str(value) => f.write_str(value),
        }
    }
}

pub(super) fn apply_binary(
    op: BinaryOp,
    lhs: &Value,
    rhs: &Value,
    line: u32,
) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Add => Ok(Value::Int(lhs.as_int(line)?.wrapping_add(rhs.as_int(line)?))),
        BinaryOp::Sub => Ok(Value::Int(lhs.as_int(line)?.wrapping_sub(rhs.as_int(line)?))),
        BinaryOp::Mul => Ok(Value::Int(lhs.as_int(line)?.wrapping_mul(rhs.as_int(line)?))),
        BinaryOp::Div => {
            let dividend = lhs.as_int(line)?;
            let divisor = rhs.as_int(line)?;
            if divisor == 0 {
                return Err(RuntimeError::DivisionByZero { line });
            }
            Ok(Value::Int(floor_div(dividend, divisor)))
        }
        BinaryOp::Lt => order(lhs, rhs, line, |ordering| ordering.is_lt()),
        BinaryOp::Gt => order(lhs, rhs, line, |ordering| ordering.is_gt()),
        BinaryOp::Le => order(lhs, rhs, line, |ordering| ordering.is_le()),
        BinaryOp::Ge => order(lhs, rhs, line, |ordering| ordering.is_ge()),
        BinaryOp::Eq => equality(lhs, rhs, line).map(Value::Bool),
        BinaryOp::Ne => equality(lhs, rhs, line).map(|equal| Value::Bool(!equal)),
    }
}

pub(super) fn apply_unary(op: UnaryOp, value: &Value, line: u32) -> Result<Value, RuntimeError> {
    match op {
        UnaryOp::Neg => Ok(Value::Int(value.as_int(line)?.wrapping_neg())),
        UnaryOp::Not => Ok(Value::Bool(!value.as_bool(line)?)),
    }
}

/// Quotient rounded toward negative infinity. Wrapping keeps
/// `i64::MIN / -1` defined instead of trapping.
fn floor_div(dividend: i64, divisor: i64) -> i64 {
    let quotient = dividend.wrapping_div(divisor);
    let remainder = dividend.wrapping_rem(divisor);
    if remainder != 0 && (remainder < 0) != (divisor < 0) {
        quotient.wrapping_sub(1)
    } else {
        quotient
    }
}

fn order(
    lhs: &Value,
    rhs: &Value,
    line: u32,
    check: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, RuntimeError> {
    let ordering = match (lhs, rhs) {
        (Value::Int(left), Value::Int(right)) => left.cmp(right),
        (Value::Str(left), Value::Str(right)) => left.cmp(right),
        (Value::Bool(left), Value::Bool(right)) => left.cmp(right),
        _ => {
            return Err(RuntimeError::TypeError {
                message: format!(
                    "Cannot compare {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                ),
                line,
            });
        }
    };
    Ok(Value::Bool(check(ordering)))
}

fn equality(lhs: &Value, rhs: &Value, line: u32) -> Result<bool, RuntimeError> {
    match (lhs, rhs) {
        (Value::Int(left), Value::Int(right)) => Ok(left == right),
        (Value::Bool(left), Value::Bool(right)) => Ok(left == right),
        (Value::Str(left), Value::Str(right)) => Ok(left == right),
        _ => Err(RuntimeError::TypeError {
            message: format!(
                "Cannot compare {} and {}",
                lhs.type_name(),
                rhs.type_name()
            ),
            line,
        }),
    }
}
