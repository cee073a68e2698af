//! Unary and binary operators.

use std::cmp::Ordering;

use crate::ast::{BinaryOperator, Position, UnaryOperator};
use crate::error::EvalError;
use crate::value::{to_text, Value};

pub(super) fn unary(op: UnaryOperator, value: &Value, position: Position) -> Result<Value, EvalError> {
    match op {
        UnaryOperator::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOperator::Neg => match value {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| EvalError::type_error("integer overflow", position)),
            Value::Float(n) => Ok(Value::Float(-n)),
            other => Err(EvalError::type_error(
                format!("cannot negate {}", other.type_name()),
                position,
            )),
        },
    }
}

pub(super) fn binary(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    position: Position,
) -> Result<Value, EvalError> {
    match op {
        BinaryOperator::Eq | BinaryOperator::Ne => {
            for operand in [left, right] {
                if let Some(problem) = operand.nesting_problem() {
                    return Err(EvalError::type_error(
                        format!("cannot compare {}: it {}", operand.type_name(), problem),
                        position,
                    ));
                }
            }
            Ok(Value::Bool((left == right) == (op == BinaryOperator::Eq)))
        }
        BinaryOperator::Lt | BinaryOperator::Gt | BinaryOperator::Le | BinaryOperator::Ge => {
            let ordering = compare(left, right).ok_or_else(|| {
                EvalError::type_error(
                    format!(
                        "cannot compare {} with {}",
                        left.type_name(),
                        right.type_name()
                    ),
                    position,
                )
            })?;
            Ok(Value::Bool(match op {
                BinaryOperator::Lt => ordering == Ordering::Less,
                BinaryOperator::Gt => ordering == Ordering::Greater,
                BinaryOperator::Le => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOperator::Concat => {
            let mut text = to_text(left, position)?;
            text.push_str(&to_text(right, position)?);
            Ok(Value::from(text))
        }
        BinaryOperator::Add => add(left, right, position),
        BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Rem => {
            arithmetic(op, left, right, position)
        }
        BinaryOperator::And => Ok(if left.is_truthy() {
            right.clone()
        } else {
            left.clone()
        }),
        BinaryOperator::Or => Ok(if left.is_truthy() {
            left.clone()
        } else {
            right.clone()
        }),
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            let (a, b) = (as_float(left)?, as_float(right)?);
            a.partial_cmp(&b)
        }
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        _ => None,
    }
}

fn add(left: &Value, right: &Value, position: Position) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::String(_), _) | (_, Value::String(_)) => {
            binary(BinaryOperator::Concat, left, right, position)
        }
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        _ => arithmetic(BinaryOperator::Add, left, right, position),
    }
}

fn arithmetic(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
    position: Position,
) -> Result<Value, EvalError> {
    let overflow = || EvalError::type_error("integer overflow", position);
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => match op {
            BinaryOperator::Add => a.checked_add(*b).map(Value::Int).ok_or_else(overflow),
            BinaryOperator::Sub => a.checked_sub(*b).map(Value::Int).ok_or_else(overflow),
            BinaryOperator::Mul => a.checked_mul(*b).map(Value::Int).ok_or_else(overflow),
            BinaryOperator::Div if *b == 0 => Err(EvalError::DivisionByZero { position }),
            BinaryOperator::Div if a.checked_rem(*b) == Some(0) => {
                a.checked_div(*b).map(Value::Int).ok_or_else(overflow)
            }
            BinaryOperator::Div => Ok(Value::Float(*a as f64 / *b as f64)),
            BinaryOperator::Rem if *b == 0 => Err(EvalError::DivisionByZero { position }),
            _ => a.checked_rem(*b).map(Value::Int).ok_or_else(overflow),
        },
        _ => {
            let (Some(a), Some(b)) = (as_float(left), as_float(right)) else {
                return Err(EvalError::type_error(
                    format!(
                        "unsupported operands for `{}`: {} and {}",
                        op,
                        left.type_name(),
                        right.type_name()
                    ),
                    position,
                ));
            };
            match op {
                BinaryOperator::Add => Ok(Value::Float(a + b)),
                BinaryOperator::Sub => Ok(Value::Float(a - b)),
                BinaryOperator::Mul => Ok(Value::Float(a * b)),
                BinaryOperator::Div | BinaryOperator::Rem if b == 0.0 => {
                    Err(EvalError::DivisionByZero { position })
                }
                BinaryOperator::Div => Ok(Value::Float(a / b)),
                _ => Ok(Value::Float(a % b)),
            }
        }
    }
}
