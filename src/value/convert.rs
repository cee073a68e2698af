//! Text and integer conversions used by output writes and index coercion.

use crate::ast::Position;
use crate::error::EvalError;
use crate::value::Value;

/// Convert a value to the text written to output.
///
/// Absent values become empty text. Functions cannot be converted, and
/// neither can collections that contain themselves or nest too deeply.
pub fn to_text(value: &Value, position: Position) -> Result<String, EvalError> {
    match value {
        Value::Function(func) => Err(EvalError::conversion(
            format!("cannot convert function `{}` to text", func.name()),
            position,
        )),
        Value::String(s) => Ok(s.to_string()),
        Value::List(_) | Value::Array(_) | Value::Map(_) => match value.nesting_problem() {
            Some(problem) => Err(EvalError::conversion(
                format!("cannot convert {} to text: it {}", value.type_name(), problem),
                position,
            )),
            None => Ok(value.to_string()),
        },
        other => Ok(other.to_string()),
    }
}

/// Convert a value to an integer (used for positional indexes).
pub fn to_integer(value: &Value, position: Position) -> Result<i64, EvalError> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Float(n) => float_to_integer(*n, position),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                return Ok(n);
            }
            match trimmed.parse::<f64>() {
                Ok(n) => float_to_integer(n, position),
                Err(_) => Err(EvalError::conversion(
                    format!("cannot convert \"{}\" to an integer", s),
                    position,
                )),
            }
        }
        other => Err(EvalError::conversion(
            format!("cannot convert {} to an integer", other.type_name()),
            position,
        )),
    }
}

fn float_to_integer(n: f64, position: Position) -> Result<i64, EvalError> {
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Ok(n as i64)
    } else {
        Err(EvalError::conversion(
            format!("cannot convert {} to an integer", n),
            position,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_text() {
        let pos = Position::default();
        assert_eq!(to_text(&Value::Int(3), pos).unwrap(), "3");
        assert_eq!(to_text(&Value::Null, pos).unwrap(), "");
        assert_eq!(to_text(&Value::from("abc"), pos).unwrap(), "abc");
    }

    #[test]
    fn test_to_text_rejects_functions() {
        let func = Value::native("noop", |_, _, _| Ok(Value::Null));
        let err = to_text(&func, Position::new(1, 4)).unwrap_err();
        assert!(matches!(err, EvalError::Conversion { .. }));
        assert_eq!(err.position(), Some(Position::new(1, 4)));
    }

    #[test]
    fn test_to_text_rejects_cycles() {
        let map = Value::map([("n", Value::Int(1))]);
        if let Value::Map(entries) = &map {
            entries.borrow_mut().insert("me".into(), map.clone());
        }
        let err = to_text(&map, Position::new(3, 2)).unwrap_err();
        assert!(matches!(err, EvalError::Conversion { ref message, .. } if message.contains("contains itself")));
        assert_eq!(err.position(), Some(Position::new(3, 2)));
    }

    #[test]
    fn test_to_integer() {
        let pos = Position::default();
        assert_eq!(to_integer(&Value::Int(7), pos).unwrap(), 7);
        assert_eq!(to_integer(&Value::Float(2.0), pos).unwrap(), 2);
        assert_eq!(to_integer(&Value::from(" 12 "), pos).unwrap(), 12);
        assert_eq!(to_integer(&Value::from("4.0"), pos).unwrap(), 4);
        assert_eq!(to_integer(&Value::Bool(true), pos).unwrap(), 1);
    }

    #[test]
    fn test_to_integer_failures() {
        let pos = Position::new(2, 1);
        assert!(to_integer(&Value::Float(1.5), pos).is_err());
        assert!(to_integer(&Value::from("abc"), pos).is_err());
        assert!(to_integer(&Value::list(Vec::new()), pos).is_err());
        assert!(to_integer(&Value::Float(f64::NAN), pos).is_err());
    }
}
