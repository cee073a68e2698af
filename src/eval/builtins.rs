//! The built-in function table installed at the root of the global chain.

use crate::ast::Position;
use crate::context::Context;
use crate::error::EvalError;
use crate::value::{to_integer, to_text, Namespace, Value};

type Builtin = fn(&mut Context, &[Value], Position) -> Result<Value, EvalError>;

const BUILTINS: &[(&str, Builtin)] = &[
    ("len", len),
    ("upper", upper),
    ("lower", lower),
    ("trim", trim),
    ("join", join),
    ("range", range),
    ("keys", keys),
    ("default", default),
    ("str", stringify),
    ("int", integer),
];

/// Define every built-in in `root`, read-only.
pub(crate) fn install(root: &Namespace) {
    for &(name, func) in BUILTINS {
        root.define(name, Value::native(name, func), true);
    }
}

fn arity(name: &str, args: &[Value], max: usize, position: Position) -> Result<(), EvalError> {
    if args.len() > max {
        return Err(EvalError::ArgumentCount {
            name: name.to_owned(),
            expected: max,
            actual: args.len(),
            position,
        });
    }
    Ok(())
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn len(_ctx: &mut Context, args: &[Value], position: Position) -> Result<Value, EvalError> {
    arity("len", args, 1, position)?;
    let n = match &arg(args, 0) {
        Value::Undefined | Value::Null => 0,
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Array(items) => items.borrow().len(),
        Value::Map(entries) => entries.borrow().len(),
        Value::Object(object) => object.keys().len(),
        other => {
            return Err(EvalError::type_error(
                format!("len() is not defined for {}", other.type_name()),
                position,
            ))
        }
    };
    Ok(Value::Int(n as i64))
}

fn map_text(
    name: &str,
    args: &[Value],
    position: Position,
    f: impl FnOnce(&str) -> String,
) -> Result<Value, EvalError> {
    arity(name, args, 1, position)?;
    let text = to_text(&arg(args, 0), position)?;
    Ok(Value::from(f(&text)))
}

fn upper(_ctx: &mut Context, args: &[Value], position: Position) -> Result<Value, EvalError> {
    map_text("upper", args, position, str::to_uppercase)
}

fn lower(_ctx: &mut Context, args: &[Value], position: Position) -> Result<Value, EvalError> {
    map_text("lower", args, position, str::to_lowercase)
}

fn trim(_ctx: &mut Context, args: &[Value], position: Position) -> Result<Value, EvalError> {
    map_text("trim", args, position, |s| s.trim().to_owned())
}

fn join(_ctx: &mut Context, args: &[Value], position: Position) -> Result<Value, EvalError> {
    arity("join", args, 2, position)?;
    let separator = to_text(&arg(args, 1), position)?;
    let items = match &arg(args, 0) {
        Value::Undefined | Value::Null => Vec::new(),
        Value::List(items) => items.borrow().clone(),
        Value::Array(items) => items.borrow().to_vec(),
        other => {
            return Err(EvalError::type_error(
                format!("join() expects a list, found {}", other.type_name()),
                position,
            ))
        }
    };
    let parts = items
        .iter()
        .map(|item| to_text(item, position))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::from(parts.join(&separator)))
}

/// `range(end)`, `range(start, end)` or `range(start, end, step)`. The result
/// may not hold more items than the loop-iteration ceiling allows.
fn range(ctx: &mut Context, args: &[Value], position: Position) -> Result<Value, EvalError> {
    arity("range", args, 3, position)?;
    let (start, end) = match args.len() {
        0 => {
            return Err(EvalError::type_error(
                "range() expects at least one argument",
                position,
            ))
        }
        1 => (0, to_integer(&args[0], position)?),
        _ => (
            to_integer(&args[0], position)?,
            to_integer(&args[1], position)?,
        ),
    };
    let step = match args.get(2) {
        Some(step) => to_integer(step, position)?,
        None => 1,
    };
    if step == 0 {
        return Err(EvalError::type_error("range() step cannot be zero", position));
    }

    let span = if step > 0 {
        i128::from(end) - i128::from(start)
    } else {
        i128::from(start) - i128::from(end)
    };
    let count = if span <= 0 {
        0
    } else {
        (span - 1) / i128::from(step).abs() + 1
    };
    let limit = ctx.max_loop_iterations();
    if count > i128::from(limit) {
        return Err(EvalError::LoopLimit { limit, position });
    }

    let mut items = Vec::with_capacity(count as usize);
    let mut current = i128::from(start);
    for _ in 0..count {
        items.push(Value::Int(current as i64));
        current += i128::from(step);
    }
    Ok(Value::list(items))
}

fn keys(_ctx: &mut Context, args: &[Value], position: Position) -> Result<Value, EvalError> {
    arity("keys", args, 1, position)?;
    match &arg(args, 0) {
        Value::Undefined | Value::Null => Ok(Value::list(Vec::new())),
        Value::Map(entries) => Ok(Value::list(
            entries.borrow().keys().map(|k| Value::from(k.as_str())),
        )),
        Value::Object(object) => Ok(Value::list(object.keys().into_iter().map(Value::from))),
        other => Err(EvalError::type_error(
            format!("keys() expects a map, found {}", other.type_name()),
            position,
        )),
    }
}

fn default(_ctx: &mut Context, args: &[Value], position: Position) -> Result<Value, EvalError> {
    arity("default", args, 2, position)?;
    let value = arg(args, 0);
    Ok(if value.is_absent() { arg(args, 1) } else { value })
}

fn stringify(_ctx: &mut Context, args: &[Value], position: Position) -> Result<Value, EvalError> {
    arity("str", args, 1, position)?;
    Ok(Value::from(to_text(&arg(args, 0), position)?))
}

fn integer(_ctx: &mut Context, args: &[Value], position: Position) -> Result<Value, EvalError> {
    arity("int", args, 1, position)?;
    Ok(Value::Int(to_integer(&arg(args, 0), position)?))
}
