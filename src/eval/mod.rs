//! Expression evaluation and the get-or-set traversal.
//!
//! Reads and writes share one recursive walk over the target expression. The
//! walk descends through member and index nodes in read mode and only the
//! outermost node performs the write, so `a.b[0].c = v` resolves `a`, `a.b`
//! and `a.b[0]` exactly as a read would before setting `c`.

pub(crate) mod builtins;
mod exec;
mod ops;

pub(crate) use exec::Flow;

use crate::access::{AccessError, OutOfBounds};
use crate::ast::{BinaryOperator, Expression, Position};
use crate::context::Context;
use crate::error::EvalError;
use crate::value::{to_integer, to_text, Function, Value};

impl Context {
    /// Evaluate `expr` in read mode. A function produced by the outermost
    /// node is invoked with no arguments and its result returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use templet::{Context, Expression, Value, VarRef};
    ///
    /// # fn main() -> Result<(), templet::EvalError> {
    /// let mut ctx = Context::new();
    /// ctx.push_global(Value::map([("user", Value::map([("age", Value::Int(36))]))]))?;
    ///
    /// let age = Expression::var(VarRef::global("user")).member("age");
    /// assert_eq!(ctx.evaluate(&age)?, Value::Int(36));
    ///
    /// let missing = Expression::var(VarRef::global("user")).member("email");
    /// assert_eq!(ctx.evaluate(&missing)?, Value::Undefined);
    /// # Ok(())
    /// # }
    /// ```
    pub fn evaluate(&mut self, expr: &Expression) -> Result<Value, EvalError> {
        self.with_invocation(false, |ctx| ctx.get_or_set(expr, None, 0))
    }

    /// Evaluate `expr` in read mode, returning a function produced by the
    /// outermost node uninvoked. Functions met on the way to it are still
    /// invoked.
    pub fn evaluate_uninvoked(&mut self, expr: &Expression) -> Result<Value, EvalError> {
        self.with_invocation(true, |ctx| ctx.get_or_set(expr, None, 0))
    }

    /// Write `value` through `target`, which must be a variable, member or
    /// index expression.
    pub fn assign(&mut self, target: &Expression, value: Value) -> Result<(), EvalError> {
        self.with_invocation(false, |ctx| ctx.get_or_set(target, Some(value), 0))
            .map(|_| ())
    }

    /// Call `func` with `args`. Template functions count against the
    /// recursion ceiling; native functions do not.
    pub fn call_function(
        &mut self,
        func: &Function,
        args: &[Value],
        position: Position,
    ) -> Result<Value, EvalError> {
        match func {
            Function::Native { func, .. } => func(self, args, position),
            Function::Template(def) => {
                if args.len() > def.params.len() {
                    return Err(EvalError::ArgumentCount {
                        name: def.name.name.clone(),
                        expected: def.params.len(),
                        actual: args.len(),
                        position,
                    });
                }

                let mut call = self.function_scope(position)?;
                for (i, param) in def.params.iter().enumerate() {
                    call.bind_local(param, args.get(i).cloned().unwrap_or_default())?;
                }
                let mut body = call.output_scope();
                let flow = body.execute_block(&def.body)?;
                let text = body.finish()?;
                call.finish()?;

                match flow {
                    Flow::Return(Some(value)) => Ok(value),
                    _ => Ok(text),
                }
            }
        }
    }

    fn with_invocation<T>(
        &mut self,
        suppress: bool,
        f: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        let saved = std::mem::replace(&mut self.suppress_invocation, suppress);
        let result = f(self);
        self.suppress_invocation = saved;
        result
    }

    /// Resolve `expr`, writing `set` through it when given. `level` counts the
    /// descents from the outermost target.
    fn get_or_set(
        &mut self,
        expr: &Expression,
        set: Option<Value>,
        level: usize,
    ) -> Result<Value, EvalError> {
        let value = match expr {
            Expression::Variable(var) => match set {
                Some(value) => {
                    self.write_variable(var, value)?;
                    return Ok(Value::Undefined);
                }
                None => self.read_variable(var)?,
            },

            Expression::Member {
                target,
                name,
                position,
            } => {
                let object = self.get_or_set(target, None, level + 1)?;
                if object.is_absent() {
                    return Err(EvalError::MemberOfNull {
                        target: target.to_string(),
                        member: name.clone(),
                        position: *position,
                    });
                }
                if object.is_primitive() {
                    return Err(EvalError::MemberOfPrimitive {
                        target: target.to_string(),
                        member: name.clone(),
                        type_name: object.type_name(),
                        position: *position,
                    });
                }
                match self.access_member(&object, name, set, target, *position)? {
                    Some(value) => value,
                    None => return Ok(Value::Undefined),
                }
            }

            Expression::Index {
                target,
                index,
                position,
            } => {
                let object = self.get_or_set(target, None, level + 1)?;
                if object.is_absent() {
                    return Err(EvalError::IndexOfNull {
                        target: target.to_string(),
                        position: *position,
                    });
                }
                let key = self.evaluate(index)?;
                if key.is_absent() {
                    return Err(EvalError::NullIndex {
                        target: target.to_string(),
                        position: *position,
                    });
                }

                let read = if matches!(object, Value::Object(_) | Value::Map(_)) {
                    let name = to_text(&key, index.position())?;
                    self.access_member(&object, &name, set, target, *position)?
                } else {
                    let accessor = self.list_accessor(&object).ok_or_else(|| {
                        EvalError::NoListAccessor {
                            target: target.to_string(),
                            type_name: object.type_name(),
                            position: *position,
                        }
                    })?;
                    let i = to_integer(&key, index.position())?;
                    let out_of_bounds = |err: OutOfBounds| EvalError::IndexOutOfBounds {
                        target: target.to_string(),
                        index: err.index,
                        len: err.len,
                        position: *position,
                    };
                    match set {
                        Some(value) => {
                            accessor.set(&object, i, value).map_err(out_of_bounds)?;
                            None
                        }
                        None => Some(accessor.get(&object, i).map_err(out_of_bounds)?),
                    }
                };
                match read {
                    Some(value) => value,
                    None => return Ok(Value::Undefined),
                }
            }

            other => {
                if set.is_some() {
                    return Err(EvalError::InvalidAssignmentTarget {
                        target: other.to_string(),
                        position: other.position(),
                    });
                }
                self.evaluate_node(other)?
            }
        };

        match value {
            Value::Function(func) if !self.suppress_invocation || level > 0 => {
                self.call_function(&func, &[], expr.position())
            }
            value => Ok(value),
        }
    }

    /// Named get or set through the member accessor. Returns `None` after a
    /// write.
    fn access_member(
        &mut self,
        object: &Value,
        name: &str,
        set: Option<Value>,
        target: &Expression,
        position: Position,
    ) -> Result<Option<Value>, EvalError> {
        let accessor = self.member_accessor(object);
        match set {
            Some(value) => {
                accessor
                    .set(object, name, value)
                    .map_err(|err| match err {
                        AccessError::ReadOnly => EvalError::ReadOnlyMember {
                            target: target.to_string(),
                            member: name.to_owned(),
                            position,
                        },
                        AccessError::NoSuchMember => EvalError::NoSuchMember {
                            target: target.to_string(),
                            member: name.to_owned(),
                            position,
                        },
                    })?;
                Ok(None)
            }
            None => Ok(Some(accessor.get(object, name))),
        }
    }

    /// General evaluation path for every node that is not a variable, member
    /// or index.
    fn evaluate_node(&mut self, expr: &Expression) -> Result<Value, EvalError> {
        match expr {
            Expression::Literal(literal, _) => Ok(literal.to_value()),

            Expression::List(items, _) => {
                let items = items
                    .iter()
                    .map(|item| self.evaluate(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(items))
            }

            Expression::Map(entries, _) => {
                let mut evaluated = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    evaluated.push((key.as_str(), self.evaluate(value)?));
                }
                Ok(Value::map(evaluated))
            }

            Expression::Call {
                callee,
                args,
                position,
            } => {
                let target = self.evaluate_uninvoked(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                match &target {
                    Value::Function(func) => self.call_function(func, &args, *position),
                    other => Err(EvalError::NotCallable {
                        name: callee.to_string(),
                        type_name: other.type_name(),
                        position: *position,
                    }),
                }
            }

            Expression::Unary {
                op,
                operand,
                position,
            } => {
                let value = self.evaluate(operand)?;
                ops::unary(*op, &value, *position)
            }

            Expression::Binary {
                left,
                op: BinaryOperator::And,
                right,
                ..
            } => {
                let left = self.evaluate(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.evaluate(right)
            }

            Expression::Binary {
                left,
                op: BinaryOperator::Or,
                right,
                ..
            } => {
                let left = self.evaluate(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.evaluate(right)
            }

            Expression::Binary {
                left,
                op,
                right,
                position,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                ops::binary(*op, &left, &right, *position)
            }

            Expression::Variable(_) | Expression::Member { .. } | Expression::Index { .. } => {
                self.get_or_set(expr, None, 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Literal, VarRef};
    use crate::value::Namespace;

    fn int(n: i64) -> Expression {
        Expression::literal(Literal::Int(n))
    }

    fn global(name: &str) -> Expression {
        Expression::var(VarRef::global(name))
    }

    fn ctx_with(model: Value) -> Context {
        let mut ctx = Context::new();
        ctx.push_global(model).unwrap();
        ctx
    }

    #[test]
    fn test_missing_variable_reads_undefined() {
        let mut ctx = Context::new();
        assert_eq!(ctx.evaluate(&global("nope")).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_member_of_null_and_primitive() {
        let mut ctx = ctx_with(Value::map([
            ("n", Value::Null),
            ("s", Value::from("text")),
        ]));
        let err = ctx.evaluate(&global("n").member("x")).unwrap_err();
        assert!(matches!(err, EvalError::MemberOfNull { ref target, ref member, .. }
            if target == "n" && member == "x"));

        let err = ctx.evaluate(&global("s").member("len")).unwrap_err();
        assert!(matches!(
            err,
            EvalError::MemberOfPrimitive {
                type_name: "string",
                ..
            }
        ));
    }

    #[test]
    fn test_index_errors() {
        let mut ctx = ctx_with(Value::map([
            ("items", Value::list(vec![Value::Int(1)])),
            ("n", Value::Int(3)),
        ]));
        assert!(matches!(
            ctx.evaluate(&global("missing").index(int(0))),
            Err(EvalError::IndexOfNull { .. })
        ));
        assert!(matches!(
            ctx.evaluate(&global("items").index(global("missing"))),
            Err(EvalError::NullIndex { .. })
        ));
        assert!(matches!(
            ctx.evaluate(&global("n").index(int(0))),
            Err(EvalError::NoListAccessor { type_name: "int", .. })
        ));
        assert!(matches!(
            ctx.evaluate(&global("items").index(int(4))),
            Err(EvalError::IndexOutOfBounds { index: 4, len: 1, .. })
        ));
    }

    #[test]
    fn test_index_coercion() {
        let mut ctx = ctx_with(Value::map([
            ("items", Value::list(vec![Value::from("a"), Value::from("b")])),
            ("m", Value::map([("1", Value::from("one"))])),
        ]));
        let by_string = global("items").index(Expression::literal(Literal::String("1".into())));
        assert_eq!(ctx.evaluate(&by_string).unwrap(), Value::from("b"));

        let by_int_key = global("m").index(int(1));
        assert_eq!(ctx.evaluate(&by_int_key).unwrap(), Value::from("one"));
    }

    #[test]
    fn test_assign_through_compound_target() {
        let user = Value::map([("tags", Value::list(vec![Value::Null]))]);
        let mut ctx = ctx_with(Value::map([("user", user.clone())]));

        let target = global("user").member("tags").index(int(0));
        ctx.assign(&target, Value::from("admin")).unwrap();
        assert_eq!(ctx.evaluate(&target).unwrap(), Value::from("admin"));

        ctx.assign(&global("user").member("name"), Value::from("ada"))
            .unwrap();
        assert_eq!(
            ctx.evaluate(&global("user").member("name")).unwrap(),
            Value::from("ada")
        );
    }

    #[test]
    fn test_invalid_assignment_target() {
        let mut ctx = Context::new();
        let err = ctx.assign(&int(1), Value::Null).unwrap_err();
        assert!(matches!(err, EvalError::InvalidAssignmentTarget { .. }));
    }

    #[test]
    fn test_read_only_member() {
        let ns = Namespace::new();
        ns.define("locked", Value::Int(1), true);
        let mut ctx = ctx_with(Value::map([("obj", Value::object(ns))]));
        let err = ctx
            .assign(&global("obj").member("locked"), Value::Int(2))
            .unwrap_err();
        assert!(matches!(err, EvalError::ReadOnlyMember { .. }));
        assert_eq!(
            ctx.evaluate(&global("obj").member("locked")).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_implicit_invocation() {
        let mut ctx = Context::builder()
            .builtin("make", |_ctx, _args, _pos| {
                Ok(Value::map([("n", Value::Int(5))]))
            })
            .build();

        assert_eq!(
            ctx.evaluate(&global("make").member("n")).unwrap(),
            Value::Int(5)
        );

        let uninvoked = ctx.evaluate_uninvoked(&global("make")).unwrap();
        assert!(uninvoked.as_function().is_some());

        let invoked = ctx.evaluate(&global("make")).unwrap();
        assert_eq!(invoked, Value::map([("n", Value::Int(5))]));
    }

    #[test]
    fn test_suppression_does_not_leak_into_subexpressions() {
        let mut ctx = Context::builder()
            .builtin("one", |_ctx, _args, _pos| Ok(Value::Int(1)))
            .build();
        ctx.push_global(Value::map([("items", Value::list(vec![
            Value::from("a"),
            Value::from("b"),
        ]))]))
        .unwrap();

        let expr = global("items").index(global("one"));
        assert_eq!(ctx.evaluate_uninvoked(&expr).unwrap(), Value::from("b"));
    }

    #[test]
    fn test_call_and_not_callable() {
        let mut ctx = ctx_with(Value::map([("x", Value::Int(1))]));
        let upper = global("upper").call(vec![Expression::literal(Literal::String("hi".into()))]);
        assert_eq!(ctx.evaluate(&upper).unwrap(), Value::from("HI"));

        let err = ctx.evaluate(&global("x").call(Vec::new())).unwrap_err();
        assert!(matches!(err, EvalError::NotCallable { type_name: "int", .. }));
    }

    #[test]
    fn test_short_circuit_operators() {
        let mut ctx = Context::new();
        let or = Expression::Binary {
            left: Box::new(Expression::literal(Literal::Null)),
            op: BinaryOperator::Or,
            right: Box::new(Expression::literal(Literal::String("fallback".into()))),
            position: Position::default(),
        };
        assert_eq!(ctx.evaluate(&or).unwrap(), Value::from("fallback"));

        let and = Expression::Binary {
            left: Box::new(int(0)),
            op: BinaryOperator::And,
            right: Box::new(global("missing").member("boom")),
            position: Position::default(),
        };
        assert_eq!(ctx.evaluate(&and).unwrap(), Value::Int(0));
    }
}
