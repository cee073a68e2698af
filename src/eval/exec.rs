//! Statement execution and rendering.

use std::sync::Arc;

use tracing::debug;

use crate::ast::{CaptureStmt, ForStmt, IncludeStmt, Position, Statement, Template, WhileStmt};
use crate::context::Context;
use crate::error::EvalError;
use crate::value::{to_text, Function, Namespace, Value};

/// How control leaves a block.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
    Return(Option<Value>),
}

impl Context {
    /// Render `template` with `model` as its data and return the text it
    /// produced.
    ///
    /// The model and a fresh namespace for the template's functions and
    /// `global` writes are pushed as global frames for the duration of the
    /// call and popped afterwards, also on error. An absent model renders
    /// against an empty map.
    ///
    /// # Examples
    ///
    /// ```
    /// use templet::{Context, Expression, Statement, Template, Value, VarRef};
    ///
    /// # fn main() -> Result<(), templet::EvalError> {
    /// let template = Template::new(
    ///     "greeting",
    ///     vec![
    ///         Statement::Text("Hello, ".into()),
    ///         Statement::Output(Expression::var(VarRef::global("name"))),
    ///     ],
    /// );
    ///
    /// let mut ctx = Context::new();
    /// let text = ctx.render(&template, Value::map([("name", Value::from("Ada"))]))?;
    /// assert_eq!(text, "Hello, Ada");
    /// # Ok(())
    /// # }
    /// ```
    pub fn render(&mut self, template: &Template, model: Value) -> Result<String, EvalError> {
        let model = if model.is_absent() {
            Value::map(Vec::<(String, Value)>::new())
        } else {
            model
        };
        let name = if template.name.is_empty() {
            "<inline>"
        } else {
            template.name.as_str()
        };
        debug!(template = name, "render");

        let mut data = self.global_scope(model)?;
        let mut namespace = data.global_scope(Value::object(Namespace::new()))?;
        let mut source = namespace.source_scope(name)?;
        let mut buffer = source.output_scope();
        buffer.execute_block(&template.body)?;
        let text = buffer.finish()?;
        source.finish()?;
        namespace.finish()?;
        data.finish()?;
        Ok(text.to_string())
    }

    /// Load `path` through the configured loader and render it.
    pub fn render_name(&mut self, path: &str, model: Value) -> Result<String, EvalError> {
        let template = self.load_template(path, Position::default())?;
        self.render(&template, model)
    }

    pub(crate) fn execute_block(&mut self, block: &[Statement]) -> Result<Flow, EvalError> {
        for statement in block {
            match self.execute(statement)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn execute(&mut self, statement: &Statement) -> Result<Flow, EvalError> {
        match statement {
            Statement::Text(text) => self.write_text(text),
            Statement::Output(expr) => {
                let value = self.evaluate(expr)?;
                self.write_value(&value, expr.position())?;
            }
            Statement::Set(stmt) => {
                let value = self.evaluate(&stmt.value)?;
                self.assign(&stmt.target, value)?;
            }
            Statement::Global(stmt) => {
                let value = self.evaluate(&stmt.value)?;
                self.write_variable(&stmt.variable, value)?;
            }
            Statement::If(stmt) => {
                for (condition, body) in &stmt.branches {
                    if self.evaluate(condition)?.is_truthy() {
                        return self.execute_block(body);
                    }
                }
                if let Some(otherwise) = &stmt.otherwise {
                    return self.execute_block(otherwise);
                }
            }
            Statement::For(stmt) => return self.execute_for(stmt),
            Statement::While(stmt) => return self.execute_while(stmt),
            Statement::Function(def) => {
                let func = Value::Function(Function::Template(Arc::clone(def)));
                self.write_variable(&def.name, func)?;
            }
            Statement::Return(expr, _) => {
                let value = expr.as_ref().map(|e| self.evaluate(e)).transpose()?;
                return Ok(Flow::Return(value));
            }
            Statement::Break(_) => return Ok(Flow::Break),
            Statement::Continue(_) => return Ok(Flow::Continue),
            Statement::Capture(stmt) => return self.execute_capture(stmt),
            Statement::Include(stmt) => return self.execute_include(stmt),
        }
        Ok(Flow::Normal)
    }

    fn execute_for(&mut self, stmt: &ForStmt) -> Result<Flow, EvalError> {
        let iterable = self.evaluate(&stmt.iterable)?;
        let items = iteration_items(&iterable, stmt.iterable.position())?;
        if items.is_empty() {
            return match &stmt.otherwise {
                Some(otherwise) => self.execute_block(otherwise),
                None => Ok(Flow::Normal),
            };
        }

        let mut scope = self.loop_scope(stmt.position);
        scope.inherit_loop_variables();
        let length = items.len();
        for (index, item) in items.into_iter().enumerate() {
            scope.step_loop()?;
            scope.bind_loop_variable(&stmt.variable.name, item)?;
            scope.bind_loop_variable("loop", loop_info(index, length))?;
            match scope.execute_block(&stmt.body)? {
                Flow::Break => break,
                Flow::Normal | Flow::Continue => {}
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        scope.finish()?;
        Ok(Flow::Normal)
    }

    fn execute_while(&mut self, stmt: &WhileStmt) -> Result<Flow, EvalError> {
        let mut scope = self.loop_scope(stmt.position);
        scope.inherit_loop_variables();
        while scope.evaluate(&stmt.condition)?.is_truthy() {
            scope.step_loop()?;
            match scope.execute_block(&stmt.body)? {
                Flow::Break => break,
                Flow::Normal | Flow::Continue => {}
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        scope.finish()?;
        Ok(Flow::Normal)
    }

    fn execute_capture(&mut self, stmt: &CaptureStmt) -> Result<Flow, EvalError> {
        let mut buffer = self.output_scope();
        let flow = buffer.execute_block(&stmt.body)?;
        let text = buffer.finish()?;
        self.assign(&stmt.target, text)?;
        Ok(flow)
    }

    /// Runs the included template with fresh locals. The include counts as a
    /// call against the recursion ceiling, and a `return` inside it ends only
    /// the include.
    fn execute_include(&mut self, stmt: &IncludeStmt) -> Result<Flow, EvalError> {
        let path = self.evaluate(&stmt.path)?;
        let path = to_text(&path, stmt.path.position())?;
        let template = self.load_template(&path, stmt.position)?;
        let model = match &stmt.model {
            Some(expr) => {
                let model = self.evaluate(expr)?;
                if model.is_absent() {
                    return Err(EvalError::type_error(
                        format!("model for include `{}` is null", path),
                        expr.position(),
                    ));
                }
                Some(model)
            }
            None => None,
        };

        let mut call = self.function_scope(stmt.position)?;
        let mut source = call.source_scope(&template.name)?;
        match model {
            Some(model) => {
                let mut data = source.global_scope(model)?;
                data.execute_block(&template.body)?;
                data.finish()?;
            }
            None => {
                source.execute_block(&template.body)?;
            }
        }
        source.finish()?;
        call.finish()?;
        Ok(Flow::Normal)
    }
}

/// Items visited by `for`: sequence items, map keys in order, or the keys of a
/// capability object. Absent values iterate as empty.
fn iteration_items(value: &Value, position: Position) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::Undefined | Value::Null => Ok(Vec::new()),
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Array(items) => Ok(items.borrow().to_vec()),
        Value::Map(entries) => Ok(entries
            .borrow()
            .keys()
            .map(|key| Value::from(key.as_str()))
            .collect()),
        Value::Object(object) => Ok(object.keys().into_iter().map(Value::from).collect()),
        other => Err(EvalError::type_error(
            format!("cannot iterate over {}", other.type_name()),
            position,
        )),
    }
}

fn loop_info(index: usize, length: usize) -> Value {
    Value::map([
        ("index", Value::Int(index as i64 + 1)),
        ("index0", Value::Int(index as i64)),
        ("first", Value::Bool(index == 0)),
        ("last", Value::Bool(index + 1 == length)),
        ("length", Value::Int(length as i64)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expression, ForStmt, FunctionStmt, Literal, SetStmt, VarRef};

    fn text(s: &str) -> Statement {
        Statement::Text(s.to_owned())
    }

    fn output(expr: Expression) -> Statement {
        Statement::Output(expr)
    }

    fn for_each(name: &str, iterable: Expression, body: Vec<Statement>) -> Statement {
        Statement::For(ForStmt {
            variable: VarRef::loop_var(name),
            iterable,
            body,
            otherwise: None,
            position: Position::new(1, 1),
        })
    }

    #[test]
    fn test_render_pops_everything() {
        let mut ctx = Context::new();
        let template = Template::new("t", vec![text("hi")]);
        assert_eq!(ctx.render(&template, Value::Null).unwrap(), "hi");
        assert_eq!(ctx.global_depth(), 1);
        assert_eq!(ctx.output(), "");
        assert_eq!(ctx.current_source_file(), None);
    }

    #[test]
    fn test_render_pops_on_error() {
        let mut ctx = Context::new();
        let template = Template::new(
            "t",
            vec![
                text("partial"),
                output(Expression::var(VarRef::global("missing")).member("x")),
            ],
        );
        assert!(ctx.render(&template, Value::Null).is_err());
        assert_eq!(ctx.global_depth(), 1);
        assert_eq!(ctx.output(), "");
        assert_eq!(ctx.current_source_file(), None);
    }

    #[test]
    fn test_for_binds_loop_info() {
        let mut ctx = Context::new();
        let items = Expression::List(
            vec![
                Expression::literal(Literal::String("a".into())),
                Expression::literal(Literal::String("b".into())),
            ],
            Position::default(),
        );
        let template = Template::new(
            "t",
            vec![for_each(
                "x",
                items,
                vec![
                    output(Expression::var(VarRef::loop_var("loop")).member("index")),
                    output(Expression::var(VarRef::loop_var("x"))),
                ],
            )],
        );
        assert_eq!(ctx.render(&template, Value::Null).unwrap(), "1a2b");
        assert_eq!(ctx.loop_iterations(), 2);
        assert_eq!(ctx.loop_depth(), 0);
    }

    #[test]
    fn test_loop_variable_is_read_only() {
        let mut ctx = Context::new();
        let template = Template::new(
            "t",
            vec![for_each(
                "x",
                Expression::List(vec![Expression::literal(Literal::Int(1))], Position::default()),
                vec![Statement::Set(SetStmt {
                    target: Expression::var(VarRef::loop_var("x")),
                    value: Expression::literal(Literal::Int(2)),
                })],
            )],
        );
        assert!(matches!(
            ctx.render(&template, Value::Null),
            Err(EvalError::ReadOnlyVariable { .. })
        ));
    }

    #[test]
    fn test_template_function_returns_captured_text() {
        let def = Arc::new(FunctionStmt {
            name: VarRef::global("greet"),
            params: vec!["who".into()],
            body: vec![text("hi "), output(Expression::var(VarRef::local("who")))],
            position: Position::new(1, 1),
        });
        let call = Expression::var(VarRef::global("greet"))
            .call(vec![Expression::literal(Literal::String("bob".into()))]);
        let template = Template::new(
            "t",
            vec![Statement::Function(def), text("["), output(call), text("]")],
        );
        let mut ctx = Context::new();
        assert_eq!(ctx.render(&template, Value::Null).unwrap(), "[hi bob]");
        assert_eq!(ctx.recursion_depth(), 0);
    }

    #[test]
    fn test_capture_assigns_text() {
        let template = Template::new(
            "t",
            vec![
                Statement::Capture(CaptureStmt {
                    target: Expression::var(VarRef::local("block")),
                    body: vec![text("inner")],
                }),
                text("<"),
                output(Expression::var(VarRef::local("block"))),
                text(">"),
            ],
        );
        let mut ctx = Context::new();
        assert_eq!(ctx.render(&template, Value::Null).unwrap(), "<inner>");
    }

    #[test]
    fn test_iteration_items() {
        let map = Value::map([("b", Value::Int(2)), ("a", Value::Int(1))]);
        assert_eq!(
            iteration_items(&map, Position::default()).unwrap(),
            vec![Value::from("a"), Value::from("b")]
        );
        assert!(iteration_items(&Value::Null, Position::default())
            .unwrap()
            .is_empty());
        assert!(iteration_items(&Value::Int(1), Position::default()).is_err());
    }
}
