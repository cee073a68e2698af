//! Static scope resolution.
//!
//! Every variable reference leaves the parser tagged with the frame chain it
//! resolves in:
//!
//! - names bound by an enclosing `for` (and the `loop` helper) resolve in the
//!   loop frame;
//! - inside a function body, parameters and every name the body assigns with a
//!   bare `set` or `capture` resolve in the local frame, wherever the
//!   reference appears in the body;
//! - everything else resolves on the global chain, including bare assignments
//!   at the template top level.
//!
//! Loop bindings do not cross function boundaries, since a call runs with
//! fresh frames.

use std::mem;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::error_at;
use crate::ast::*;
use crate::error::ParseError;

pub(super) fn resolve(body: &mut Block) -> Result<(), ParseError> {
    Resolver::default().block(body)
}

#[derive(Default)]
struct Scope {
    locals: FxHashSet<String>,
    /// One entry per enclosing loop; `for` loops carry their variable.
    loops: Vec<Option<String>>,
}

#[derive(Default)]
struct Resolver {
    scope: Scope,
}

impl Resolver {
    fn lookup(&self, name: &str) -> ScopeKind {
        let mut bound = self.scope.loops.iter().flatten();
        let in_for = self.scope.loops.iter().any(Option::is_some);
        if bound.any(|var| var == name) || (name == "loop" && in_for) {
            ScopeKind::Loop
        } else if self.scope.locals.contains(name) {
            ScopeKind::Local
        } else {
            ScopeKind::Global
        }
    }

    fn block(&mut self, block: &mut Block) -> Result<(), ParseError> {
        block.iter_mut().try_for_each(|stmt| self.statement(stmt))
    }

    fn statement(&mut self, stmt: &mut Statement) -> Result<(), ParseError> {
        match stmt {
            Statement::Text(_) => {}
            Statement::Output(expr) => self.expr(expr),
            Statement::Set(set) => {
                self.expr(&mut set.value);
                self.expr(&mut set.target);
            }
            Statement::Global(global) => self.expr(&mut global.value),
            Statement::If(stmt) => {
                for (condition, body) in &mut stmt.branches {
                    self.expr(condition);
                    self.block(body)?;
                }
                if let Some(otherwise) = &mut stmt.otherwise {
                    self.block(otherwise)?;
                }
            }
            Statement::For(stmt) => {
                self.expr(&mut stmt.iterable);
                self.scope.loops.push(Some(stmt.variable.name.clone()));
                self.block(&mut stmt.body)?;
                self.scope.loops.pop();
                if let Some(otherwise) = &mut stmt.otherwise {
                    self.block(otherwise)?;
                }
            }
            Statement::While(stmt) => {
                self.expr(&mut stmt.condition);
                self.scope.loops.push(None);
                self.block(&mut stmt.body)?;
                self.scope.loops.pop();
            }
            Statement::Function(def) => {
                let def = Arc::make_mut(def);
                let mut locals: FxHashSet<String> = def.params.iter().cloned().collect();
                assigned_names(&def.body, &mut locals);
                let inner = Scope {
                    locals,
                    loops: Vec::new(),
                };
                let outer = mem::replace(&mut self.scope, inner);
                let result = self.block(&mut def.body);
                self.scope = outer;
                result?;
            }
            Statement::Return(value, _) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Statement::Break(position) => self.inside_loop("break", *position)?,
            Statement::Continue(position) => self.inside_loop("continue", *position)?,
            Statement::Capture(stmt) => {
                self.block(&mut stmt.body)?;
                self.expr(&mut stmt.target);
            }
            Statement::Include(stmt) => {
                self.expr(&mut stmt.path);
                if let Some(model) = &mut stmt.model {
                    self.expr(model);
                }
            }
        }
        Ok(())
    }

    fn inside_loop(&self, keyword: &str, position: Position) -> Result<(), ParseError> {
        if self.scope.loops.is_empty() {
            return Err(error_at(
                position,
                format!("`{}` outside of a loop", keyword),
            ));
        }
        Ok(())
    }

    fn expr(&self, expr: &mut Expression) {
        match expr {
            Expression::Literal(..) => {}
            Expression::Variable(var) => var.scope = self.lookup(&var.name),
            Expression::Member { target, .. } => self.expr(target),
            Expression::Index { target, index, .. } => {
                self.expr(target);
                self.expr(index);
            }
            Expression::Call { callee, args, .. } => {
                self.expr(callee);
                args.iter_mut().for_each(|arg| self.expr(arg));
            }
            Expression::List(items, _) => items.iter_mut().for_each(|item| self.expr(item)),
            Expression::Map(entries, _) => {
                entries.iter_mut().for_each(|(_, value)| self.expr(value))
            }
            Expression::Unary { operand, .. } => self.expr(operand),
            Expression::Binary { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
        }
    }
}

/// Collect the bare names a function body assigns, skipping nested function
/// definitions, which get their own frame.
fn assigned_names(block: &Block, names: &mut FxHashSet<String>) {
    for stmt in block {
        match stmt {
            Statement::Set(SetStmt {
                target: Expression::Variable(var),
                ..
            })
            | Statement::Capture(CaptureStmt {
                target: Expression::Variable(var),
                ..
            }) => {
                names.insert(var.name.clone());
            }
            _ => {}
        }
        match stmt {
            Statement::If(stmt) => {
                for (_, body) in &stmt.branches {
                    assigned_names(body, names);
                }
                if let Some(otherwise) = &stmt.otherwise {
                    assigned_names(otherwise, names);
                }
            }
            Statement::For(stmt) => {
                assigned_names(&stmt.body, names);
                if let Some(otherwise) = &stmt.otherwise {
                    assigned_names(otherwise, names);
                }
            }
            Statement::While(stmt) => assigned_names(&stmt.body, names),
            Statement::Capture(stmt) => assigned_names(&stmt.body, names),
            _ => {}
        }
    }
}
