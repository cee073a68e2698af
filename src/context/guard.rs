//! Scoped acquisition of paired context resources.

use std::ops::{Deref, DerefMut};

use tracing::warn;

use crate::ast::Position;
use crate::context::Context;
use crate::error::EvalError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Function,
    Loop,
    Global,
    Output,
    Source,
}

/// Holds a pushed scope, buffer or source entry and releases it on every exit
/// path, including early returns through `?`.
///
/// The guard dereferences to the [`Context`], so evaluation continues through
/// it while the scope is open. Call [`ScopeGuard::finish`] to release
/// explicitly and observe the result (the captured text of an output scope,
/// the popped model of a global scope).
///
/// # Examples
///
/// ```
/// use templet::{Context, Value};
///
/// # fn main() -> Result<(), templet::EvalError> {
/// let mut ctx = Context::new();
/// ctx.write_text("A");
/// {
///     let mut scope = ctx.output_scope();
///     scope.write_text("B");
///     assert_eq!(scope.finish()?, Value::from("B"));
/// }
/// assert_eq!(ctx.output(), "A");
/// # Ok(())
/// # }
/// ```
#[must_use = "the scope is released as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    ctx: &'a mut Context,
    release: Release,
    armed: bool,
}

impl<'a> ScopeGuard<'a> {
    fn new(ctx: &'a mut Context, release: Release) -> Self {
        Self {
            ctx,
            release,
            armed: true,
        }
    }

    /// Release now and return what the release produced.
    pub fn finish(mut self) -> Result<Value, EvalError> {
        self.armed = false;
        release(self.ctx, self.release)
    }
}

impl std::fmt::Debug for ScopeGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("release", &self.release)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

fn release(ctx: &mut Context, kind: Release) -> Result<Value, EvalError> {
    match kind {
        Release::Function => ctx.exit_function().map(|()| Value::Undefined),
        Release::Loop => ctx.exit_loop().map(|()| Value::Undefined),
        Release::Global => ctx.pop_global(),
        Release::Output => ctx.pop_output(),
        Release::Source => ctx.pop_source_file().map(Value::from),
    }
}

impl Deref for ScopeGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = release(self.ctx, self.release) {
                warn!(kind = ?self.release, %err, "scope release failed");
            }
        }
    }
}

impl Context {
    /// Enter a function call; exits when the guard is released.
    pub fn function_scope(&mut self, caller: Position) -> Result<ScopeGuard<'_>, EvalError> {
        self.enter_function(caller)?;
        Ok(ScopeGuard::new(self, Release::Function))
    }

    /// Enter a loop; exits when the guard is released.
    pub fn loop_scope(&mut self, position: Position) -> ScopeGuard<'_> {
        self.enter_loop(position);
        ScopeGuard::new(self, Release::Loop)
    }

    /// Push a global model; pops it when the guard is released.
    pub fn global_scope(&mut self, model: Value) -> Result<ScopeGuard<'_>, EvalError> {
        self.push_global(model)?;
        Ok(ScopeGuard::new(self, Release::Global))
    }

    /// Open a nested output buffer; pops it when the guard is released.
    pub fn output_scope(&mut self) -> ScopeGuard<'_> {
        self.push_output();
        ScopeGuard::new(self, Release::Output)
    }

    /// Push a source file entry; pops it when the guard is released.
    pub fn source_scope(&mut self, name: &str) -> Result<ScopeGuard<'_>, EvalError> {
        self.push_source_file(name)?;
        Ok(ScopeGuard::new(self, Release::Source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::VarRef;

    fn failing(ctx: &mut Context) -> Result<(), EvalError> {
        let mut scope = ctx.function_scope(Position::default())?;
        let mut inner = scope.loop_scope(Position::default());
        inner.output_scope().write_text("lost");
        Err(EvalError::InvalidUsage("boom"))
    }

    #[test]
    fn test_guards_release_on_error() {
        let mut ctx = Context::new();
        assert!(failing(&mut ctx).is_err());
        assert_eq!(ctx.recursion_depth(), 0);
        assert_eq!(ctx.loop_depth(), 0);
        assert_eq!(ctx.output_depth(), 1);
        assert_eq!(ctx.output(), "");
    }

    #[test]
    fn test_global_scope_finish_returns_model() {
        let mut ctx = Context::new();
        let model = Value::map([("x", Value::Int(1))]);
        let mut scope = ctx.global_scope(model.clone()).unwrap();
        assert_eq!(
            scope.read_variable(&VarRef::global("x")).unwrap(),
            Value::Int(1)
        );
        assert_eq!(scope.finish().unwrap(), model);
        assert_eq!(ctx.global_depth(), 1);
    }

    #[test]
    fn test_source_scope() {
        let mut ctx = Context::new();
        {
            let scope = ctx.source_scope("a.html").unwrap();
            assert_eq!(scope.current_source_file(), Some("a.html"));
        }
        assert_eq!(ctx.current_source_file(), None);
    }

    #[test]
    fn test_recursion_failure_leaves_depth_unchanged() {
        let mut ctx = Context::builder().max_recursion_depth(1).build();
        let outer = ctx.function_scope(Position::new(1, 1)).unwrap();
        drop(outer);
        let mut outer = ctx.function_scope(Position::new(1, 1)).unwrap();
        let err = outer.function_scope(Position::new(2, 3)).unwrap_err();
        assert!(matches!(
            err,
            EvalError::RecursionLimit {
                limit: 1,
                position
            } if position == Position::new(2, 3)
        ));
        assert_eq!(outer.recursion_depth(), 1);
        drop(outer);
        assert_eq!(ctx.recursion_depth(), 0);
    }
}
