//! Invocable function values.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::ast::{FunctionStmt, Position};
use crate::context::Context;
use crate::error::EvalError;
use crate::value::Value;

/// Signature of a native (host-implemented) function.
pub type NativeFn = dyn Fn(&mut Context, &[Value], Position) -> Result<Value, EvalError>;

/// A function value.
#[derive(Clone)]
pub enum Function {
    /// Implemented by the host.
    Native {
        /// Name used in diagnostics.
        name: Rc<str>,
        /// Implementation.
        func: Rc<NativeFn>,
    },
    /// Defined by a `function` block in a template.
    Template(Arc<FunctionStmt>),
}

impl Function {
    /// Wrap a native closure.
    pub fn native<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut Context, &[Value], Position) -> Result<Value, EvalError> + 'static,
    {
        Function::Native {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    /// Function name.
    pub fn name(&self) -> &str {
        match self {
            Function::Native { name, .. } => &**name,
            Function::Template(def) => def.name.name.as_str(),
        }
    }

    /// Whether both values refer to the same function.
    pub fn ptr_eq(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Native { func: a, .. }, Function::Native { func: b, .. }) => {
                Rc::ptr_eq(a, b)
            }
            (Function::Template(a), Function::Template(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native { name, .. } => write!(f, "native {}", name),
            Function::Template(def) => write!(f, "{}/{}", def.name.name, def.params.len()),
        }
    }
}
