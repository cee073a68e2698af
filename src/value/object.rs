//! Capability objects: host values with native named get/set.

use std::cell::RefCell;
use std::fmt;

use crate::access::AccessError;
use crate::context::Frame;
use crate::value::Value;

/// A host value that exposes named get/set with intrinsic read-only tracking.
///
/// Capability objects need no registration: the accessor resolver hands them a
/// pass-through accessor that delegates straight to these methods.
///
/// # Examples
///
/// ```
/// use templet::{AccessError, ScriptObject, Value};
///
/// #[derive(Debug)]
/// struct Clock;
///
/// impl ScriptObject for Clock {
///     fn type_name(&self) -> &'static str {
///         "clock"
///     }
///
///     fn get(&self, name: &str) -> Value {
///         match name {
///             "hour" => Value::Int(12),
///             _ => Value::Undefined,
///         }
///     }
///
///     fn set(&self, _name: &str, _value: Value) -> Result<(), AccessError> {
///         Err(AccessError::ReadOnly)
///     }
/// }
/// ```
pub trait ScriptObject: fmt::Debug {
    /// Name used in diagnostics.
    fn type_name(&self) -> &'static str {
        "object"
    }

    /// Read a member; returns [`Value::Undefined`] when absent.
    fn get(&self, name: &str) -> Value;

    /// Write a member.
    fn set(&self, name: &str, value: Value) -> Result<(), AccessError>;

    /// Whether writes to `name` are refused.
    fn is_read_only(&self, _name: &str) -> bool {
        false
    }

    /// Change the read-only flag of `name`. Returns `false` when the object
    /// does not track read-only flags.
    fn set_read_only(&self, _name: &str, _read_only: bool) -> bool {
        false
    }

    /// Member names, used by iteration and the `keys` built-in.
    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A mutable variable namespace backed by a single [`Frame`].
///
/// Used for the built-in root of the global chain and for the per-render
/// template namespace that receives function definitions and `global` writes.
#[derive(Debug, Default)]
pub struct Namespace {
    frame: RefCell<Frame>,
}

impl Namespace {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any previous value and read-only flag.
    pub fn define(&self, name: &str, value: Value, read_only: bool) {
        self.frame.borrow_mut().define(name, value, read_only);
    }

    /// Number of bound names.
    pub fn len(&self) -> usize {
        self.frame.borrow().len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.frame.borrow().is_empty()
    }
}

impl ScriptObject for Namespace {
    fn type_name(&self) -> &'static str {
        "namespace"
    }

    fn get(&self, name: &str) -> Value {
        self.frame
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or(Value::Undefined)
    }

    fn set(&self, name: &str, value: Value) -> Result<(), AccessError> {
        self.frame.borrow_mut().set(name, value)
    }

    fn is_read_only(&self, name: &str) -> bool {
        self.frame.borrow().is_read_only(name)
    }

    fn set_read_only(&self, name: &str, read_only: bool) -> bool {
        self.frame.borrow_mut().set_read_only(name, read_only);
        true
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.frame.borrow().names().map(str::to_owned).collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_get_set() {
        let ns = Namespace::new();
        assert_eq!(ns.get("x"), Value::Undefined);
        ns.set("x", Value::Int(1)).unwrap();
        assert_eq!(ns.get("x"), Value::Int(1));
        assert_eq!(ns.keys(), vec!["x".to_string()]);
    }

    #[test]
    fn test_namespace_read_only() {
        let ns = Namespace::new();
        ns.define("pi", Value::Float(2.5), true);
        assert!(ns.is_read_only("pi"));
        assert_eq!(ns.set("pi", Value::Int(3)), Err(AccessError::ReadOnly));
        assert_eq!(ns.get("pi"), Value::Float(2.5));

        assert!(ns.set_read_only("pi", false));
        ns.set("pi", Value::Int(3)).unwrap();
        assert_eq!(ns.get("pi"), Value::Int(3));
    }
}
