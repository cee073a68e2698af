//! Runtime values.
//!
//! Every evaluated value is a [`Value`]: a tagged variant that separates the
//! callable case ([`Value::Function`]) from the data cases, and the three host
//! data shapes the evaluator must unify (capability objects, maps, registered
//! host structs) from the built-in collections.

mod convert;
mod function;
pub(crate) mod host;
mod object;

pub use convert::{to_integer, to_text};
pub use function::{Function, NativeFn};
pub use host::HostValue;
pub use object::{Namespace, ScriptObject};

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Position;
use crate::context::Context;
use crate::error::EvalError;

/// A runtime value.
#[derive(Clone, Default)]
pub enum Value {
    /// Missing-sentinel: the result of reading something that does not exist.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    String(Rc<str>),
    /// Growable sequence.
    List(Rc<RefCell<Vec<Value>>>),
    /// Fixed-size sequence.
    Array(Rc<RefCell<Box<[Value]>>>),
    /// String-keyed map, iterated in key order.
    Map(Rc<RefCell<BTreeMap<String, Value>>>),
    /// Capability object with its own get/set and read-only tracking.
    Object(Rc<dyn ScriptObject>),
    /// Registered host struct, accessed through a reflected accessor.
    Host(HostValue),
    /// Invocable function.
    Function(Function),
}

impl Value {
    /// Build a growable list.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    /// Build a fixed-size array.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        let items: Vec<Value> = items.into_iter().collect();
        Value::Array(Rc::new(RefCell::new(items.into_boxed_slice())))
    }

    /// Build a map from key/value pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    /// Wrap a capability object.
    pub fn object(object: impl ScriptObject + 'static) -> Self {
        Value::Object(Rc::new(object))
    }

    /// Wrap a host struct. Its members are visible once a
    /// [`HostShape`](crate::HostShape) for `T` is registered.
    pub fn host<T: std::any::Any>(value: T) -> Self {
        Value::Host(HostValue::new(value))
    }

    /// Wrap a native function.
    pub fn native<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut Context, &[Value], Position) -> Result<Value, EvalError> + 'static,
    {
        Value::Function(Function::native(name, func))
    }

    /// Name of the runtime type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Object(object) => object.type_name(),
            Value::Host(host) => host.type_name(),
            Value::Function(_) => "function",
        }
    }

    /// True for the missing-sentinel and for null.
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// True for text and scalars, which have no members.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_)
        )
    }

    /// Truthiness used by conditions.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Array(items) => !items.borrow().is_empty(),
            Value::Map(entries) => !entries.borrow().is_empty(),
            Value::Object(_) | Value::Host(_) | Value::Function(_) => true,
        }
    }

    /// The function, if this value is invocable.
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(func) => Some(func),
            _ => None,
        }
    }

    /// Borrow the text, if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(&**s),
            _ => None,
        }
    }
}

/// Deepest collection nesting that text conversion and comparison follow.
pub(crate) const MAX_NESTING: usize = 64;

impl Value {
    /// Why this value cannot be walked structurally: it contains itself or
    /// nests deeper than [`MAX_NESTING`].
    pub(crate) fn nesting_problem(&self) -> Option<&'static str> {
        walk_nesting(self, &mut Vec::new()).err()
    }

    fn container_ptr(&self) -> Option<*const ()> {
        match self {
            Value::List(items) => Some(Rc::as_ptr(items) as *const ()),
            Value::Array(items) => Some(Rc::as_ptr(items) as *const ()),
            Value::Map(entries) => Some(Rc::as_ptr(entries) as *const ()),
            _ => None,
        }
    }

    fn eq_at(&self, other: &Self, depth: usize) -> bool {
        if depth > MAX_NESTING {
            return false;
        }
        let items_eq = |a: &[Value], b: &[Value]| {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_at(y, depth + 1))
        };
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || items_eq(&a.borrow(), &b.borrow())
            }
            (Value::Array(a), Value::Array(b)) => {
                Rc::ptr_eq(a, b) || items_eq(&a.borrow(), &b.borrow())
            }
            (Value::Map(a), Value::Map(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                let equal = a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.eq_at(vb, depth + 1));
                equal
            }
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

fn walk_nesting(value: &Value, ancestors: &mut Vec<*const ()>) -> Result<(), &'static str> {
    let Some(ptr) = value.container_ptr() else {
        return Ok(());
    };
    if ancestors.contains(&ptr) {
        return Err("contains itself");
    }
    if ancestors.len() >= MAX_NESTING {
        return Err("is nested too deeply");
    }
    ancestors.push(ptr);
    let result = match value {
        Value::List(items) => items
            .borrow()
            .iter()
            .try_for_each(|item| walk_nesting(item, ancestors)),
        Value::Array(items) => items
            .borrow()
            .iter()
            .try_for_each(|item| walk_nesting(item, ancestors)),
        Value::Map(entries) => entries
            .borrow()
            .values()
            .try_for_each(|item| walk_nesting(item, ancestors)),
        _ => Ok(()),
    };
    ancestors.pop();
    result
}

/// Structural equality. Collections nested past [`MAX_NESTING`] compare
/// unequal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_at(other, 0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Float(n) => write!(f, "Float({:?})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::List(_) | Value::Array(_) | Value::Map(_) if self.nesting_problem().is_some() => {
                write!(f, "{}(..)", self.type_name())
            }
            Value::List(items) => f.debug_tuple("List").field(&*items.borrow()).finish(),
            Value::Array(items) => f.debug_tuple("Array").field(&*items.borrow()).finish(),
            Value::Map(entries) => f.debug_tuple("Map").field(&*entries.borrow()).finish(),
            Value::Object(object) => f.debug_tuple("Object").field(object).finish(),
            Value::Host(host) => f.debug_tuple("Host").field(host).finish(),
            Value::Function(func) => f.debug_tuple("Function").field(func).finish(),
        }
    }
}

/// Collections render their items; a collection met again inside itself, or
/// nested past [`MAX_NESTING`], renders as `[...]`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display(self, f, &mut Vec::new())
    }
}

fn display(value: &Value, f: &mut fmt::Formatter<'_>, ancestors: &mut Vec<*const ()>) -> fmt::Result {
    if let Some(ptr) = value.container_ptr() {
        if ancestors.contains(&ptr) || ancestors.len() >= MAX_NESTING {
            return f.write_str("[...]");
        }
        ancestors.push(ptr);
        let result = display_collection(value, f, ancestors);
        ancestors.pop();
        return result;
    }
    match value {
        Value::Undefined | Value::Null => Ok(()),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Int(n) => write!(f, "{}", n),
        Value::Float(n) => {
            if n.is_finite() && n.fract() == 0.0 {
                write!(f, "{:.1}", n)
            } else {
                write!(f, "{}", n)
            }
        }
        Value::String(s) => f.write_str(s),
        Value::Object(object) => write!(f, "[object {}]", object.type_name()),
        Value::Host(host) => write!(f, "[{}]", host.type_name()),
        Value::Function(func) => write!(f, "[function {}]", func.name()),
        Value::List(_) | Value::Array(_) | Value::Map(_) => Ok(()),
    }
}

fn display_collection(
    value: &Value,
    f: &mut fmt::Formatter<'_>,
    ancestors: &mut Vec<*const ()>,
) -> fmt::Result {
    match value {
        Value::List(items) => display_items(f, items.borrow().iter(), ancestors),
        Value::Array(items) => display_items(f, items.borrow().iter(), ancestors),
        Value::Map(entries) => {
            write!(f, "{{")?;
            for (i, (key, item)) in entries.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: ", key)?;
                display(item, f, ancestors)?;
            }
            write!(f, "}}")
        }
        _ => Ok(()),
    }
}

fn display_items<'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = &'a Value>,
    ancestors: &mut Vec<*const ()>,
) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        display(item, f, ancestors)?;
    }
    write!(f, "]")
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::Undefined.to_string(), "");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::from("hi").to_string(), "hi");
        assert_eq!(Value::Bool(false).to_string(), "false");
    }

    #[test]
    fn test_display_collections() {
        let list = Value::list(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(list.to_string(), "[1, a]");

        let map = Value::map([("b", Value::Int(2)), ("a", Value::Int(1))]);
        assert_eq!(map.to_string(), "{a: 1, b: 2}");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::list(Vec::new()).is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::Float(0.5).is_truthy());
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::Undefined, Value::Null);
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::from("2"));
        assert_eq!(
            Value::list(vec![Value::Int(1)]),
            Value::list(vec![Value::Int(1)])
        );

        let ns = Value::object(Namespace::new());
        assert_eq!(ns, ns.clone());
        assert_ne!(ns, Value::object(Namespace::new()));
    }

    #[test]
    fn test_self_referential_list() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.to_string(), "[1, [...]]");
        assert_eq!(list.nesting_problem(), Some("contains itself"));
        assert_eq!(format!("{:?}", list), "list(..)");

        let other = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &other {
            items.borrow_mut().push(other.clone());
        }
        assert_ne!(list, other);
        assert_eq!(list, list.clone());
    }

    #[test]
    fn test_deep_nesting_is_bounded() {
        let mut value = Value::Int(0);
        for _ in 0..MAX_NESTING + 1 {
            value = Value::list(vec![value]);
        }
        assert_eq!(value.nesting_problem(), Some("is nested too deeply"));
        assert!(value.to_string().contains("[...]"));

        let shallow = Value::list(vec![Value::list(vec![Value::Int(1)])]);
        assert_eq!(shallow.nesting_problem(), None);
    }

    #[test]
    fn test_classification() {
        assert!(Value::Null.is_absent());
        assert!(Value::from("x").is_primitive());
        assert!(!Value::list(Vec::new()).is_primitive());
        assert_eq!(Value::array(vec![Value::Null]).type_name(), "array");
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }
}
