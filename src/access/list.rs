//! Positional accessors for sequence-shaped values.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::access::TypeKey;
use crate::value::Value;

/// A position outside `0..len`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("index {index} out of bounds for length {len}")]
pub struct OutOfBounds {
    /// Requested position.
    pub index: i64,
    /// Length of the collection at the time of access.
    pub len: usize,
}

/// Bounds-checked get/set by zero-based position.
pub trait ListAccessor {
    /// Number of items in `target`.
    fn len(&self, target: &Value) -> usize;

    /// Item at `index`.
    fn get(&self, target: &Value, index: i64) -> Result<Value, OutOfBounds>;

    /// Replace the item at `index`.
    fn set(&self, target: &Value, index: i64, value: Value) -> Result<(), OutOfBounds>;
}

fn checked(index: i64, len: usize) -> Result<usize, OutOfBounds> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or(OutOfBounds { index, len })
}

/// Accessor for growable sequences ([`Value::List`]).
#[derive(Debug, Default)]
pub struct GrowableListAccessor;

impl ListAccessor for GrowableListAccessor {
    fn len(&self, target: &Value) -> usize {
        match target {
            Value::List(items) => items.borrow().len(),
            _ => 0,
        }
    }

    fn get(&self, target: &Value, index: i64) -> Result<Value, OutOfBounds> {
        let Value::List(items) = target else {
            return Err(OutOfBounds { index, len: 0 });
        };
        let items = items.borrow();
        let i = checked(index, items.len())?;
        Ok(items[i].clone())
    }

    fn set(&self, target: &Value, index: i64, value: Value) -> Result<(), OutOfBounds> {
        let Value::List(items) = target else {
            return Err(OutOfBounds { index, len: 0 });
        };
        let mut items = items.borrow_mut();
        let i = checked(index, items.len())?;
        items[i] = value;
        Ok(())
    }
}

/// Accessor for fixed-size sequences ([`Value::Array`]).
#[derive(Debug, Default)]
pub struct FixedListAccessor;

impl ListAccessor for FixedListAccessor {
    fn len(&self, target: &Value) -> usize {
        match target {
            Value::Array(items) => items.borrow().len(),
            _ => 0,
        }
    }

    fn get(&self, target: &Value, index: i64) -> Result<Value, OutOfBounds> {
        let Value::Array(items) = target else {
            return Err(OutOfBounds { index, len: 0 });
        };
        let items = items.borrow();
        let i = checked(index, items.len())?;
        Ok(items[i].clone())
    }

    fn set(&self, target: &Value, index: i64, value: Value) -> Result<(), OutOfBounds> {
        let Value::Array(items) = target else {
            return Err(OutOfBounds { index, len: 0 });
        };
        let mut items = items.borrow_mut();
        let i = checked(index, items.len())?;
        items[i] = value;
        Ok(())
    }
}

/// Resolves the positional accessor for a target, cached by concrete type.
///
/// Types that are neither fixed-size nor growable sequences have no accessor;
/// the caller reports that as a runtime error.
#[derive(Default)]
pub struct ListAccessorResolver {
    cache: FxHashMap<TypeKey, Rc<dyn ListAccessor>>,
    built: usize,
}

impl ListAccessorResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// The accessor for `target`, or `None` when it is not a sequence.
    pub fn resolve(&mut self, target: &Value) -> Option<Rc<dyn ListAccessor>> {
        let key = TypeKey::of(target);
        if let Some(accessor) = self.cache.get(&key) {
            return Some(Rc::clone(accessor));
        }

        let accessor: Rc<dyn ListAccessor> = match key {
            TypeKey::List => Rc::new(GrowableListAccessor),
            TypeKey::Array => Rc::new(FixedListAccessor),
            _ => return None,
        };
        self.built += 1;
        self.cache.insert(key, Rc::clone(&accessor));
        Some(accessor)
    }

    /// Number of accessors constructed so far.
    pub fn built(&self) -> usize {
        self.built
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growable_get_set() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let accessor = GrowableListAccessor;
        assert_eq!(accessor.len(&list), 2);
        assert_eq!(accessor.get(&list, 1), Ok(Value::Int(2)));
        accessor.set(&list, 0, Value::from("a")).unwrap();
        assert_eq!(accessor.get(&list, 0), Ok(Value::from("a")));
    }

    #[test]
    fn test_bounds_checked() {
        let array = Value::array(vec![Value::Null]);
        let accessor = FixedListAccessor;
        assert_eq!(
            accessor.get(&array, 1),
            Err(OutOfBounds { index: 1, len: 1 })
        );
        assert_eq!(
            accessor.get(&array, -1),
            Err(OutOfBounds { index: -1, len: 1 })
        );
        assert_eq!(
            accessor.set(&array, 5, Value::Int(0)),
            Err(OutOfBounds { index: 5, len: 1 })
        );
    }

    #[test]
    fn test_resolver_caches_per_type() {
        let mut resolver = ListAccessorResolver::new();
        let a = resolver.resolve(&Value::list(Vec::new())).unwrap();
        let b = resolver.resolve(&Value::list(vec![Value::Int(1)])).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(resolver.built(), 1);

        assert!(resolver.resolve(&Value::array(Vec::new())).is_some());
        assert_eq!(resolver.built(), 2);
    }

    #[test]
    fn test_no_accessor_for_non_sequences() {
        let mut resolver = ListAccessorResolver::new();
        assert!(resolver.resolve(&Value::Int(3)).is_none());
        assert!(resolver.resolve(&Value::from("abc")).is_none());
        assert!(resolver.resolve(&Value::map([("a", Value::Null)])).is_none());
        assert_eq!(resolver.built(), 0);
    }
}
