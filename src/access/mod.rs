//! Member and positional accessors over heterogeneous host values.
//!
//! The evaluator never inspects host data directly. Named access goes through
//! a [`MemberAccessor`] obtained from the [`AccessorResolver`], positional
//! access through a [`ListAccessor`] obtained from the [`ListAccessorResolver`].
//! Both resolvers cache accessors per concrete runtime type for the lifetime of
//! the owning context.

mod list;
mod reflect;

pub use list::{
    FixedListAccessor, GrowableListAccessor, ListAccessor, ListAccessorResolver, OutOfBounds,
};
pub use reflect::{HostShape, Identity, NameTransform, ReflectedAccessor, SnakeCase};

pub(crate) use reflect::{FnTransform, ShapeRegistry};

use std::any::TypeId;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use crate::value::Value;

/// Why a member write was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// The member exists but cannot be written.
    #[error("member is read-only")]
    ReadOnly,
    /// The member does not exist and cannot be created.
    #[error("no such member")]
    NoSuchMember,
}

/// Uniform named get/set over one kind of host value.
pub trait MemberAccessor {
    /// Read `name` from `target`; absent members yield [`Value::Undefined`].
    fn get(&self, target: &Value, name: &str) -> Value;

    /// Write `name` on `target`.
    fn set(&self, target: &Value, name: &str, value: Value) -> Result<(), AccessError>;
}

/// Accessor for absent targets: nothing can be read or written.
#[derive(Debug, Default)]
pub struct NullAccessor;

impl MemberAccessor for NullAccessor {
    fn get(&self, _target: &Value, _name: &str) -> Value {
        Value::Undefined
    }

    fn set(&self, _target: &Value, _name: &str, _value: Value) -> Result<(), AccessError> {
        Err(AccessError::NoSuchMember)
    }
}

/// Pass-through accessor delegating to a [`ScriptObject`](crate::ScriptObject).
#[derive(Debug, Default)]
pub struct ObjectAccessor;

impl MemberAccessor for ObjectAccessor {
    fn get(&self, target: &Value, name: &str) -> Value {
        match target {
            Value::Object(object) => object.get(name),
            _ => Value::Undefined,
        }
    }

    fn set(&self, target: &Value, name: &str, value: Value) -> Result<(), AccessError> {
        match target {
            Value::Object(object) => object.set(name, value),
            _ => Err(AccessError::NoSuchMember),
        }
    }
}

/// Accessor for string-keyed maps; writes insert or replace.
#[derive(Debug, Default)]
pub struct MapAccessor;

impl MemberAccessor for MapAccessor {
    fn get(&self, target: &Value, name: &str) -> Value {
        match target {
            Value::Map(entries) => entries
                .borrow()
                .get(name)
                .cloned()
                .unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    fn set(&self, target: &Value, name: &str, value: Value) -> Result<(), AccessError> {
        match target {
            Value::Map(entries) => {
                entries.borrow_mut().insert(name.to_owned(), value);
                Ok(())
            }
            _ => Err(AccessError::NoSuchMember),
        }
    }
}

/// Key identifying a concrete runtime type for accessor caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// Growable list.
    List,
    /// Fixed-size array.
    Array,
    /// Registered or unregistered host struct.
    Host(TypeId),
    /// Any other built-in value kind, by type name.
    Builtin(&'static str),
}

impl TypeKey {
    /// The cache key for `value`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::List(_) => TypeKey::List,
            Value::Array(_) => TypeKey::Array,
            Value::Host(host) => TypeKey::Host(host.type_id()),
            other => TypeKey::Builtin(other.type_name()),
        }
    }
}

/// Resolves the member accessor for a target value.
///
/// Resolution order: absent target → null accessor; capability object →
/// pass-through accessor; map → map accessor; anything else → reflected
/// accessor, built from the registered shape on first use and cached by
/// concrete type.
pub struct AccessorResolver {
    null: Rc<dyn MemberAccessor>,
    object: Rc<dyn MemberAccessor>,
    map: Rc<dyn MemberAccessor>,
    shapes: ShapeRegistry,
    name_transform: Rc<dyn NameTransform>,
    reflected: FxHashMap<TypeKey, Rc<ReflectedAccessor>>,
    built: usize,
}

impl AccessorResolver {
    pub(crate) fn new(shapes: ShapeRegistry, name_transform: Rc<dyn NameTransform>) -> Self {
        Self {
            null: Rc::new(NullAccessor),
            object: Rc::new(ObjectAccessor),
            map: Rc::new(MapAccessor),
            shapes,
            name_transform,
            reflected: FxHashMap::default(),
            built: 0,
        }
    }

    /// The accessor for `target`.
    pub fn resolve(&mut self, target: &Value) -> Rc<dyn MemberAccessor> {
        match target {
            Value::Undefined | Value::Null => Rc::clone(&self.null),
            Value::Object(_) => Rc::clone(&self.object),
            Value::Map(_) => Rc::clone(&self.map),
            other => self.reflected(other),
        }
    }

    /// Number of reflected accessors constructed so far.
    pub fn reflected_built(&self) -> usize {
        self.built
    }

    fn reflected(&mut self, target: &Value) -> Rc<dyn MemberAccessor> {
        let key = TypeKey::of(target);
        if let Some(accessor) = self.reflected.get(&key) {
            return accessor.clone();
        }

        let accessor = Rc::new(ReflectedAccessor::build(
            target.type_name(),
            self.shapes.get(&key),
            self.name_transform.as_ref(),
        ));
        self.built += 1;
        debug!(
            type_name = target.type_name(),
            members = accessor.len(),
            "built reflected accessor"
        );
        self.reflected.insert(key, Rc::clone(&accessor));
        accessor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Namespace;

    fn resolver() -> AccessorResolver {
        AccessorResolver::new(ShapeRegistry::with_builtin_shapes(), Rc::new(SnakeCase))
    }

    #[test]
    fn test_null_accessor() {
        let mut resolver = resolver();
        let accessor = resolver.resolve(&Value::Null);
        assert_eq!(accessor.get(&Value::Null, "x"), Value::Undefined);
        assert_eq!(
            accessor.set(&Value::Null, "x", Value::Int(1)),
            Err(AccessError::NoSuchMember)
        );
    }

    #[test]
    fn test_map_accessor_reads_and_inserts() {
        let mut resolver = resolver();
        let map = Value::map([("a", Value::Int(1))]);
        let accessor = resolver.resolve(&map);
        assert_eq!(accessor.get(&map, "a"), Value::Int(1));
        assert_eq!(accessor.get(&map, "b"), Value::Undefined);
        accessor.set(&map, "b", Value::Int(2)).unwrap();
        assert_eq!(accessor.get(&map, "b"), Value::Int(2));
    }

    #[test]
    fn test_object_accessor_delegates() {
        let mut resolver = resolver();
        let ns = Namespace::new();
        ns.define("locked", Value::Int(1), true);
        let object = Value::object(ns);
        let accessor = resolver.resolve(&object);
        assert_eq!(accessor.get(&object, "locked"), Value::Int(1));
        assert_eq!(
            accessor.set(&object, "locked", Value::Int(2)),
            Err(AccessError::ReadOnly)
        );
    }

    #[test]
    fn test_singletons_are_shared() {
        let mut resolver = resolver();
        let a = resolver.resolve(&Value::map([("x", Value::Null)]));
        let b = resolver.resolve(&Value::map([("y", Value::Null)]));
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(resolver.reflected_built(), 0);
    }

    #[test]
    fn test_reflected_accessor_cached_per_type() {
        let mut resolver = resolver();
        let first = resolver.resolve(&Value::list(vec![Value::Int(1)]));
        let second = resolver.resolve(&Value::list(Vec::new()));
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(resolver.reflected_built(), 1);

        let array = resolver.resolve(&Value::array(Vec::new()));
        assert!(!Rc::ptr_eq(&first, &array));
        assert_eq!(resolver.reflected_built(), 2);
    }

    #[test]
    fn test_list_length_member() {
        let mut resolver = resolver();
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let accessor = resolver.resolve(&list);
        assert_eq!(accessor.get(&list, "length"), Value::Int(2));
        assert_eq!(
            accessor.set(&list, "length", Value::Int(0)),
            Err(AccessError::ReadOnly)
        );
        assert_eq!(
            accessor.set(&list, "size", Value::Int(0)),
            Err(AccessError::NoSuchMember)
        );
    }
}
