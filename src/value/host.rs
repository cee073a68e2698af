//! Type-erased host structs.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A shared, mutable host value of some concrete Rust type.
///
/// The evaluator never looks inside; member access goes through the
/// reflected accessor built from the [`HostShape`](crate::HostShape)
/// registered for the concrete type.
#[derive(Clone)]
pub struct HostValue {
    type_id: TypeId,
    type_name: &'static str,
    inner: Rc<RefCell<dyn Any>>,
}

impl HostValue {
    /// Wrap a value.
    pub fn new<T: Any>(value: T) -> Self {
        let inner: Rc<RefCell<dyn Any>> = Rc::new(RefCell::new(value));
        Self {
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
            inner,
        }
    }

    /// Concrete type of the wrapped value.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Unqualified type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Run `f` on a shared borrow if the value is a `T`.
    pub fn with_ref<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let inner = self.inner.borrow();
        inner.downcast_ref::<T>().map(f)
    }

    /// Run `f` on a mutable borrow if the value is a `T`.
    pub fn with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut inner = self.inner.borrow_mut();
        inner.downcast_mut::<T>().map(f)
    }

    /// Whether both handles share the same allocation.
    pub fn ptr_eq(&self, other: &HostValue) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i64,
    }

    #[test]
    fn test_downcast_access() {
        let host = HostValue::new(Point { x: 1 });
        assert_eq!(host.type_name(), "Point");
        assert_eq!(host.with_ref(|p: &Point| p.x), Some(1));
        assert_eq!(host.with_ref(|s: &String| s.len()), None);

        host.with_mut(|p: &mut Point| p.x = 5);
        assert_eq!(host.with_ref(|p: &Point| p.x), Some(5));
    }

    #[test]
    fn test_clones_share_state() {
        let a = HostValue::new(Point { x: 1 });
        let b = a.clone();
        b.with_mut(|p: &mut Point| p.x = 9);
        assert!(a.ptr_eq(&b));
        assert_eq!(a.with_ref(|p: &Point| p.x), Some(9));
        assert!(!a.ptr_eq(&HostValue::new(Point { x: 9 })));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<String>(), "String");
        assert_eq!(short_type_name::<i64>(), "i64");
    }
}
