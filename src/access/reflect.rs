//! Reflected-structural accessors built from registered host shapes.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::access::{AccessError, MemberAccessor, TypeKey};
use crate::value::host::short_type_name;
use crate::value::Value;

/// Maps a host member's native identifier to the name templates use.
pub trait NameTransform {
    /// Template-visible name for `native`.
    fn transform(&self, native: &str) -> String;
}

/// Converts camelCase, PascalCase and kebab-case identifiers to snake_case.
///
/// ```
/// use templet::{NameTransform, SnakeCase};
///
/// assert_eq!(SnakeCase.transform("firstName"), "first_name");
/// assert_eq!(SnakeCase.transform("HTTPCode"), "http_code");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct SnakeCase;

impl NameTransform for SnakeCase {
    fn transform(&self, native: &str) -> String {
        static ACRONYM: OnceLock<Regex> = OnceLock::new();
        static BOUNDARY: OnceLock<Regex> = OnceLock::new();
        static SEPARATOR: OnceLock<Regex> = OnceLock::new();

        let acronym =
            ACRONYM.get_or_init(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("static regex"));
        let boundary =
            BOUNDARY.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"));
        let separator = SEPARATOR.get_or_init(|| Regex::new(r"[-\s]+").expect("static regex"));

        let name = acronym.replace_all(native, "${1}_${2}");
        let name = boundary.replace_all(&name, "${1}_${2}");
        let name = separator.replace_all(&name, "_");
        name.to_lowercase()
    }
}

/// Uses native identifiers unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl NameTransform for Identity {
    fn transform(&self, native: &str) -> String {
        native.to_owned()
    }
}

pub(crate) struct FnTransform<F>(pub(crate) F);

impl<F: Fn(&str) -> String> NameTransform for FnTransform<F> {
    fn transform(&self, native: &str) -> String {
        (self.0)(native)
    }
}

type Getter = Rc<dyn Fn(&Value) -> Value>;
type Setter = Rc<dyn Fn(&Value, Value) -> Result<(), AccessError>>;

#[derive(Clone)]
struct ShapeMember {
    native: String,
    get: Getter,
    set: Option<Setter>,
}

/// Type-erased member table for one concrete type.
#[derive(Clone)]
pub(crate) struct ErasedShape {
    members: Vec<ShapeMember>,
}

/// Explicit registration of a host type's members.
///
/// Rust has no runtime reflection, so host structs opt in by declaring their
/// members ahead of time. Names are given in their native spelling; the
/// context's [`NameTransform`] decides what templates see.
///
/// # Examples
///
/// ```
/// use templet::{ContextBuilder, HostShape, Value};
///
/// struct User {
///     first_name: String,
///     age: i64,
/// }
///
/// let shape = HostShape::<User>::new()
///     .property(
///         "firstName",
///         |u| Value::from(u.first_name.as_str()),
///         |u, v| u.first_name = v.to_string(),
///     )
///     .getter("age", |u| Value::Int(u.age));
///
/// let ctx = ContextBuilder::new().register(shape).build();
/// # drop(ctx);
/// ```
pub struct HostShape<T> {
    shape: ErasedShape,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Any> HostShape<T> {
    /// Start an empty shape.
    pub fn new() -> Self {
        Self {
            shape: ErasedShape {
                members: Vec::new(),
            },
            _marker: PhantomData,
        }
    }

    /// Declare a read-only member.
    pub fn getter<G>(mut self, native: &str, get: G) -> Self
    where
        G: Fn(&T) -> Value + 'static,
    {
        self.shape.members.push(ShapeMember {
            native: native.to_owned(),
            get: erase_getter(get),
            set: None,
        });
        self
    }

    /// Declare a readable and writable member.
    pub fn property<G, S>(mut self, native: &str, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Value + 'static,
        S: Fn(&mut T, Value) + 'static,
    {
        let set: Setter = Rc::new(move |target: &Value, value: Value| match target {
            Value::Host(host) => host
                .with_mut(|inner: &mut T| set(inner, value))
                .ok_or(AccessError::NoSuchMember),
            _ => Err(AccessError::NoSuchMember),
        });
        self.shape.members.push(ShapeMember {
            native: native.to_owned(),
            get: erase_getter(get),
            set: Some(set),
        });
        self
    }

    /// Type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        short_type_name::<T>()
    }

    pub(crate) fn into_erased(self) -> ErasedShape {
        self.shape
    }
}

impl<T: Any> Default for HostShape<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn erase_getter<T: Any, G>(get: G) -> Getter
where
    G: Fn(&T) -> Value + 'static,
{
    Rc::new(move |target: &Value| match target {
        Value::Host(host) => host
            .with_ref(|inner: &T| get(inner))
            .unwrap_or(Value::Undefined),
        _ => Value::Undefined,
    })
}

/// Registered shapes, keyed by concrete type.
#[derive(Clone, Default)]
pub(crate) struct ShapeRegistry {
    shapes: FxHashMap<TypeKey, ErasedShape>,
}

impl ShapeRegistry {
    /// Registry pre-populated with the `length` member of lists and arrays.
    pub(crate) fn with_builtin_shapes() -> Self {
        let mut registry = Self::default();
        registry.shapes.insert(
            TypeKey::List,
            ErasedShape {
                members: vec![length_member(|v| match v {
                    Value::List(items) => Some(items.borrow().len()),
                    _ => None,
                })],
            },
        );
        registry.shapes.insert(
            TypeKey::Array,
            ErasedShape {
                members: vec![length_member(|v| match v {
                    Value::Array(items) => Some(items.borrow().len()),
                    _ => None,
                })],
            },
        );
        registry
    }

    pub(crate) fn insert<T: Any>(&mut self, shape: HostShape<T>) {
        self.shapes.insert(
            TypeKey::Host(std::any::TypeId::of::<T>()),
            shape.into_erased(),
        );
    }

    pub(crate) fn get(&self, key: &TypeKey) -> Option<&ErasedShape> {
        self.shapes.get(key)
    }
}

fn length_member(len: fn(&Value) -> Option<usize>) -> ShapeMember {
    ShapeMember {
        native: "length".to_owned(),
        get: Rc::new(move |target: &Value| {
            len(target).map_or(Value::Undefined, |n| Value::Int(n as i64))
        }),
        set: None,
    }
}

struct ReflectedMember {
    get: Getter,
    set: Option<Setter>,
}

/// Accessor built once per concrete type from its registered shape.
///
/// Members without a setter are read-only. Types with no registered shape get
/// an accessor with no members.
pub struct ReflectedAccessor {
    type_name: &'static str,
    members: FxHashMap<String, ReflectedMember>,
}

impl ReflectedAccessor {
    pub(crate) fn build(
        type_name: &'static str,
        shape: Option<&ErasedShape>,
        transform: &dyn NameTransform,
    ) -> Self {
        let mut members = FxHashMap::default();
        for member in shape.map(|s| s.members.as_slice()).unwrap_or_default() {
            members
                .entry(transform.transform(&member.native))
                .or_insert_with(|| ReflectedMember {
                    get: Rc::clone(&member.get),
                    set: member.set.clone(),
                });
        }
        Self { type_name, members }
    }

    /// Type the accessor was built for.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Template-visible member names, sorted.
    pub fn member_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.members.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the type exposes no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl MemberAccessor for ReflectedAccessor {
    fn get(&self, target: &Value, name: &str) -> Value {
        self.members
            .get(name)
            .map_or(Value::Undefined, |member| (member.get)(target))
    }

    fn set(&self, target: &Value, name: &str, value: Value) -> Result<(), AccessError> {
        let member = self.members.get(name).ok_or(AccessError::NoSuchMember)?;
        match &member.set {
            Some(set) => set(target, value),
            None => Err(AccessError::ReadOnly),
        }
    }
}
