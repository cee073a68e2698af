//! Templet: evaluation engine for an embeddable template scripting language
//!
//! Templet evaluates parsed template trees against host data under hard
//! execution limits, so untrusted templates cannot run away. One [`Context`]
//! owns all mutable state; parsed [`Template`]s are immutable and can be
//! shared between contexts.
//!
//! # Features
//!
//! - **Scoped variables**: a global chain of data models, per-call local
//!   frames and per-loop frames, with read-only flags
//! - **Uniform member access**: capability objects, maps, lists and
//!   registered host structs behind one accessor interface
//! - **Bounded execution**: a loop-iteration budget shared by the whole
//!   context and a recursion-depth ceiling
//! - **Output capture**: nested output buffers for `capture` blocks and
//!   function bodies
//! - **Includes**: pluggable template loaders with a parsed-tree cache
//!
//! # Quick Start
//!
//! ```rust
//! use templet::{Context, MemoryLoader, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = MemoryLoader::new()
//!     .with("page.html", "{% for item in items %}{{ loop.index }}. {{ upper(item) }}\n{% endfor %}");
//!
//! let mut ctx = Context::builder().loader(loader).build();
//! let model = Value::map([("items", Value::list(vec![Value::from("tea"), Value::from("cake")]))]);
//!
//! let text = ctx.render_name("page.html", model)?;
//! assert_eq!(text, "1. TEA\n2. CAKE\n");
//! # Ok(())
//! # }
//! ```
//!
//! # Host Data
//!
//! Host structs become visible to templates once their shape is registered.
//! Member names go through the configured [`NameTransform`]
//! ([`SnakeCase`] by default):
//!
//! ```rust
//! use templet::{Context, HostShape, Value};
//!
//! struct Account {
//!     display_name: String,
//!     balance: i64,
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let shape = HostShape::<Account>::new()
//!     .getter("displayName", |a| Value::from(a.display_name.as_str()))
//!     .property(
//!         "balance",
//!         |a| Value::Int(a.balance),
//!         |a, v| {
//!             if let Value::Int(n) = v {
//!                 a.balance = n;
//!             }
//!         },
//!     );
//!
//! let mut ctx = Context::builder().register(shape).build();
//! let account = Value::host(Account { display_name: "Ada".into(), balance: 3 });
//!
//! let template = templet::parse("inline", "{{ account.display_name }}: {{ account.balance }}")?;
//! let text = ctx.render(&template, Value::map([("account", account)]))?;
//! assert_eq!(text, "Ada: 3");
//! # Ok(())
//! # }
//! ```
//!
//! # Limits
//!
//! ```rust
//! use templet::{Context, EvalError, Value};
//!
//! let mut ctx = Context::builder().max_loop_iterations(10).build();
//! let template = templet::parse("t", "{% while true %}x{% endwhile %}").unwrap();
//! let err = ctx.render(&template, Value::Null).unwrap_err();
//! assert!(matches!(err, EvalError::LoopLimit { limit: 10, .. }));
//! ```

#![warn(missing_docs)]

mod access;
pub mod ast;
mod context;
mod error;
mod eval;
mod loader;
mod value;

#[cfg(feature = "parser")]
mod parser;

// Public API exports
pub use access::{
    AccessError, AccessorResolver, FixedListAccessor, GrowableListAccessor, HostShape, Identity,
    ListAccessor, ListAccessorResolver, MapAccessor, MemberAccessor, NameTransform,
    NullAccessor, ObjectAccessor, OutOfBounds, ReflectedAccessor, SnakeCase, TypeKey,
};
pub use ast::{Expression, Position, ScopeKind, Statement, Template, VarRef};
pub use context::{
    Context, ContextBuilder, Frame, ScopeGuard, DEFAULT_MAX_LOOP_ITERATIONS,
    DEFAULT_MAX_RECURSION_DEPTH,
};
pub use error::{EvalError, ParseError};
pub use loader::{LoadError, ParserOptions, TemplateLoader};
pub use value::{
    to_integer, to_text, Function, HostValue, Namespace, NativeFn, ScriptObject, Value,
};

#[cfg(feature = "parser")]
pub use loader::{FileLoader, MemoryLoader};
#[cfg(feature = "parser")]
pub use parser::{parse, parse_with};
