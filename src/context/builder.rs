//! Context builder for configuration.

use std::any::Any;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::access::{
    AccessorResolver, FnTransform, HostShape, ListAccessorResolver, NameTransform, ShapeRegistry,
    SnakeCase,
};
use crate::ast::Position;
use crate::context::output::OutputStack;
use crate::context::scope::Scopes;
use crate::context::source::SourceStack;
use crate::context::Context;
use crate::error::EvalError;
use crate::eval::builtins;
use crate::loader::{ParserOptions, TemplateLoader};
use crate::value::{Namespace, Value};

/// Default ceiling on loop-body executions, shared by every loop in a render.
pub const DEFAULT_MAX_LOOP_ITERATIONS: u64 = 1000;

/// Default ceiling on nested template function calls.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 100;

/// Builder for configuring a [`Context`].
///
/// # Defaults
///
/// - Loop iterations: 1000, shared across the whole render
/// - Recursion depth: 100
/// - Output: enabled
/// - Name transform: [`SnakeCase`]
/// - Loader: none (includes fail until one is set)
///
/// # Examples
///
/// ```
/// use templet::{ContextBuilder, Value};
///
/// let ctx = ContextBuilder::new()
///     .max_loop_iterations(10_000)
///     .max_recursion_depth(32)
///     .builtin("answer", |_ctx, _args, _pos| Ok(Value::Int(42)))
///     .build();
///
/// assert_eq!(ctx.max_loop_iterations(), 10_000);
/// assert_eq!(ctx.max_recursion_depth(), 32);
/// ```
pub struct ContextBuilder {
    max_loop_iterations: u64,
    max_recursion_depth: usize,
    output_enabled: bool,
    loader: Option<Rc<dyn TemplateLoader>>,
    parser_options: ParserOptions,
    name_transform: Rc<dyn NameTransform>,
    shapes: ShapeRegistry,
    builtins: Vec<(String, Value)>,
    metadata: FxHashMap<String, Rc<dyn Any>>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("max_loop_iterations", &self.max_loop_iterations)
            .field("max_recursion_depth", &self.max_recursion_depth)
            .field("output_enabled", &self.output_enabled)
            .field("parser_options", &self.parser_options)
            .field("has_loader", &self.loader.is_some())
            .finish_non_exhaustive()
    }
}

impl ContextBuilder {
    /// Create a builder with default configuration.
    ///
    /// See the [`ContextBuilder`] documentation for default values.
    pub fn new() -> Self {
        Self {
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            output_enabled: true,
            loader: None,
            parser_options: ParserOptions::default(),
            name_transform: Rc::new(SnakeCase),
            shapes: ShapeRegistry::with_builtin_shapes(),
            builtins: Vec::new(),
            metadata: FxHashMap::default(),
        }
    }

    /// Set the loop-iteration ceiling.
    ///
    /// The counter is shared by every loop the context runs and is never
    /// reset, so the ceiling bounds the total work of a render.
    pub fn max_loop_iterations(mut self, limit: u64) -> Self {
        self.max_loop_iterations = limit;
        self
    }

    /// Set the recursion-depth ceiling for template function calls.
    pub fn max_recursion_depth(mut self, limit: usize) -> Self {
        self.max_recursion_depth = limit;
        self
    }

    /// Enable or suppress all output writes.
    pub fn output_enabled(mut self, enabled: bool) -> Self {
        self.output_enabled = enabled;
        self
    }

    /// Set the loader consulted by `include`.
    pub fn loader(mut self, loader: impl TemplateLoader + 'static) -> Self {
        self.loader = Some(Rc::new(loader));
        self
    }

    /// Set the options used when the loader parses an include.
    pub fn parser_options(mut self, options: ParserOptions) -> Self {
        self.parser_options = options;
        self
    }

    /// Set the policy mapping host member identifiers to template names.
    pub fn name_transform(mut self, transform: impl NameTransform + 'static) -> Self {
        self.name_transform = Rc::new(transform);
        self
    }

    /// Set the name policy from a closure.
    pub fn name_transform_fn<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str) -> String + 'static,
    {
        self.name_transform = Rc::new(FnTransform(transform));
        self
    }

    /// Register the members of host type `T`.
    pub fn register<T: Any>(mut self, shape: HostShape<T>) -> Self {
        self.shapes.insert(shape);
        self
    }

    /// Add a native function to the built-in table. Built-ins are read-only.
    pub fn builtin<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&mut Context, &[Value], Position) -> Result<Value, EvalError> + 'static,
    {
        self.builtins.push((name.to_owned(), Value::native(name, func)));
        self
    }

    /// Attach host metadata, readable through [`Context::metadata`].
    pub fn metadata(mut self, key: impl Into<String>, value: impl Any) -> Self {
        self.metadata.insert(key.into(), Rc::new(value));
        self
    }

    /// Build the context.
    pub fn build(self) -> Context {
        let root = Namespace::new();
        builtins::install(&root);
        for (name, value) in self.builtins {
            root.define(&name, value, true);
        }

        let mut output = OutputStack::default();
        output.set_enabled(self.output_enabled);

        Context {
            scopes: Scopes::new(Value::object(root)),
            accessors: AccessorResolver::new(self.shapes, self.name_transform),
            lists: ListAccessorResolver::new(),
            output,
            sources: SourceStack::default(),
            templates: FxHashMap::default(),
            loader: self.loader,
            parser_options: self.parser_options,
            metadata: self.metadata,
            max_loop_iterations: self.max_loop_iterations,
            max_recursion_depth: self.max_recursion_depth,
            suppress_invocation: false,
        }
    }
}
