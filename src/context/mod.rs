//! The evaluation context.
//!
//! A [`Context`] owns every piece of mutable evaluation state: the scope
//! stacks, the accessor caches, the output buffers, the source file stack, the
//! parsed-template cache and the two safety counters. Expression and statement
//! trees stay immutable and can be shared between contexts.
//!
//! # Examples
//!
//! ```
//! use templet::{Context, Value, VarRef};
//!
//! # fn main() -> Result<(), templet::EvalError> {
//! let mut ctx = Context::new();
//! ctx.push_global(Value::map([("name", Value::from("outer"))]))?;
//! ctx.push_global(Value::map([("name", Value::from("inner"))]))?;
//!
//! let name = VarRef::global("name");
//! assert_eq!(ctx.read_variable(&name)?, Value::from("inner"));
//!
//! ctx.pop_global()?;
//! assert_eq!(ctx.read_variable(&name)?, Value::from("outer"));
//! # Ok(())
//! # }
//! ```

mod builder;
mod frame;
mod guard;
mod output;
mod scope;
mod source;

pub use builder::{ContextBuilder, DEFAULT_MAX_LOOP_ITERATIONS, DEFAULT_MAX_RECURSION_DEPTH};
pub use frame::Frame;
pub use guard::ScopeGuard;

use std::any::Any;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::access::{AccessError, AccessorResolver, ListAccessor, ListAccessorResolver, MemberAccessor};
use crate::ast::{Position, ScopeKind, Template, VarRef};
use crate::error::EvalError;
use crate::loader::{LoadError, ParserOptions, TemplateLoader};
use crate::value::{to_text, Value};

use output::OutputStack;
use scope::Scopes;
use source::SourceStack;

/// Mutable evaluation state for one render at a time.
///
/// Created through [`Context::new`] or [`ContextBuilder`]. The built-in
/// function table forms the root of the global chain and is never popped.
pub struct Context {
    scopes: Scopes,
    accessors: AccessorResolver,
    lists: ListAccessorResolver,
    output: OutputStack,
    sources: SourceStack,
    templates: FxHashMap<String, Arc<Template>>,
    loader: Option<Rc<dyn TemplateLoader>>,
    parser_options: ParserOptions,
    metadata: FxHashMap<String, Rc<dyn Any>>,
    max_loop_iterations: u64,
    max_recursion_depth: usize,
    pub(crate) suppress_invocation: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("globals", &self.scopes.global_depth())
            .field("loops", &self.scopes.loop_depth())
            .field("depth", &self.scopes.depth())
            .field("iterations", &self.scopes.iterations())
            .field("output_depth", &self.output.depth())
            .field("source", &self.sources.current())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a context with default configuration.
    pub fn new() -> Self {
        ContextBuilder::new().build()
    }

    /// Start configuring a context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Loop-iteration ceiling shared by every loop run in this context.
    pub fn max_loop_iterations(&self) -> u64 {
        self.max_loop_iterations
    }

    /// Recursion-depth ceiling for template function calls.
    pub fn max_recursion_depth(&self) -> usize {
        self.max_recursion_depth
    }

    /// Loop iterations consumed so far.
    pub fn loop_iterations(&self) -> u64 {
        self.scopes.iterations()
    }

    /// Active template function calls.
    pub fn recursion_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Number of frames on the global chain, the built-in root included.
    pub fn global_depth(&self) -> usize {
        self.scopes.global_depth()
    }

    /// Number of active loops.
    pub fn loop_depth(&self) -> usize {
        self.scopes.loop_depth()
    }

    /// Whether writes reach the output buffers.
    pub fn output_enabled(&self) -> bool {
        self.output.is_enabled()
    }

    /// Enable or suppress all output writes.
    pub fn set_output_enabled(&mut self, enabled: bool) {
        self.output.set_enabled(enabled);
    }

    /// Options handed to the loader when it parses an include.
    pub fn parser_options(&self) -> ParserOptions {
        self.parser_options
    }

    /// Host metadata stored under `key`.
    pub fn metadata(&self, key: &str) -> Option<&Rc<dyn Any>> {
        self.metadata.get(key)
    }

    /// Host metadata stored under `key`, if it is a `T`.
    pub fn metadata_as<T: Any>(&self, key: &str) -> Option<&T> {
        self.metadata.get(key)?.downcast_ref::<T>()
    }

    /// Store host metadata. The context never interprets it.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Any) {
        self.metadata.insert(key.into(), Rc::new(value));
    }

    // ----- global chain -----

    /// Push `model` as the innermost global frame, together with a fresh local
    /// frame so that locals introduced while it is active do not leak out.
    pub fn push_global(&mut self, model: Value) -> Result<(), EvalError> {
        if model.is_absent() {
            return Err(EvalError::InvalidUsage("push_global requires a model"));
        }
        debug!(
            model = model.type_name(),
            depth = self.scopes.global_depth() + 1,
            "push global"
        );
        self.scopes.push_global(model);
        Ok(())
    }

    /// Pop the innermost global frame and its paired local frame, returning
    /// the model.
    pub fn pop_global(&mut self) -> Result<Value, EvalError> {
        let model = self
            .scopes
            .pop_global()
            .ok_or(EvalError::InvalidUsage("pop_global called on the root global frame"))?;
        debug!(depth = self.scopes.global_depth(), "pop global");
        Ok(model)
    }

    // ----- function and loop scopes -----

    /// Enter a function call made at `caller`.
    ///
    /// Fails with [`EvalError::RecursionLimit`] when the call would exceed the
    /// recursion ceiling; the depth is left unchanged in that case.
    pub fn enter_function(&mut self, caller: Position) -> Result<(), EvalError> {
        let depth = self.scopes.deepen();
        if depth > self.max_recursion_depth {
            self.scopes.shallow();
            warn!(limit = self.max_recursion_depth, %caller, "recursion limit exceeded");
            return Err(EvalError::RecursionLimit {
                limit: self.max_recursion_depth,
                position: caller,
            });
        }
        self.scopes.push_local();
        trace!(depth, "enter function");
        Ok(())
    }

    /// Leave the innermost function call.
    pub fn exit_function(&mut self) -> Result<(), EvalError> {
        if self.scopes.depth() == 0 || !self.scopes.pop_local() {
            return Err(EvalError::InvalidUsage(
                "exit_function called without a matching enter_function",
            ));
        }
        self.scopes.shallow();
        trace!(depth = self.scopes.depth(), "exit function");
        Ok(())
    }

    /// Enter a loop whose tag is at `position`.
    pub fn enter_loop(&mut self, position: Position) {
        self.scopes.push_loop(position);
        trace!(depth = self.scopes.loop_depth(), %position, "enter loop");
    }

    /// Leave the innermost loop.
    pub fn exit_loop(&mut self) -> Result<(), EvalError> {
        if !self.scopes.pop_loop() {
            return Err(EvalError::InvalidUsage(
                "exit_loop called without a matching enter_loop",
            ));
        }
        trace!(depth = self.scopes.loop_depth(), "exit loop");
        Ok(())
    }

    /// Count one loop-body execution against the shared budget.
    ///
    /// The budget covers every loop run by this context, not just the current
    /// one, so nested and sequential loops drain the same counter.
    pub fn step_loop(&mut self) -> Result<(), EvalError> {
        let count = self.scopes.count_iteration();
        if count > self.max_loop_iterations {
            let position = self.scopes.loop_position().unwrap_or_default();
            warn!(limit = self.max_loop_iterations, %position, "loop iteration limit exceeded");
            return Err(EvalError::LoopLimit {
                limit: self.max_loop_iterations,
                position,
            });
        }
        Ok(())
    }

    pub(crate) fn inherit_loop_variables(&mut self) {
        self.scopes.inherit_loop_variables();
    }

    /// Bind a read-only variable in the innermost loop frame.
    pub(crate) fn bind_loop_variable(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        let frame = self
            .scopes
            .loop_frame_mut()
            .ok_or(EvalError::InvalidContext("no active loop frame"))?;
        frame.define(name, value, true);
        Ok(())
    }

    /// Bind a variable in the top local frame, replacing any flag.
    pub(crate) fn bind_local(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        let frame = self
            .scopes
            .local_mut()
            .ok_or(EvalError::InvalidContext("no local frame"))?;
        frame.define(name, value, false);
        Ok(())
    }

    // ----- variables -----

    /// Read a variable. A name bound nowhere yields [`Value::Undefined`].
    ///
    /// Global reads search the chain from the innermost frame outward and stop
    /// at the first frame that has the name.
    pub fn read_variable(&mut self, var: &VarRef) -> Result<Value, EvalError> {
        match var.scope {
            ScopeKind::Global => {
                for frame in self.scopes.globals() {
                    let accessor = self.accessors.resolve(&frame.model);
                    let value = accessor.get(&frame.model, &var.name);
                    if !matches!(value, Value::Undefined) {
                        return Ok(value);
                    }
                }
                Ok(Value::Undefined)
            }
            ScopeKind::Local => {
                let frame = self
                    .scopes
                    .local()
                    .ok_or(EvalError::InvalidContext("no local frame"))?;
                Ok(frame.get(&var.name).cloned().unwrap_or_default())
            }
            ScopeKind::Loop => {
                let frame = self.scopes.loop_frame().ok_or_else(|| {
                    EvalError::LoopVariableOutsideLoop {
                        name: var.name.clone(),
                        position: var.position,
                    }
                })?;
                Ok(frame.get(&var.name).cloned().unwrap_or_default())
            }
        }
    }

    /// Write a variable. Global writes target the innermost global frame.
    pub fn write_variable(&mut self, var: &VarRef, value: Value) -> Result<(), EvalError> {
        let read_only = || EvalError::ReadOnlyVariable {
            name: var.name.clone(),
            position: var.position,
        };
        match var.scope {
            ScopeKind::Global => {
                let frame = self
                    .scopes
                    .innermost_global()
                    .ok_or(EvalError::InvalidContext("global chain is empty"))?;
                if frame.read_only.contains(&var.name) {
                    return Err(read_only());
                }
                let model = frame.model.clone();
                let accessor = self.accessors.resolve(&model);
                accessor
                    .set(&model, &var.name, value)
                    .map_err(|err| match err {
                        AccessError::ReadOnly => read_only(),
                        AccessError::NoSuchMember => EvalError::NoSuchMember {
                            target: model.type_name().to_owned(),
                            member: var.name.clone(),
                            position: var.position,
                        },
                    })
            }
            ScopeKind::Local => self
                .scopes
                .local_mut()
                .ok_or(EvalError::InvalidContext("no local frame"))?
                .set(&var.name, value)
                .map_err(|_| read_only()),
            ScopeKind::Loop => self
                .scopes
                .loop_frame_mut()
                .ok_or_else(|| EvalError::LoopVariableOutsideLoop {
                    name: var.name.clone(),
                    position: var.position,
                })?
                .set(&var.name, value)
                .map_err(|_| read_only()),
        }
    }

    /// Change the read-only flag of a variable in the frame writes would
    /// target.
    pub fn set_read_only(&mut self, var: &VarRef, read_only: bool) -> Result<(), EvalError> {
        match var.scope {
            ScopeKind::Global => {
                let frame = self
                    .scopes
                    .innermost_global_mut()
                    .ok_or(EvalError::InvalidContext("global chain is empty"))?;
                if let Value::Object(object) = &frame.model {
                    if object.set_read_only(&var.name, read_only) {
                        return Ok(());
                    }
                }
                if read_only {
                    frame.read_only.insert(var.name.clone());
                } else {
                    frame.read_only.remove(&var.name);
                }
                Ok(())
            }
            ScopeKind::Local => {
                self.scopes
                    .local_mut()
                    .ok_or(EvalError::InvalidContext("no local frame"))?
                    .set_read_only(&var.name, read_only);
                Ok(())
            }
            ScopeKind::Loop => {
                self.scopes
                    .loop_frame_mut()
                    .ok_or_else(|| EvalError::LoopVariableOutsideLoop {
                        name: var.name.clone(),
                        position: var.position,
                    })?
                    .set_read_only(&var.name, read_only);
                Ok(())
            }
        }
    }

    /// Whether writes to a variable would be refused as read-only.
    pub fn is_read_only(&self, var: &VarRef) -> bool {
        match var.scope {
            ScopeKind::Global => self.scopes.innermost_global().is_some_and(|frame| {
                frame.read_only.contains(&var.name)
                    || matches!(&frame.model, Value::Object(object) if object.is_read_only(&var.name))
            }),
            ScopeKind::Local => self
                .scopes
                .local()
                .is_some_and(|frame| frame.is_read_only(&var.name)),
            ScopeKind::Loop => self
                .scopes
                .loop_frame()
                .is_some_and(|frame| frame.is_read_only(&var.name)),
        }
    }

    // ----- output -----

    /// Text collected so far in the top output buffer.
    pub fn output(&self) -> &str {
        self.output.current()
    }

    /// Open a nested output buffer.
    pub fn push_output(&mut self) {
        self.output.push();
    }

    /// Close the top output buffer and return its text.
    pub fn pop_output(&mut self) -> Result<Value, EvalError> {
        self.output
            .pop()
            .map(Value::from)
            .ok_or(EvalError::InvalidUsage("pop_output called on the root buffer"))
    }

    /// Append text to the top buffer.
    pub fn write_text(&mut self, text: &str) {
        self.output.write(text);
    }

    /// Convert `value` to text and append it. Absent values write nothing.
    pub fn write_value(&mut self, value: &Value, position: Position) -> Result<(), EvalError> {
        if value.is_absent() {
            return Ok(());
        }
        let text = to_text(value, position)?;
        self.output.write(&text);
        Ok(())
    }

    /// Take the root buffer's text, leaving it empty.
    pub fn take_output(&mut self) -> String {
        self.output.take_root()
    }

    #[cfg(test)]
    pub(crate) fn output_depth(&self) -> usize {
        self.output.depth()
    }

    // ----- source files -----

    /// Mark `name` as the template now executing.
    pub fn push_source_file(&mut self, name: &str) -> Result<(), EvalError> {
        if name.is_empty() {
            return Err(EvalError::InvalidUsage("push_source_file requires a name"));
        }
        self.sources.push(name);
        Ok(())
    }

    /// Unmark the template that finished executing.
    pub fn pop_source_file(&mut self) -> Result<String, EvalError> {
        self.sources
            .pop()
            .ok_or(EvalError::InvalidUsage("pop_source_file called on an empty stack"))
    }

    /// The template now executing, if any.
    pub fn current_source_file(&self) -> Option<&str> {
        self.sources.current()
    }

    // ----- accessors -----

    /// Member accessor for `target`.
    pub fn member_accessor(&mut self, target: &Value) -> Rc<dyn MemberAccessor> {
        self.accessors.resolve(target)
    }

    /// Positional accessor for `target`, if it is a sequence.
    pub fn list_accessor(&mut self, target: &Value) -> Option<Rc<dyn ListAccessor>> {
        self.lists.resolve(target)
    }

    /// Reflected accessors built so far.
    pub fn reflected_accessors_built(&self) -> usize {
        self.accessors.reflected_built()
    }

    /// List accessors built so far.
    pub fn list_accessors_built(&self) -> usize {
        self.lists.built()
    }

    // ----- templates -----

    /// Resolve `path` relative to the current source file and return the
    /// parsed template, loading it on first use.
    pub fn load_template(&mut self, path: &str, position: Position) -> Result<Arc<Template>, EvalError> {
        let wrap = |source: LoadError| EvalError::Load {
            path: path.to_owned(),
            position,
            source,
        };
        let loader = self.loader.clone().ok_or_else(|| wrap(LoadError::NoLoader))?;
        let resolved = loader
            .resolve(path, self.sources.current())
            .map_err(wrap)?;

        if let Some(template) = self.templates.get(&resolved) {
            debug!(path = %resolved, "template served from cache");
            return Ok(Arc::clone(template));
        }

        let template = Arc::new(loader.load(&resolved, &self.parser_options).map_err(wrap)?);
        debug!(path = %resolved, "template loaded");
        self.templates.insert(resolved, Arc::clone(&template));
        Ok(template)
    }

    /// Put an already parsed template into the cache under its name.
    pub fn cache_template(&mut self, template: Arc<Template>) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Number of cached templates.
    pub fn cached_templates(&self) -> usize {
        self.templates.len()
    }
}
