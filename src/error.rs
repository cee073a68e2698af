//! Error types for template evaluation.

use thiserror::Error;

use crate::ast::Position;
use crate::loader::LoadError;

/// Errors raised while evaluating expressions or executing templates.
///
/// Two families share this enum:
///
/// - **Invalid usage** ([`EvalError::InvalidUsage`], [`EvalError::InvalidContext`]):
///   the embedding code broke a push/pop pairing or passed an absent argument.
///   Template content cannot produce these.
/// - **Runtime script errors** (every other variant): caused by template
///   content, always carry the [`Position`] of the responsible node, and are
///   expected to be caught at the render entry point and reported to the user.
///
/// # Examples
///
/// ```
/// use templet::{Context, EvalError, Expression, VarRef};
///
/// let mut ctx = Context::new();
/// let target = Expression::var(VarRef::global("missing")).member("name");
/// match ctx.evaluate(&target) {
///     Err(err @ EvalError::MemberOfNull { .. }) => assert!(err.is_runtime()),
///     other => panic!("unexpected result: {:?}", other),
/// }
/// ```
#[derive(Error, Debug)]
pub enum EvalError {
    /// A hosting-code defect: unmatched push/pop or an absent required argument.
    #[error("invalid usage: {0}")]
    InvalidUsage(&'static str),

    /// The context is in a state that initialization should have prevented.
    #[error("invalid context: {0}")]
    InvalidContext(&'static str),

    /// Assignment to a variable flagged read-only.
    #[error("{position}: cannot assign to read-only variable `{name}`")]
    ReadOnlyVariable {
        /// Variable name.
        name: String,
        /// Position of the assignment.
        position: Position,
    },

    /// Assignment to a member that has no setter or is flagged read-only.
    #[error("{position}: cannot assign to read-only member `{member}` of `{target}`")]
    ReadOnlyMember {
        /// Display form of the target expression.
        target: String,
        /// Member name.
        member: String,
        /// Position of the access.
        position: Position,
    },

    /// Assignment to a member the target does not have.
    #[error("{position}: `{target}` has no member `{member}`")]
    NoSuchMember {
        /// Display form of the target expression.
        target: String,
        /// Member name.
        member: String,
        /// Position of the access.
        position: Position,
    },

    /// Member access on a missing or null value.
    #[error("{position}: cannot access member `{member}` of `{target}` because it is null")]
    MemberOfNull {
        /// Display form of the target expression.
        target: String,
        /// Member name.
        member: String,
        /// Position of the access.
        position: Position,
    },

    /// Member access on text or a scalar.
    #[error("{position}: cannot access member `{member}` of `{target}`: {type_name} values have no members")]
    MemberOfPrimitive {
        /// Display form of the target expression.
        target: String,
        /// Member name.
        member: String,
        /// Runtime type of the target.
        type_name: &'static str,
        /// Position of the access.
        position: Position,
    },

    /// Index access on a missing or null value.
    #[error("{position}: cannot index `{target}` because it is null")]
    IndexOfNull {
        /// Display form of the target expression.
        target: String,
        /// Position of the access.
        position: Position,
    },

    /// The index expression evaluated to null.
    #[error("{position}: index into `{target}` is null")]
    NullIndex {
        /// Display form of the target expression.
        target: String,
        /// Position of the access.
        position: Position,
    },

    /// The target supports neither keyed nor positional access.
    #[error("{position}: `{target}` of type {type_name} cannot be indexed")]
    NoListAccessor {
        /// Display form of the target expression.
        target: String,
        /// Runtime type of the target.
        type_name: &'static str,
        /// Position of the access.
        position: Position,
    },

    /// Positional access outside the collection.
    #[error("{position}: index {index} is out of bounds for `{target}` (length {len})")]
    IndexOutOfBounds {
        /// Display form of the target expression.
        target: String,
        /// Requested index.
        index: i64,
        /// Collection length.
        len: usize,
        /// Position of the access.
        position: Position,
    },

    /// A loop-scoped variable was referenced while no loop is active.
    #[error("{position}: loop variable `{name}` referenced outside of a loop")]
    LoopVariableOutsideLoop {
        /// Variable name.
        name: String,
        /// Position of the reference.
        position: Position,
    },

    /// The shared loop-iteration budget was exhausted.
    #[error("{position}: loop iteration limit of {limit} exceeded")]
    LoopLimit {
        /// Configured ceiling.
        limit: u64,
        /// Position of the innermost active loop.
        position: Position,
    },

    /// The recursion-depth ceiling was exceeded.
    #[error("{position}: recursion depth limit of {limit} exceeded")]
    RecursionLimit {
        /// Configured ceiling.
        limit: usize,
        /// Position of the call that exceeded the ceiling.
        position: Position,
    },

    /// Assignment to an expression that is not a variable, member or index.
    #[error("{position}: `{target}` is not a valid assignment target")]
    InvalidAssignmentTarget {
        /// Display form of the target expression.
        target: String,
        /// Position of the target.
        position: Position,
    },

    /// A value could not be converted to text or to an integer.
    #[error("{position}: {message}")]
    Conversion {
        /// Description of the failed conversion.
        message: String,
        /// Position of the converted expression.
        position: Position,
    },

    /// A call target is not a function.
    #[error("{position}: `{name}` is not callable (found {type_name})")]
    NotCallable {
        /// Display form of the callee.
        name: String,
        /// Runtime type of the callee.
        type_name: &'static str,
        /// Position of the call.
        position: Position,
    },

    /// Too many arguments were passed to a template function.
    #[error("{position}: `{name}` takes at most {expected} arguments, got {actual}")]
    ArgumentCount {
        /// Function name.
        name: String,
        /// Declared parameter count.
        expected: usize,
        /// Number of arguments passed.
        actual: usize,
        /// Position of the call.
        position: Position,
    },

    /// An operator or built-in received operands of the wrong type.
    #[error("{position}: {message}")]
    Type {
        /// Description of the mismatch.
        message: String,
        /// Position of the operation.
        position: Position,
    },

    /// Division or remainder by zero.
    #[error("{position}: division by zero")]
    DivisionByZero {
        /// Position of the operation.
        position: Position,
    },

    /// An included template could not be resolved, read or parsed.
    #[error("{position}: cannot load template `{path}`: {source}")]
    Load {
        /// Path as written in the template.
        path: String,
        /// Position of the include.
        position: Position,
        /// Underlying loader failure.
        #[source]
        source: LoadError,
    },
}

impl EvalError {
    /// Position of the node responsible, for runtime script errors.
    pub fn position(&self) -> Option<Position> {
        match self {
            EvalError::InvalidUsage(_) | EvalError::InvalidContext(_) => None,
            EvalError::ReadOnlyVariable { position, .. }
            | EvalError::ReadOnlyMember { position, .. }
            | EvalError::NoSuchMember { position, .. }
            | EvalError::MemberOfNull { position, .. }
            | EvalError::MemberOfPrimitive { position, .. }
            | EvalError::IndexOfNull { position, .. }
            | EvalError::NullIndex { position, .. }
            | EvalError::NoListAccessor { position, .. }
            | EvalError::IndexOutOfBounds { position, .. }
            | EvalError::LoopVariableOutsideLoop { position, .. }
            | EvalError::LoopLimit { position, .. }
            | EvalError::RecursionLimit { position, .. }
            | EvalError::InvalidAssignmentTarget { position, .. }
            | EvalError::Conversion { position, .. }
            | EvalError::NotCallable { position, .. }
            | EvalError::ArgumentCount { position, .. }
            | EvalError::Type { position, .. }
            | EvalError::DivisionByZero { position }
            | EvalError::Load { position, .. } => Some(*position),
        }
    }

    /// Whether this is a runtime script error rather than a hosting defect.
    pub fn is_runtime(&self) -> bool {
        !matches!(
            self,
            EvalError::InvalidUsage(_) | EvalError::InvalidContext(_)
        )
    }

    pub(crate) fn type_error(message: impl Into<String>, position: Position) -> Self {
        EvalError::Type {
            message: message.into(),
            position,
        }
    }

    pub(crate) fn conversion(message: impl Into<String>, position: Position) -> Self {
        EvalError::Conversion {
            message: message.into(),
            position,
        }
    }
}

/// Error produced when template source cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    /// Line number where the error occurred.
    pub line: usize,
    /// Column number where the error occurred.
    pub column: usize,
    /// Error message.
    pub message: String,
}

impl ParseError {
    /// Create a parse error at a position.
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}
