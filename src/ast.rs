//! Expression and statement trees consumed by the evaluator.
//!
//! Trees are immutable once built and hold no runtime values, so a parsed
//! [`Template`] can be shared between independent [`Context`](crate::Context)
//! instances (including across threads).

use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// A location in template source (1-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// Line number.
    pub line: u32,
    /// Column number.
    pub column: u32,
}

impl Position {
    /// Create a position from a line and column.
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Which frame chain a variable reference resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// The global chain (model roots, innermost first).
    Global,
    /// The frame of the active function call.
    Local,
    /// The frame of the innermost active loop.
    Loop,
}

/// A named variable together with the scope it resolves in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    /// Variable name (case-sensitive).
    pub name: String,
    /// Scope kind.
    pub scope: ScopeKind,
    /// Source position of the reference.
    pub position: Position,
}

impl VarRef {
    /// Create a variable reference.
    pub fn new(name: impl Into<String>, scope: ScopeKind, position: Position) -> Self {
        Self {
            name: name.into(),
            scope,
            position,
        }
    }

    /// Global-scoped reference at the default position.
    pub fn global(name: impl Into<String>) -> Self {
        Self::new(name, ScopeKind::Global, Position::default())
    }

    /// Local-scoped reference at the default position.
    pub fn local(name: impl Into<String>) -> Self {
        Self::new(name, ScopeKind::Local, Position::default())
    }

    /// Loop-scoped reference at the default position.
    pub fn loop_var(name: impl Into<String>) -> Self {
        Self::new(name, ScopeKind::Loop, Position::default())
    }

    /// Replace the position.
    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

/// Constant value appearing in source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Quoted string literal.
    String(String),
}

impl Literal {
    /// Materialize the literal as a runtime value.
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(n) => Value::Float(*n),
            Literal::String(s) => Value::from(s.as_str()),
        }
    }
}

/// An expression node.
///
/// The evaluator special-cases [`Expression::Variable`], [`Expression::Member`]
/// and [`Expression::Index`]; those three are the only valid assignment
/// targets. Every other shape goes through the general evaluation path.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Constant: `42`, `"text"`, `null`
    Literal(Literal, Position),
    /// Variable reference: `name`
    Variable(VarRef),
    /// Member access: `target.name`
    Member {
        /// Object expression.
        target: Box<Expression>,
        /// Member name.
        name: String,
        /// Position of the access.
        position: Position,
    },
    /// Index access: `target[index]`
    Index {
        /// Collection expression.
        target: Box<Expression>,
        /// Index expression.
        index: Box<Expression>,
        /// Position of the access.
        position: Position,
    },
    /// Function call: `callee(args...)`
    Call {
        /// Expression producing the function.
        callee: Box<Expression>,
        /// Argument expressions.
        args: Vec<Expression>,
        /// Position of the call.
        position: Position,
    },
    /// List literal: `[a, b]`
    List(Vec<Expression>, Position),
    /// Map literal: `{key: value}`
    Map(Vec<(String, Expression)>, Position),
    /// Unary operation: `not x`, `-x`
    Unary {
        /// Operator.
        op: UnaryOperator,
        /// Operand.
        operand: Box<Expression>,
        /// Position of the operator.
        position: Position,
    },
    /// Binary operation: `a + b`
    Binary {
        /// Left operand.
        left: Box<Expression>,
        /// Operator.
        op: BinaryOperator,
        /// Right operand.
        right: Box<Expression>,
        /// Position of the operator.
        position: Position,
    },
}

impl Expression {
    /// Source position of this node.
    pub fn position(&self) -> Position {
        match self {
            Expression::Literal(_, position)
            | Expression::List(_, position)
            | Expression::Map(_, position) => *position,
            Expression::Variable(var) => var.position,
            Expression::Member { position, .. }
            | Expression::Index { position, .. }
            | Expression::Call { position, .. }
            | Expression::Unary { position, .. }
            | Expression::Binary { position, .. } => *position,
        }
    }

    /// Shorthand for a literal node.
    pub fn literal(value: Literal) -> Self {
        Expression::Literal(value, Position::default())
    }

    /// Shorthand for a variable node.
    pub fn var(var: VarRef) -> Self {
        Expression::Variable(var)
    }

    /// Shorthand for `self.name`.
    pub fn member(self, name: impl Into<String>) -> Self {
        let position = self.position();
        Expression::Member {
            target: Box::new(self),
            name: name.into(),
            position,
        }
    }

    /// Shorthand for `self[index]`.
    pub fn index(self, index: Expression) -> Self {
        let position = self.position();
        Expression::Index {
            target: Box::new(self),
            index: Box::new(index),
            position,
        }
    }

    /// Shorthand for `self(args...)`.
    pub fn call(self, args: Vec<Expression>) -> Self {
        let position = self.position();
        Expression::Call {
            callee: Box::new(self),
            args,
            position,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(Literal::Null, _) => write!(f, "null"),
            Expression::Literal(Literal::Bool(b), _) => write!(f, "{}", b),
            Expression::Literal(Literal::Int(n), _) => write!(f, "{}", n),
            Expression::Literal(Literal::Float(n), _) => write!(f, "{:?}", n),
            Expression::Literal(Literal::String(s), _) => write!(f, "{:?}", s),
            Expression::Variable(var) => write!(f, "{}", var.name),
            Expression::Member { target, name, .. } => write!(f, "{}.{}", target, name),
            Expression::Index { target, index, .. } => write!(f, "{}[{}]", target, index),
            Expression::Call { callee, args, .. } => {
                write!(f, "{}(", callee)?;
                write_separated(f, args)?;
                write!(f, ")")
            }
            Expression::List(items, _) => {
                write!(f, "[")?;
                write_separated(f, items)?;
                write!(f, "]")
            }
            Expression::Map(entries, _) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Expression::Unary { op, operand, .. } => match op {
                UnaryOperator::Not => write!(f, "not {}", operand),
                UnaryOperator::Neg => write!(f, "-{}", operand),
            },
            Expression::Binary {
                left, op, right, ..
            } => write!(f, "{} {} {}", left, op, right),
        }
    }
}

fn write_separated(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    /// Addition: `+`
    Add,
    /// Subtraction: `-`
    Sub,
    /// Multiplication: `*`
    Mul,
    /// Division: `/`
    Div,
    /// Remainder: `%`
    Rem,
    /// Text concatenation: `~`
    Concat,
    /// Equality: `==`
    Eq,
    /// Inequality: `!=`
    Ne,
    /// Less than: `<`
    Lt,
    /// Greater than: `>`
    Gt,
    /// Less than or equal: `<=`
    Le,
    /// Greater than or equal: `>=`
    Ge,
    /// Logical AND: `and`
    And,
    /// Logical OR: `or`
    Or,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Concat => "~",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Le => "<=",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
        };
        f.write_str(symbol)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Negation: `-`
    Neg,
    /// Logical NOT: `not`
    Not,
}

/// A block of statements.
pub type Block = Vec<Statement>;

/// A statement in a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Literal text copied to the output.
    Text(String),
    /// Output an expression: `{{ expr }}`
    Output(Expression),
    /// Assignment: `{% set target = value %}`
    Set(SetStmt),
    /// Forced global assignment: `{% global name = value %}`
    Global(GlobalStmt),
    /// Conditional: `{% if %} ... {% elif %} ... {% else %} ... {% endif %}`
    If(IfStmt),
    /// Iteration: `{% for x in items %} ... {% else %} ... {% endfor %}`
    For(ForStmt),
    /// Conditional loop: `{% while cond %} ... {% endwhile %}`
    While(WhileStmt),
    /// Function definition: `{% function name(a, b) %} ... {% endfunction %}`
    Function(Arc<FunctionStmt>),
    /// Return from a function (or stop the template): `{% return value %}`
    Return(Option<Expression>, Position),
    /// Leave the innermost loop.
    Break(Position),
    /// Skip to the next iteration of the innermost loop.
    Continue(Position),
    /// Capture rendered text: `{% capture target %} ... {% endcapture %}`
    Capture(CaptureStmt),
    /// Render another template: `{% include path with model %}`
    Include(IncludeStmt),
}

/// Assignment statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SetStmt {
    /// Assignment target (variable, member or index).
    pub target: Expression,
    /// Value expression.
    pub value: Expression,
}

/// Forced global assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalStmt {
    /// Global variable.
    pub variable: VarRef,
    /// Value expression.
    pub value: Expression,
}

/// If statement.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    /// Condition/body pairs, tested in order.
    pub branches: Vec<(Expression, Block)>,
    /// Optional else block.
    pub otherwise: Option<Block>,
}

/// For loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    /// Loop variable.
    pub variable: VarRef,
    /// Collection being iterated.
    pub iterable: Expression,
    /// Loop body.
    pub body: Block,
    /// Rendered when the collection is empty.
    pub otherwise: Option<Block>,
    /// Position of the `for` tag.
    pub position: Position,
}

/// While loop.
#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    /// Loop condition.
    pub condition: Expression,
    /// Loop body.
    pub body: Block,
    /// Position of the `while` tag.
    pub position: Position,
}

/// Function definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionStmt {
    /// Global variable the function is bound to.
    pub name: VarRef,
    /// Parameter names.
    pub params: Vec<String>,
    /// Function body.
    pub body: Block,
    /// Position of the `function` tag.
    pub position: Position,
}

/// Capture statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureStmt {
    /// Assignment target receiving the captured text.
    pub target: Expression,
    /// Body whose output is captured.
    pub body: Block,
}

/// Include statement.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeStmt {
    /// Expression producing the template path.
    pub path: Expression,
    /// Optional model pushed as a new global frame.
    pub model: Option<Expression>,
    /// Position of the `include` tag.
    pub position: Position,
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Template identifier (usually the resolved path).
    pub name: String,
    /// Top-level statements.
    pub body: Block,
}

impl Template {
    /// Create a template from a name and body.
    pub fn new(name: impl Into<String>, body: Block) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_compound_target() {
        let expr = Expression::var(VarRef::global("user"))
            .member("tags")
            .index(Expression::literal(Literal::Int(0)));
        assert_eq!(expr.to_string(), "user.tags[0]");
    }

    #[test]
    fn test_display_call_and_binary() {
        let call = Expression::var(VarRef::global("f")).call(vec![
            Expression::literal(Literal::String("a".into())),
            Expression::literal(Literal::Null),
        ]);
        assert_eq!(call.to_string(), "f(\"a\", null)");

        let sum = Expression::Binary {
            left: Box::new(Expression::literal(Literal::Int(1))),
            op: BinaryOperator::Add,
            right: Box::new(Expression::literal(Literal::Float(2.5))),
            position: Position::default(),
        };
        assert_eq!(sum.to_string(), "1 + 2.5");
    }

    #[test]
    fn test_position_propagates_to_access_nodes() {
        let var = VarRef::local("x").at(Position::new(3, 7));
        let expr = Expression::var(var).member("y");
        assert_eq!(expr.position(), Position::new(3, 7));
        assert_eq!(expr.position().to_string(), "3:7");
    }

    #[test]
    fn test_templates_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Template>();
    }
}
