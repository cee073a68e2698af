//! Template source parser using Pest.
//!
//! Parsing runs in three passes: the grammar splits source into text and tag
//! tokens, the tokens are nested into blocks, and [`resolve`] assigns every
//! variable reference its scope.

mod resolve;

use std::sync::{Arc, LazyLock};

use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;
use crate::error::ParseError;
use crate::loader::ParserOptions;

#[derive(Parser)]
#[grammar = "parser/grammar.pest"]
struct TemplateParser;

static PRATT: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::op_or, Assoc::Left))
        .op(Op::infix(Rule::op_and, Assoc::Left))
        .op(Op::prefix(Rule::op_not))
        .op(Op::infix(Rule::op_eq, Assoc::Left)
            | Op::infix(Rule::op_ne, Assoc::Left)
            | Op::infix(Rule::op_lt, Assoc::Left)
            | Op::infix(Rule::op_gt, Assoc::Left)
            | Op::infix(Rule::op_le, Assoc::Left)
            | Op::infix(Rule::op_ge, Assoc::Left))
        .op(Op::infix(Rule::op_concat, Assoc::Left))
        .op(Op::infix(Rule::op_add, Assoc::Left) | Op::infix(Rule::op_sub, Assoc::Left))
        .op(Op::infix(Rule::op_mul, Assoc::Left)
            | Op::infix(Rule::op_div, Assoc::Left)
            | Op::infix(Rule::op_rem, Assoc::Left))
        .op(Op::prefix(Rule::op_neg))
});

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        let (line, column) = match e.line_col {
            pest::error::LineColLocation::Pos((line, col)) => (line, col),
            pest::error::LineColLocation::Span((line, col), _) => (line, col),
        };
        ParseError::new(line, column, e.variant.message())
    }
}

/// Parse template source with default options.
///
/// # Examples
///
/// ```
/// let template = templet::parse("hello.html", "Hello {{ name }}!").unwrap();
/// assert_eq!(template.name, "hello.html");
/// assert_eq!(template.body.len(), 3);
/// ```
pub fn parse(name: &str, source: &str) -> Result<Template, ParseError> {
    parse_with(name, source, &ParserOptions::default())
}

/// Parse template source.
pub fn parse_with(
    name: &str,
    source: &str,
    options: &ParserOptions,
) -> Result<Template, ParseError> {
    let pairs = TemplateParser::parse(Rule::template, source)?;
    let tokens = tokenize(pairs, options)?;
    let mut body = Nester::new(tokens).root()?;
    resolve::resolve(&mut body)?;
    Ok(Template::new(name, body))
}

enum Token {
    Text(String),
    Output(Expression),
    Tag(Tag, Position),
}

enum Tag {
    Set(SetStmt),
    Global(GlobalStmt),
    If(Expression),
    Elif(Expression),
    Else,
    EndIf,
    For(VarRef, Expression),
    EndFor,
    While(Expression),
    EndWhile,
    Break,
    Continue,
    Function(VarRef, Vec<String>),
    EndFunction,
    Return(Option<Expression>),
    Capture(Expression),
    EndCapture,
    Include(Expression, Option<Expression>),
}

impl Tag {
    fn keyword(&self) -> &'static str {
        match self {
            Tag::Set(_) => "set",
            Tag::Global(_) => "global",
            Tag::If(_) => "if",
            Tag::Elif(_) => "elif",
            Tag::Else => "else",
            Tag::EndIf => "endif",
            Tag::For(..) => "for",
            Tag::EndFor => "endfor",
            Tag::While(_) => "while",
            Tag::EndWhile => "endwhile",
            Tag::Break => "break",
            Tag::Continue => "continue",
            Tag::Function(..) => "function",
            Tag::EndFunction => "endfunction",
            Tag::Return(_) => "return",
            Tag::Capture(_) => "capture",
            Tag::EndCapture => "endcapture",
            Tag::Include(..) => "include",
        }
    }
}

fn position_of(pair: &Pair<'_, Rule>) -> Position {
    let (line, column) = pair.as_span().start_pos().line_col();
    Position::new(
        u32::try_from(line).unwrap_or(u32::MAX),
        u32::try_from(column).unwrap_or(u32::MAX),
    )
}

fn error_at(position: Position, message: impl Into<String>) -> ParseError {
    ParseError::new(position.line as usize, position.column as usize, message)
}

fn unexpected(pair: &Pair<'_, Rule>) -> ParseError {
    error_at(
        position_of(pair),
        format!("unexpected {:?}", pair.as_rule()),
    )
}

fn next_pair<'i>(
    inner: &mut impl Iterator<Item = Pair<'i, Rule>>,
    position: Position,
) -> Result<Pair<'i, Rule>, ParseError> {
    inner
        .next()
        .ok_or_else(|| error_at(position, "incomplete tag"))
}

fn tokenize(pairs: Pairs<'_, Rule>, options: &ParserOptions) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut after_statement = false;
    for pair in pairs.flat_map(Pair::into_inner) {
        match pair.as_rule() {
            Rule::text => {
                let mut text = pair.as_str();
                if after_statement && options.trim_blocks {
                    text = text
                        .strip_prefix("\r\n")
                        .or_else(|| text.strip_prefix('\n'))
                        .unwrap_or(text);
                }
                if !text.is_empty() {
                    tokens.push(Token::Text(text.to_owned()));
                }
                after_statement = false;
            }
            Rule::comment => after_statement = false,
            Rule::output_tag => {
                let position = position_of(&pair);
                let expr = next_pair(&mut pair.into_inner(), position)?;
                tokens.push(Token::Output(parse_expression(expr)?));
                after_statement = false;
            }
            Rule::statement_tag => {
                let position = position_of(&pair);
                let tag = next_pair(&mut pair.into_inner(), position)?;
                tokens.push(Token::Tag(parse_tag(tag)?, position));
                after_statement = true;
            }
            _ => {}
        }
    }
    Ok(tokens)
}

fn parse_tag(pair: Pair<'_, Rule>) -> Result<Tag, ParseError> {
    let position = position_of(&pair);
    let rule = pair.as_rule();
    let mut inner = pair
        .into_inner()
        .filter(|p| p.as_rule() != Rule::keyword);

    let tag = match rule {
        Rule::set_tag => Tag::Set(SetStmt {
            target: parse_postfix(next_pair(&mut inner, position)?)?,
            value: parse_expression(next_pair(&mut inner, position)?)?,
        }),
        Rule::global_tag => {
            let name = next_pair(&mut inner, position)?;
            Tag::Global(GlobalStmt {
                variable: VarRef::new(name.as_str(), ScopeKind::Global, position_of(&name)),
                value: parse_expression(next_pair(&mut inner, position)?)?,
            })
        }
        Rule::if_tag => Tag::If(parse_expression(next_pair(&mut inner, position)?)?),
        Rule::elif_tag => Tag::Elif(parse_expression(next_pair(&mut inner, position)?)?),
        Rule::else_tag => Tag::Else,
        Rule::endif_tag => Tag::EndIf,
        Rule::for_tag => {
            let name = next_pair(&mut inner, position)?;
            let variable = VarRef::new(name.as_str(), ScopeKind::Loop, position_of(&name));
            Tag::For(variable, parse_expression(next_pair(&mut inner, position)?)?)
        }
        Rule::endfor_tag => Tag::EndFor,
        Rule::while_tag => Tag::While(parse_expression(next_pair(&mut inner, position)?)?),
        Rule::endwhile_tag => Tag::EndWhile,
        Rule::break_tag => Tag::Break,
        Rule::continue_tag => Tag::Continue,
        Rule::function_tag => {
            let name = next_pair(&mut inner, position)?;
            let variable = VarRef::new(name.as_str(), ScopeKind::Global, position_of(&name));
            let params = inner.map(|p| p.as_str().to_owned()).collect();
            Tag::Function(variable, params)
        }
        Rule::endfunction_tag => Tag::EndFunction,
        Rule::return_tag => Tag::Return(inner.next().map(parse_expression).transpose()?),
        Rule::capture_tag => Tag::Capture(parse_postfix(next_pair(&mut inner, position)?)?),
        Rule::endcapture_tag => Tag::EndCapture,
        Rule::include_tag => {
            let path = parse_expression(next_pair(&mut inner, position)?)?;
            let model = inner.next().map(parse_expression).transpose()?;
            Tag::Include(path, model)
        }
        _ => return Err(error_at(position, format!("unexpected {:?}", rule))),
    };
    Ok(tag)
}

fn parse_expression(pair: Pair<'_, Rule>) -> Result<Expression, ParseError> {
    PRATT
        .map_primary(parse_postfix)
        .map_prefix(|op, operand| {
            let position = position_of(&op);
            let op = match op.as_rule() {
                Rule::op_not => UnaryOperator::Not,
                _ => UnaryOperator::Neg,
            };
            Ok(Expression::Unary {
                op,
                operand: Box::new(operand?),
                position,
            })
        })
        .map_infix(|left, op, right| {
            let position = position_of(&op);
            let op = binary_operator(op.as_rule())
                .ok_or_else(|| error_at(position, "unknown operator"))?;
            Ok(Expression::Binary {
                left: Box::new(left?),
                op,
                right: Box::new(right?),
                position,
            })
        })
        .parse(pair.into_inner())
}

fn binary_operator(rule: Rule) -> Option<BinaryOperator> {
    let op = match rule {
        Rule::op_or => BinaryOperator::Or,
        Rule::op_and => BinaryOperator::And,
        Rule::op_eq => BinaryOperator::Eq,
        Rule::op_ne => BinaryOperator::Ne,
        Rule::op_lt => BinaryOperator::Lt,
        Rule::op_gt => BinaryOperator::Gt,
        Rule::op_le => BinaryOperator::Le,
        Rule::op_ge => BinaryOperator::Ge,
        Rule::op_concat => BinaryOperator::Concat,
        Rule::op_add => BinaryOperator::Add,
        Rule::op_sub => BinaryOperator::Sub,
        Rule::op_mul => BinaryOperator::Mul,
        Rule::op_div => BinaryOperator::Div,
        Rule::op_rem => BinaryOperator::Rem,
        _ => return None,
    };
    Some(op)
}

fn parse_postfix(pair: Pair<'_, Rule>) -> Result<Expression, ParseError> {
    let position = position_of(&pair);
    let mut inner = pair.into_inner();
    let mut expr = parse_primary(next_pair(&mut inner, position)?)?;
    for accessor in inner {
        let position = position_of(&accessor);
        expr = match accessor.as_rule() {
            Rule::member => {
                let name = next_pair(&mut accessor.into_inner(), position)?;
                Expression::Member {
                    target: Box::new(expr),
                    name: name.as_str().to_owned(),
                    position,
                }
            }
            Rule::index => {
                let index = next_pair(&mut accessor.into_inner(), position)?;
                Expression::Index {
                    target: Box::new(expr),
                    index: Box::new(parse_expression(index)?),
                    position,
                }
            }
            Rule::call_args => Expression::Call {
                callee: Box::new(expr),
                args: accessor
                    .into_inner()
                    .map(parse_expression)
                    .collect::<Result<_, _>>()?,
                position,
            },
            _ => return Err(unexpected(&accessor)),
        };
    }
    Ok(expr)
}

fn parse_primary(pair: Pair<'_, Rule>) -> Result<Expression, ParseError> {
    let position = position_of(&pair);
    let literal = |value| Ok(Expression::Literal(value, position));
    match pair.as_rule() {
        Rule::int => match pair.as_str().parse::<i64>() {
            Ok(n) => literal(Literal::Int(n)),
            Err(_) => Err(error_at(position, "integer literal out of range")),
        },
        Rule::float => match pair.as_str().parse::<f64>() {
            Ok(n) => literal(Literal::Float(n)),
            Err(_) => Err(error_at(position, "invalid float literal")),
        },
        Rule::string => literal(Literal::String(parse_string(pair)?)),
        Rule::boolean => literal(Literal::Bool(pair.as_str() == "true")),
        Rule::null_lit => literal(Literal::Null),
        Rule::identifier => Ok(Expression::Variable(VarRef::new(
            pair.as_str(),
            ScopeKind::Global,
            position,
        ))),
        Rule::list => Ok(Expression::List(
            pair.into_inner()
                .map(parse_expression)
                .collect::<Result<_, _>>()?,
            position,
        )),
        Rule::map => {
            let mut entries = Vec::new();
            for entry in pair.into_inner() {
                let entry_position = position_of(&entry);
                let mut inner = entry.into_inner();
                let key = next_pair(&mut inner, entry_position)?;
                let key = match key.as_rule() {
                    Rule::string => parse_string(key)?,
                    _ => key.as_str().to_owned(),
                };
                let value = parse_expression(next_pair(&mut inner, entry_position)?)?;
                entries.push((key, value));
            }
            Ok(Expression::Map(entries, position))
        }
        Rule::expression => parse_expression(pair),
        _ => Err(unexpected(&pair)),
    }
}

fn parse_string(pair: Pair<'_, Rule>) -> Result<String, ParseError> {
    let position = position_of(&pair);
    let raw = next_pair(&mut pair.into_inner(), position)?;
    let mut out = String::with_capacity(raw.as_str().len());
    let mut chars = raw.as_str().chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Ok(out)
}

/// Rebuilds block structure from the flat tag sequence.
struct Nester {
    tokens: std::vec::IntoIter<Token>,
}

type BlockEnd = Option<(Tag, Position)>;

impl Nester {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into_iter(),
        }
    }

    fn root(mut self) -> Result<Block, ParseError> {
        let (body, end) = self.block()?;
        match end {
            None => Ok(body),
            Some((tag, position)) => Err(error_at(
                position,
                format!("unexpected `{}` tag", tag.keyword()),
            )),
        }
    }

    /// Statements up to the next tag that closes or continues an enclosing
    /// block, or to the end of input.
    fn block(&mut self) -> Result<(Block, BlockEnd), ParseError> {
        let mut block = Vec::new();
        while let Some(token) = self.tokens.next() {
            let (tag, position) = match token {
                Token::Text(text) => {
                    block.push(Statement::Text(text));
                    continue;
                }
                Token::Output(expr) => {
                    block.push(Statement::Output(expr));
                    continue;
                }
                Token::Tag(tag, position) => (tag, position),
            };
            let statement = match tag {
                Tag::Set(stmt) => Statement::Set(stmt),
                Tag::Global(stmt) => Statement::Global(stmt),
                Tag::If(condition) => self.if_block(condition, position)?,
                Tag::For(variable, iterable) => self.for_block(variable, iterable, position)?,
                Tag::While(condition) => Statement::While(WhileStmt {
                    condition,
                    body: self.closed_by("endwhile", "while", position)?,
                    position,
                }),
                Tag::Function(name, params) => Statement::Function(Arc::new(FunctionStmt {
                    name,
                    params,
                    body: self.closed_by("endfunction", "function", position)?,
                    position,
                })),
                Tag::Capture(target) => Statement::Capture(CaptureStmt {
                    target,
                    body: self.closed_by("endcapture", "capture", position)?,
                }),
                Tag::Return(value) => Statement::Return(value, position),
                Tag::Break => Statement::Break(position),
                Tag::Continue => Statement::Continue(position),
                Tag::Include(path, model) => Statement::Include(IncludeStmt {
                    path,
                    model,
                    position,
                }),
                closer => return Ok((block, Some((closer, position)))),
            };
            block.push(statement);
        }
        Ok((block, None))
    }

    fn closed_by(
        &mut self,
        closer: &'static str,
        opener: &'static str,
        opened_at: Position,
    ) -> Result<Block, ParseError> {
        let (body, end) = self.block()?;
        match end {
            Some((tag, _)) if tag.keyword() == closer => Ok(body),
            end => Err(mismatch(end, closer, opener, opened_at)),
        }
    }

    fn if_block(&mut self, condition: Expression, opened_at: Position) -> Result<Statement, ParseError> {
        let mut branches = Vec::new();
        let mut condition = condition;
        loop {
            let (body, end) = self.block()?;
            branches.push((condition, body));
            match end {
                Some((Tag::Elif(next), _)) => condition = next,
                Some((Tag::Else, _)) => {
                    let otherwise = self.closed_by("endif", "if", opened_at)?;
                    return Ok(Statement::If(IfStmt {
                        branches,
                        otherwise: Some(otherwise),
                    }));
                }
                Some((Tag::EndIf, _)) => {
                    return Ok(Statement::If(IfStmt {
                        branches,
                        otherwise: None,
                    }))
                }
                end => return Err(mismatch(end, "endif", "if", opened_at)),
            }
        }
    }

    fn for_block(
        &mut self,
        variable: VarRef,
        iterable: Expression,
        position: Position,
    ) -> Result<Statement, ParseError> {
        let (body, end) = self.block()?;
        let otherwise = match end {
            Some((Tag::EndFor, _)) => None,
            Some((Tag::Else, _)) => Some(self.closed_by("endfor", "for", position)?),
            end => return Err(mismatch(end, "endfor", "for", position)),
        };
        Ok(Statement::For(ForStmt {
            variable,
            iterable,
            body,
            otherwise,
            position,
        }))
    }
}

fn mismatch(end: BlockEnd, closer: &str, opener: &str, opened_at: Position) -> ParseError {
    match end {
        Some((tag, position)) => error_at(
            position,
            format!("unexpected `{}` tag, expected `{}`", tag.keyword(), closer),
        ),
        None => error_at(
            opened_at,
            format!("unclosed `{}` tag, expected `{}`", opener, closer),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(source: &str) -> Block {
        parse("test", source).unwrap().body
    }

    fn expr(source: &str) -> Expression {
        match body(&format!("{{{{ {} }}}}", source)).remove(0) {
            Statement::Output(expr) => expr,
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_text_and_output() {
        let body = body("Hello {{ name }}!{# note #}");
        assert_eq!(body.len(), 3);
        assert_eq!(body[0], Statement::Text("Hello ".into()));
        assert!(matches!(&body[1], Statement::Output(Expression::Variable(v)) if v.name == "name"));
        assert_eq!(body[2], Statement::Text("!".into()));
    }

    #[test]
    fn test_operator_precedence() {
        assert_eq!(expr("1 + 2 * 3").to_string(), "1 + 2 * 3");
        match expr("1 + 2 * 3") {
            Expression::Binary { op, right, .. } => {
                assert_eq!(op, BinaryOperator::Add);
                assert!(matches!(*right, Expression::Binary { op: BinaryOperator::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
        match expr("not a == b") {
            Expression::Unary { op, operand, .. } => {
                assert_eq!(op, UnaryOperator::Not);
                assert!(matches!(*operand, Expression::Binary { op: BinaryOperator::Eq, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_word_operators_need_boundaries() {
        assert!(matches!(expr("nothing"), Expression::Variable(v) if v.name == "nothing"));
        assert!(matches!(
            expr("a or order"),
            Expression::Binary { op: BinaryOperator::Or, .. }
        ));
    }

    #[test]
    fn test_postfix_chain() {
        assert_eq!(expr("user.tags[0].name").to_string(), "user.tags[0].name");
        assert_eq!(expr("f(1, 'two')(3)").to_string(), "f(1, \"two\")(3)");
        assert_eq!(expr("{a: 1, 'b c': [1, 2,]}").to_string(), "{a: 1, b c: [1, 2]}");
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            expr(r#""a\"b\n""#),
            Expression::Literal(Literal::String("a\"b\n".into()), Position::new(1, 4))
        );
    }

    #[test]
    fn test_nested_blocks() {
        let body = body("{% if a %}x{% elif b %}y{% else %}{% for i in c %}{{ i }}{% endfor %}{% endif %}");
        let Statement::If(stmt) = &body[0] else {
            panic!("expected if");
        };
        assert_eq!(stmt.branches.len(), 2);
        let otherwise = stmt.otherwise.as_ref().unwrap();
        assert!(matches!(&otherwise[0], Statement::For(f) if f.variable.name == "i"));
    }

    #[test]
    fn test_mismatched_tags() {
        let err = parse("t", "{% if a %}{% endfor %}").unwrap_err();
        assert!(err.message.contains("endfor"));
        let err = parse("t", "\n{% for x in y %}").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unclosed"));
        assert!(parse("t", "{% endif %}").is_err());
        assert!(parse("t", "{{ 1 + }}").is_err());
    }

    #[test]
    fn test_keywords_need_boundaries() {
        assert!(parse("t", "{% settings = 1 %}").is_err());
        let body = body("{% include 'a.html' with {x: 1} %}");
        assert!(matches!(&body[0], Statement::Include(inc) if inc.model.is_some()));
    }

    #[test]
    fn test_trim_blocks() {
        let source = "{% if true %}\nyes\n{% endif %}\nend";
        let plain = body(source);
        let trimmed = parse_with("t", source, &ParserOptions::trim_blocks())
            .unwrap()
            .body;
        let Statement::If(stmt) = &plain[0] else {
            panic!("expected if");
        };
        assert_eq!(stmt.branches[0].1, vec![Statement::Text("\nyes\n".into())]);
        let Statement::If(stmt) = &trimmed[0] else {
            panic!("expected if");
        };
        assert_eq!(stmt.branches[0].1, vec![Statement::Text("yes\n".into())]);
        assert_eq!(trimmed[1], Statement::Text("end".into()));
    }

    #[test]
    fn test_positions() {
        let body = body("ab\n  {{ x.y }}");
        let Statement::Output(expr) = &body[1] else {
            panic!("expected output");
        };
        assert_eq!(expr.position(), Position::new(2, 7));
    }
}
