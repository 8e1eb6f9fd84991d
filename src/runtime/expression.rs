/// Closed expression language for `transform` nodes
///
/// Expressions are tokenized and parsed into an `Expr` tree once, when the
/// workflow is loaded. Evaluation is a walk over that tree against a
/// `VariableContext`; the only inputs are literals and context paths.
///
/// ```text
/// expr     := or ( "?" expr ":" expr )?
/// or       := and ( "||" and )*
/// and      := equality ( "&&" equality )*
/// equality := compare ( ("==" | "!=") compare )*
/// compare  := additive ( ("<" | "<=" | ">" | ">=") additive )*
/// additive := term ( ("+" | "-") term )*
/// term     := unary ( ("*" | "/" | "%") unary )*
/// unary    := ("!" | "-") unary | primary
/// primary  := number | string | true | false | null | path | "{{" path "}}" | "(" expr ")"
/// ```

use crate::error::ExpressionError;
use crate::runtime::condition::render;
use crate::runtime::context::VariableContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Maximum nesting of parentheses, unary operators and conditionals
pub const MAX_DEPTH: usize = 64;

/// Maximum source length in bytes
pub const MAX_LENGTH: usize = 2048;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// A parsed expression together with its source text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        if source.len() > MAX_LENGTH {
            return Err(ExpressionError::TooLong(MAX_LENGTH));
        }
        let tokens = tokenize(source)?;
        let ast = Parser::new(tokens, source.len()).parse()?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, ctx: &VariableContext) -> Result<Value, ExpressionError> {
        eval(&self.ast, ctx)
    }
}

impl TryFrom<String> for Expression {
    type Error = ExpressionError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Expression::parse(&source)
    }
}

impl From<Expression> for String {
    fn from(expression: Expression) -> Self {
        expression.source
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expression::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// JavaScript-like truthiness: `false`, `null`, `0`, `""` and empty collections are falsy
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// JSON number for an arithmetic result, integral when possible
pub fn number_value(n: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_992.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_SAFE {
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// Lexer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    /// Digit run following a `.`, used as a path segment
    Segment(String),
    Placeholder(Vec<String>),
    Dot,
    LParen,
    RParen,
    Question,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

fn parse_error(position: usize, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Parse {
        position,
        message: message.into(),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let at = |i: usize| chars.get(i).map(|&(_, c)| c);
    let offset = |i: usize| chars.get(i).map(|&(o, _)| o).unwrap_or(source.len());

    let mut tokens: Vec<(Token, usize)> = Vec::new();
    let mut i = 0;

    while let Some(c) = at(i) {
        let start = offset(i);
        let after_dot = matches!(tokens.last(), Some((Token::Dot, _)));

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() && after_dot {
            let mut j = i;
            while at(j).is_some_and(|d| d.is_ascii_digit()) {
                j += 1;
            }
            tokens.push((Token::Segment(source[start..offset(j)].to_string()), start));
            i = j;
            continue;
        }

        if c.is_ascii_digit() {
            let mut j = i;
            let mut seen_dot = false;
            while let Some(d) = at(j) {
                if d.is_ascii_digit() {
                    j += 1;
                } else if d == '.' && !seen_dot && at(j + 1).is_some_and(|n| n.is_ascii_digit()) {
                    seen_dot = true;
                    j += 1;
                } else {
                    break;
                }
            }
            let text = &source[start..offset(j)];
            let number = text
                .parse::<f64>()
                .map_err(|_| parse_error(start, format!("invalid number '{}'", text)))?;
            tokens.push((Token::Number(number), start));
            i = j;
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let mut j = i + 1;
            let mut text = String::new();
            loop {
                match at(j) {
                    None => return Err(parse_error(start, "unterminated string literal")),
                    Some(ch) if ch == quote => break,
                    Some('\\') => {
                        let escaped = at(j + 1)
                            .ok_or_else(|| parse_error(start, "unterminated string literal"))?;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => other,
                        });
                        j += 2;
                    }
                    Some(ch) => {
                        text.push(ch);
                        j += 1;
                    }
                }
            }
            tokens.push((Token::Str(text), start));
            i = j + 1;
            continue;
        }

        if c == '{' && at(i + 1) == Some('{') {
            let inner_start = offset(i + 2);
            let Some(len) = source[inner_start..].find("}}") else {
                return Err(parse_error(start, "unterminated placeholder"));
            };
            let inner = source[inner_start..inner_start + len].trim();
            let segments: Vec<String> = inner.split('.').map(|s| s.trim().to_string()).collect();
            if segments.iter().any(String::is_empty) {
                return Err(parse_error(start, "empty placeholder path"));
            }
            tokens.push((Token::Placeholder(segments), start));
            let end = inner_start + len + 2;
            while at(i).is_some() && offset(i) < end {
                i += 1;
            }
            continue;
        }

        if is_ident_start(c) {
            let mut j = i;
            while at(j).is_some_and(is_ident_continue) {
                j += 1;
            }
            tokens.push((Token::Ident(source[start..offset(j)].to_string()), start));
            i = j;
            continue;
        }

        let next = at(i + 1);
        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('.', _) => (Token::Dot, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('?', _) => (Token::Question, 1),
            (':', _) => (Token::Colon, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('!', _) => (Token::Bang, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            _ => return Err(parse_error(start, format!("unexpected character '{}'", c))),
        };
        tokens.push((token, start));
        i += width;
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn new(tokens: Vec<(Token, usize)>, end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            end,
        }
    }

    fn parse(mut self) -> Result<Expr, ExpressionError> {
        if self.tokens.is_empty() {
            return Err(parse_error(0, "empty expression"));
        }
        let expr = self.expr()?;
        if let Some((token, position)) = self.tokens.get(self.pos) {
            return Err(parse_error(*position, format!("unexpected token {:?}", token)));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, p)| *p).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ExpressionError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(parse_error(self.position(), format!("expected {}", what)))
        }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::TooDeep);
        }
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<Expr, ExpressionError> {
        self.nested(|p| {
            let condition = p.or()?;
            if !p.eat(&Token::Question) {
                return Ok(condition);
            }
            let then = p.expr()?;
            p.expect(Token::Colon, "':' in conditional")?;
            let otherwise = p.expr()?;
            Ok(Expr::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            })
        })
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ExpressionError>,
        operator: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr, ExpressionError> {
        let mut left = next(self)?;
        while let Some(op) = self.peek().and_then(operator) {
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::and, |t| (t == &Token::OrOr).then_some(BinaryOp::Or))
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::equality, |t| (t == &Token::AndAnd).then_some(BinaryOp::And))
    }

    fn equality(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::compare, |t| match t {
            Token::EqEq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn compare(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::additive, |t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::term, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        self.binary_level(Self::unary, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.primary(),
        };
        self.pos += 1;
        self.nested(|p| {
            let operand = p.unary()?;
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            })
        })
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Placeholder(segments)) => Ok(Expr::Path(segments)),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => self.path(name),
            },
            Some(Token::LParen) => self.nested(|p| {
                let inner = p.expr()?;
                p.expect(Token::RParen, "')'")?;
                Ok(inner)
            }),
            Some(token) => Err(parse_error(position, format!("unexpected token {:?}", token))),
            None => Err(parse_error(position, "unexpected end of expression")),
        }
    }

    fn path(&mut self, root: String) -> Result<Expr, ExpressionError> {
        let mut segments = vec![root];
        while self.eat(&Token::Dot) {
            let position = self.position();
            match self.advance() {
                Some(Token::Ident(name)) | Some(Token::Segment(name)) => segments.push(name),
                _ => return Err(parse_error(position, "expected field name after '.'")),
            }
        }
        Ok(Expr::Path(segments))
    }
}

// ---------------------------------------------------------------------------
// Evaluator

fn eval(expr: &Expr, ctx: &VariableContext) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(segments) => Ok(ctx.lookup_path(segments.as_slice())),
        Expr::Unary { op, operand } => {
            let value = eval(operand, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                UnaryOp::Neg => Ok(number_value(-as_number(&value, "-")?)),
            }
        }
        Expr::Binary { op: BinaryOp::And, left, right } => {
            if !truthy(&eval(left, ctx)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(right, ctx)?)))
        }
        Expr::Binary { op: BinaryOp::Or, left, right } => {
            if truthy(&eval(left, ctx)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(right, ctx)?)))
        }
        Expr::Binary { op, left, right } => {
            let left = eval(left, ctx)?;
            let right = eval(right, ctx)?;
            binary(*op, &left, &right)
        }
        Expr::Conditional { condition, then, otherwise } => {
            if truthy(&eval(condition, ctx)?) {
                eval(then, ctx)
            } else {
                eval(otherwise, ctx)
            }
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    };

    match op {
        BinaryOp::Add if left.is_string() || right.is_string() => {
            Ok(Value::String(render(left) + &render(right)))
        }
        BinaryOp::Add => Ok(number_value(as_number(left, symbol)? + as_number(right, symbol)?)),
        BinaryOp::Sub => Ok(number_value(as_number(left, symbol)? - as_number(right, symbol)?)),
        BinaryOp::Mul => Ok(number_value(as_number(left, symbol)? * as_number(right, symbol)?)),
        BinaryOp::Div | BinaryOp::Rem => {
            let (l, r) = (as_number(left, symbol)?, as_number(right, symbol)?);
            if r == 0.0 {
                return Err(ExpressionError::DivisionByZero);
            }
            Ok(number_value(if op == BinaryOp::Div { l / r } else { l % r }))
        }
        BinaryOp::Eq => Ok(Value::Bool(loosely_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loosely_equal(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = order(left, right, symbol)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        // short-circuited in eval
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(match op {
            BinaryOp::And => truthy(left) && truthy(right),
            _ => truthy(left) || truthy(right),
        })),
    }
}

fn as_number(value: &Value, symbol: &str) -> Result<f64, ExpressionError> {
    value.as_f64().ok_or_else(|| {
        ExpressionError::Type(format!("operator '{}' expects a number, got {}", symbol, value))
    })
}

/// Numbers compare by value so `1 == 1.0`; everything else structurally
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value, symbol: &str) -> Result<Ordering, ExpressionError> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        _ => {
            let (l, r) = (as_number(left, symbol)?, as_number(right, symbol)?);
            l.partial_cmp(&r).ok_or_else(|| {
                ExpressionError::Type(format!("operator '{}' cannot order {} and {}", symbol, l, r))
            })
        }
    }
}
