/// Expression and condition evaluation for the guest subset.
///
/// Forms are tried in a fixed order; the first that matches wins. Anything
/// the arithmetic parser cannot read is taken verbatim as a string literal.
use super::value::{check_string_size, BinaryOp, Value};
use crate::error::Fault;
use std::cmp::Ordering;
use std::collections::HashMap;

pub type Bindings = HashMap<String, Value>;

/// Evaluate one expression against the current bindings
pub fn evaluate(expr: &str, vars: &Bindings) -> Result<Value, Fault> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(Value::Str(String::new()));
    }

    if let Some(text) = string_literal(expr) {
        return Ok(Value::Str(text));
    }

    if let Some(template) = expr
        .strip_prefix('f')
        .or_else(|| expr.strip_prefix('F'))
        .and_then(string_literal)
    {
        return interpolate(&template, vars).map(Value::Str);
    }

    if let Some(receiver) = expr.strip_suffix("[::-1]") {
        return match evaluate(receiver, vars)? {
            Value::Str(s) => Ok(Value::Str(s.chars().rev().collect())),
            other => Err(Fault::Type(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        };
    }

    for (method, upper) in [(".lower()", false), (".upper()", true)] {
        if let Some(receiver) = expr.strip_suffix(method) {
            return match evaluate(receiver, vars)? {
                Value::Str(s) if upper => Ok(Value::Str(s.to_uppercase())),
                Value::Str(s) => Ok(Value::Str(s.to_lowercase())),
                other => Err(Fault::Type(format!(
                    "'{}' object has no attribute '{}'",
                    other.type_name(),
                    &method[1..method.len() - 2]
                ))),
            };
        }
    }

    if let Some(inner) = call_argument(expr, "str") {
        return Ok(Value::Str(evaluate(inner, vars)?.to_string()));
    }
    if let Some(inner) = call_argument(expr, "int") {
        return to_int(evaluate(inner, vars)?);
    }
    if let Some(inner) = call_argument(expr, "len") {
        return match evaluate(inner, vars)? {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            other => Err(Fault::Type(format!(
                "object of type '{}' has no len()",
                other.type_name()
            ))),
        };
    }

    if let Ok(i) = expr.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    if is_decimal_literal(expr) {
        if let Ok(f) = expr.parse::<f64>() {
            return Ok(Value::Float(f));
        }
    }

    match expr {
        "True" => return Ok(Value::Bool(true)),
        "False" => return Ok(Value::Bool(false)),
        _ => {}
    }

    if let Some(value) = vars.get(expr) {
        return Ok(value.clone());
    }

    match Parser::parse(expr) {
        Some(ast) => ast.eval(vars),
        None => Ok(Value::Str(expr.to_string())),
    }
}

/// Evaluate a guard. Comparisons split on the first top-level operator;
/// anything else is coerced to a boolean.
pub fn evaluate_condition(cond: &str, vars: &Bindings) -> Result<bool, Fault> {
    let cond = strip_enclosing_parens(cond);
    let Some((at, op)) = find_comparison(cond) else {
        return Ok(evaluate(cond, vars)?.is_truthy());
    };

    let lhs = evaluate(&cond[..at], vars)?;
    let rhs = evaluate(&cond[at + op.len()..], vars)?;

    Ok(match op {
        "==" => lhs.loosely_equals(&rhs),
        "!=" => !lhs.loosely_equals(&rhs),
        ">=" => lhs.compare(&rhs, op)? != Ordering::Less,
        "<=" => lhs.compare(&rhs, op)? != Ordering::Greater,
        ">" => lhs.compare(&rhs, op)? == Ordering::Greater,
        _ => lhs.compare(&rhs, op)? == Ordering::Less,
    })
}

/// `(a > b)` and `((a > b))` guard the same as `a > b`
fn strip_enclosing_parens(text: &str) -> &str {
    let mut text = text.trim();
    while let Some(inner) = call_argument(text, "") {
        text = inner.trim();
    }
    text
}

fn to_int(value: Value) -> Result<Value, Fault> {
    match value {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Value::Float(f) => Err(Fault::Value(format!("cannot convert float {} to integer", f))),
        Value::Str(s) => parse_int(&s),
    }
}

/// `int()` applied to text, with the guest's error message
pub fn parse_int(text: &str) -> Result<Value, Fault> {
    text.trim()
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|_| Fault::Value(format!("invalid literal for int() with base 10: '{}'", text)))
}

/// `float()` applied to text, with the guest's error message
pub fn parse_float(text: &str) -> Result<Value, Fault> {
    let trimmed = text.trim();
    if trimmed.parse::<i64>().is_ok() || is_decimal_literal(trimmed) {
        if let Ok(f) = trimmed.parse::<f64>() {
            return Ok(Value::Float(f));
        }
    }
    Err(Fault::Value(format!("could not convert string to float: '{}'", text)))
}

fn is_decimal_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    digits.contains('.')
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
}

pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
        && !matches!(text, "True" | "False" | "if" | "elif" | "else" | "print")
}

/// Contents of a single quoted literal spanning the whole text
fn string_literal(text: &str) -> Option<String> {
    let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    if text.len() < 2 || !text.ends_with(quote) {
        return None;
    }

    let body = &text[1..text.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            // An unescaped quote means this is not one literal
            c if c == quote => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

/// Replace `{name}` placeholders; unknown names are left as written
fn interpolate(template: &str, vars: &Bindings) -> Result<String, Fault> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = after[..close].trim();
                match vars.get(name) {
                    Some(Value::Str(text)) => {
                        check_string_size(out.len().checked_add(text.len()))?;
                        out.push_str(text);
                    }
                    Some(value) => out.push_str(&value.to_string()),
                    None => out.push_str(&rest[open..open + close + 2]),
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// If `text` is exactly `name(<arg>)`, return `<arg>`
pub fn call_argument<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(name)?.trim_start();
    let inner = rest.strip_prefix('(')?;

    // The opening paren must close at the very end
    let mut depth = 1usize;
    let mut scanner = Scanner::new();
    for (idx, c) in inner.char_indices() {
        if !scanner.step(c) {
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return (idx == inner.len() - 1).then(|| &inner[..idx]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on `sep` where it appears outside quotes and brackets
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut scanner = Scanner::new();

    for (idx, c) in text.char_indices() {
        if !scanner.step(c) {
            continue;
        }
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Locate the first comparison operator outside quotes and brackets
fn find_comparison(text: &str) -> Option<(usize, &'static str)> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut scanner = Scanner::new();

    for (idx, c) in text.char_indices() {
        if !scanner.step(c) {
            continue;
        }
        let next = bytes.get(idx + 1).copied();
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            _ if depth != 0 => {}
            '=' if next == Some(b'=') => return Some((idx, "==")),
            '!' if next == Some(b'=') => return Some((idx, "!=")),
            '>' if next == Some(b'=') => return Some((idx, ">=")),
            '<' if next == Some(b'=') => return Some((idx, "<=")),
            '>' => return Some((idx, ">")),
            '<' => return Some((idx, "<")),
            _ => {}
        }
    }
    None
}

/// Tracks whether the scan position is inside a quoted literal.
/// `step` returns true when the character is structural code.
#[derive(Default)]
pub struct Scanner {
    quote: Option<char>,
    escaped: bool,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, c: char) -> bool {
        match self.quote {
            Some(_) if self.escaped => {
                self.escaped = false;
                false
            }
            Some(_) if c == '\\' => {
                self.escaped = true;
                false
            }
            Some(q) => {
                if c == q {
                    self.quote = None;
                }
                false
            }
            None if c == '"' || c == '\'' => {
                self.quote = Some(c);
                false
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(Value),
    Name(String),
    Op(BinaryOp),
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' | '-' | '%' => {
                tokens.push(Token::Op(match c {
                    '+' => BinaryOp::Add,
                    '-' => BinaryOp::Sub,
                    _ => BinaryOp::Mod,
                }));
                i += 1;
            }
            '*' | '/' => {
                let doubled = chars.get(i + 1) == Some(&c);
                tokens.push(Token::Op(match (c, doubled) {
                    ('*', true) => BinaryOp::Pow,
                    ('*', false) => BinaryOp::Mul,
                    ('/', true) => BinaryOp::FloorDiv,
                    _ => BinaryOp::Div,
                }));
                i += if doubled { 2 } else { 1 };
            }
            '"' | '\'' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i] != c {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if i >= chars.len() {
                    return None;
                }
                i += 1;
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Literal(Value::Str(string_literal(&literal)?)));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let number: String = chars[start..i].iter().collect();
                let value = match number.parse::<i64>() {
                    Ok(n) => Value::Int(n),
                    Err(_) => Value::Float(number.parse::<f64>().ok()?),
                };
                tokens.push(Token::Literal(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "True" => Token::Literal(Value::Bool(true)),
                    "False" => Token::Literal(Value::Bool(false)),
                    _ => Token::Name(word),
                });
            }
            _ => return None,
        }
    }

    Some(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Name(String),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, vars: &Bindings) -> Result<Value, Fault> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Name(name) => vars.get(name).cloned().ok_or_else(|| Fault::Name(name.clone())),
            Expr::Negate(inner) => inner.eval(vars)?.negate(),
            Expr::Binary(op, lhs, rhs) => lhs.eval(vars)?.binary(*op, &rhs.eval(vars)?),
        }
    }
}

/// Recursive-descent parser:
///   sum     := product (('+' | '-') product)*
///   product := unary (('*' | '/' | '//' | '%') unary)*
///   unary   := '-' unary | '+' unary | power
///   power   := atom ('**' unary)?
///   atom    := literal | name | '(' sum ')'
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn parse(text: &str) -> Option<Expr> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return None;
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.sum()?;
        (parser.pos == parser.tokens.len()).then_some(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn sum(&mut self) -> Option<Expr> {
        let mut lhs = self.product()?;
        while let Some(Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) = self.peek().cloned() {
            self.pos += 1;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.product()?));
        }
        Some(lhs)
    }

    fn product(&mut self) -> Option<Expr> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(
            op @ (BinaryOp::Mul | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod),
        )) = self.peek().cloned()
        {
            self.pos += 1;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.unary()?));
        }
        Some(lhs)
    }

    fn unary(&mut self) -> Option<Expr> {
        match self.peek() {
            Some(Token::Op(BinaryOp::Sub)) => {
                self.pos += 1;
                Some(Expr::Negate(Box::new(self.unary()?)))
            }
            Some(Token::Op(BinaryOp::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Option<Expr> {
        let base = self.atom()?;
        if let Some(Token::Op(BinaryOp::Pow)) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Some(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Some(base)
    }

    fn atom(&mut self) -> Option<Expr> {
        match self.next()? {
            Token::Literal(v) => Some(Expr::Literal(v)),
            Token::Name(name) => Some(Expr::Name(name)),
            Token::LParen => {
                let inner = self.sum()?;
                match self.next()? {
                    Token::RParen => Some(inner),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
