//! Interpreter for the indentation-based guest scripting subset.
//!
//! Programs are executed directly from their source lines. Block structure
//! is recovered by re-scanning line ranges against a base indentation; no
//! syntax tree is built. This is only adequate because control flow is
//! limited to if/elif/else chains over straight-line statements.
//!
//! Every call to [`Interpreter::execute`] consumes a fresh instance, so
//! bindings, the input cursor and emitted output are never shared between
//! runs.
pub mod expr;
pub mod value;

use crate::error::Fault;
use crate::sandbox::{CancelToken, MAX_OUTPUT_BYTES};
use expr::{call_argument, evaluate, evaluate_condition, is_identifier, parse_float, parse_int, split_top_level, Bindings, Scanner};
use tracing::trace;
use value::{BinaryOp, Value};

/// Result of one interpreter run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Emitted lines joined with `\n`. Kept on faults as well.
    pub output: String,
    pub error: Option<String>,
    pub exit_code: i32,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One source line with its indentation width
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    text: &'a str,
    indent: usize,
}

impl<'a> Line<'a> {
    fn parse(raw: &'a str) -> Self {
        let text = raw.trim();
        let indent = raw.chars().take_while(|c| c.is_whitespace()).count();
        Self { text, indent }
    }

    /// Blank and comment lines do not take part in block structure
    fn is_transparent(&self) -> bool {
        self.text.is_empty() || self.text.starts_with('#')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Header<'a> {
    If(&'a str),
    Elif(&'a str),
    Else,
}

impl<'a> Header<'a> {
    fn parse(text: &'a str) -> Option<Self> {
        let head = text.strip_suffix(':')?;
        if head.trim_end() == "else" {
            return Some(Header::Else);
        }
        if let Some(cond) = keyword_guard(head, "elif") {
            return Some(Header::Elif(cond));
        }
        keyword_guard(head, "if").map(Header::If)
    }
}

/// `<keyword> <cond>` or `<keyword>(<cond>...)`
fn keyword_guard<'a>(head: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = head.strip_prefix(keyword)?;
    if !rest.starts_with(|c: char| c.is_whitespace() || c == '(') {
        return None;
    }
    let cond = rest.trim();
    (!cond.is_empty()).then_some(cond)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericKind {
    Int,
    Float,
}

impl NumericKind {
    fn parse(self, text: &str) -> Result<Value, Fault> {
        match self {
            NumericKind::Int => parse_int(text),
            NumericKind::Float => parse_float(text),
        }
    }
}

/// Recognised statement forms, in priority order
#[derive(Debug, Clone, PartialEq, Eq)]
enum Statement<'a> {
    Print(&'a str),
    MultiRead(Vec<&'a str>, NumericKind),
    NumericRead(&'a str, NumericKind),
    LineRead { name: &'a str, strip: bool },
    Assign { name: &'a str, op: Option<BinaryOp>, expr: &'a str },
    Ignored,
}

impl<'a> Statement<'a> {
    fn parse(text: &'a str) -> Self {
        if let Some(args) = call_argument(text, "print") {
            return Statement::Print(args);
        }

        let Some((lhs, op, rhs)) = split_assignment(text) else {
            return Statement::Ignored;
        };
        let compact: String = rhs.chars().filter(|c| !c.is_whitespace()).collect();

        if op.is_none() && lhs.contains(',') {
            let names: Vec<&str> = lhs.split(',').map(str::trim).collect();
            if names.iter().all(|n| is_identifier(n)) {
                let kind = match compact.as_str() {
                    "map(int,input().split())" | "list(map(int,input().split()))" => Some(NumericKind::Int),
                    "map(float,input().split())" | "list(map(float,input().split()))" => Some(NumericKind::Float),
                    _ => None,
                };
                if let Some(kind) = kind {
                    return Statement::MultiRead(names, kind);
                }
            }
            return Statement::Ignored;
        }

        if !is_identifier(lhs) {
            return Statement::Ignored;
        }

        if op.is_none() {
            match compact.as_str() {
                "int(input())" | "int(input().strip())" => {
                    return Statement::NumericRead(lhs, NumericKind::Int)
                }
                "float(input())" | "float(input().strip())" => {
                    return Statement::NumericRead(lhs, NumericKind::Float)
                }
                "input()" => return Statement::LineRead { name: lhs, strip: false },
                "input().strip()" => return Statement::LineRead { name: lhs, strip: true },
                _ => {}
            }
        }

        Statement::Assign { name: lhs, op, expr: rhs }
    }
}

/// Split `lhs <op>= rhs` at the first top-level assignment sign
fn split_assignment(text: &str) -> Option<(&str, Option<BinaryOp>, &str)> {
    let bytes = text.as_bytes();
    let mut scanner = Scanner::new();

    for (idx, c) in text.char_indices() {
        if !scanner.step(c) || c != '=' {
            continue;
        }
        let prev = idx.checked_sub(1).map(|i| bytes[i] as char);
        if bytes.get(idx + 1) == Some(&b'=') || matches!(prev, Some('=' | '!' | '<' | '>')) {
            // Comparison, not assignment
            return None;
        }

        return match prev.and_then(BinaryOp::from_compound) {
            Some(op) => Some((text[..idx - 1].trim(), Some(op), text[idx + 1..].trim())),
            None => Some((text[..idx].trim(), None, text[idx + 1..].trim())),
        };
    }
    None
}

pub struct Interpreter {
    variables: Bindings,
    input: Vec<String>,
    cursor: usize,
    output: Vec<String>,
    output_bytes: usize,
    cancel: CancelToken,
}

impl Interpreter {
    /// Fresh interpreter reading from a newline-delimited input buffer
    pub fn new(input: &str) -> Self {
        Self::with_cancel(input, CancelToken::new())
    }

    /// Fresh interpreter that aborts once `cancel` is tripped
    pub fn with_cancel(input: &str, cancel: CancelToken) -> Self {
        Self {
            variables: Bindings::new(),
            input: input.lines().map(str::to_string).collect(),
            cursor: 0,
            output: Vec::new(),
            output_bytes: 0,
            cancel,
        }
    }

    /// Run a whole program. The first uncaught fault stops execution.
    pub fn execute(mut self, code: &str) -> RunOutcome {
        let lines: Vec<Line> = code.lines().map(Line::parse).collect();
        let result = self.execute_block(&lines, 0, lines.len());

        let output = self.output.join("\n");
        match result {
            Ok(()) => RunOutcome { output, error: None, exit_code: 0 },
            Err(fault) => RunOutcome {
                output,
                error: Some(fault.to_string()),
                exit_code: 1,
            },
        }
    }

    fn execute_block(&mut self, lines: &[Line], start: usize, end: usize) -> Result<(), Fault> {
        let mut i = start;
        while i < end {
            let line = lines[i];
            if line.is_transparent() {
                i += 1;
                continue;
            }
            if self.cancel.is_cancelled() {
                return Err(Fault::Cancelled);
            }

            if let Some(Header::If(_)) = Header::parse(line.text) {
                i = self.execute_conditional(lines, i, end)?;
            } else {
                self.execute_statement(line.text)?;
                i += 1;
            }
        }
        Ok(())
    }

    /// Run an if/elif/else chain starting at `header`. Returns the index of
    /// the first line after the chain.
    fn execute_conditional(&mut self, lines: &[Line], header: usize, end: usize) -> Result<usize, Fault> {
        let base = lines[header].indent;
        let mut matched = false;
        let mut i = header;

        loop {
            let Some(kind) = Header::parse(lines[i].text) else {
                return Ok(i);
            };
            let body_end = body_end(lines, i + 1, end, base);

            match kind {
                Header::If(cond) | Header::Elif(cond) => {
                    // Guards after a taken branch are never evaluated
                    if !matched && evaluate_condition(cond, &self.variables)? {
                        self.execute_block(lines, i + 1, body_end)?;
                        matched = true;
                    }
                }
                Header::Else => {
                    if !matched {
                        self.execute_block(lines, i + 1, body_end)?;
                    }
                    return Ok(body_end);
                }
            }

            i = body_end;
            let continues = i < end
                && lines[i].indent == base
                && matches!(Header::parse(lines[i].text), Some(Header::Elif(_) | Header::Else));
            if !continues {
                return Ok(i);
            }
        }
    }

    fn execute_statement(&mut self, text: &str) -> Result<(), Fault> {
        match Statement::parse(text) {
            Statement::Print(args) => {
                let line = if args.trim().is_empty() {
                    String::new()
                } else {
                    split_top_level(args, ',')
                        .into_iter()
                        .map(|arg| evaluate(arg, &self.variables).map(|v| v.to_string()))
                        .collect::<Result<Vec<_>, _>>()?
                        .join(" ")
                };
                self.emit(line)?;
            }
            Statement::MultiRead(names, kind) => {
                let line = self.read_line()?;
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < names.len() {
                    return Err(Fault::Value(format!(
                        "not enough values to unpack (expected {}, got {})",
                        names.len(),
                        fields.len()
                    )));
                }
                if fields.len() > names.len() {
                    return Err(Fault::Value(format!(
                        "too many values to unpack (expected {})",
                        names.len()
                    )));
                }
                for (name, field) in names.into_iter().zip(fields) {
                    let value = kind.parse(field)?;
                    self.variables.insert(name.to_string(), value);
                }
            }
            Statement::NumericRead(name, kind) => {
                let line = self.read_line()?;
                let value = kind.parse(&line)?;
                self.variables.insert(name.to_string(), value);
            }
            Statement::LineRead { name, strip } => {
                let line = self.read_line()?;
                let line = if strip { line.trim().to_string() } else { line };
                self.variables.insert(name.to_string(), Value::Str(line));
            }
            Statement::Assign { name, op, expr } => {
                let rhs = evaluate(expr, &self.variables)?;
                let value = match op {
                    None => rhs,
                    Some(op) => self
                        .variables
                        .get(name)
                        .ok_or_else(|| Fault::Name(name.to_string()))?
                        .binary(op, &rhs)?,
                };
                self.variables.insert(name.to_string(), value);
            }
            Statement::Ignored => {
                trace!(statement = text, "Unrecognised statement ignored");
            }
        }
        Ok(())
    }

    fn emit(&mut self, line: String) -> Result<(), Fault> {
        self.output_bytes += line.len() + 1;
        if self.output_bytes > MAX_OUTPUT_BYTES {
            return Err(Fault::Memory(format!("output exceeds {} bytes", MAX_OUTPUT_BYTES)));
        }
        self.output.push(line);
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, Fault> {
        let line = self.input.get(self.cursor).cloned().ok_or(Fault::EndOfInput)?;
        self.cursor += 1;
        Ok(line)
    }
}

/// First significant line at or after `from` whose indentation is at most
/// `base`, or `end`
fn body_end(lines: &[Line], from: usize, end: usize, base: usize) -> usize {
    (from..end)
        .find(|&i| !lines[i].is_transparent() && lines[i].indent <= base)
        .unwrap_or(end)
}
