//! Filter expressions over the document set.
//!
//! A small expression language used by listing plugins and the CLI to select
//! documents: `published == true and 'go' in tags`. Operations are `==`,
//! `!=`, `<`, `<=`, `>`, `>=`, `in`, `not`, `and`, `or` over document fields
//! plus the date token `today`, which resolves to the current date at parse
//! time. Hand-rolled tokenizer and recursive-descent parser; no recursion on
//! input size beyond expression nesting depth.
//!
//! Field access checks a document's `extra` map first, then the typed fields
//! case-insensitively. Missing fields evaluate as null, which is falsy and
//! compares unequal to everything.

use chrono::Local;
use serde_json::Value;
use thiserror::Error;

use core_model::Document;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("filter parse error at byte {pos}: {message}")]
    Parse { pos: usize, message: String },
    #[error("filter evaluation failed for {path:?}: {message}")]
    Eval { path: String, message: String },
}

// --- Field access ---------------------------------------------------------

/// Current value of `field` on `doc`: the `extra` map wins, then the typed
/// fields matched case-insensitively. Unknown fields yield `Null`.
pub fn field_value(doc: &Document, field: &str) -> Value {
    if let Some(v) = doc.extra.get(field) {
        return v.clone();
    }
    let opt_str = |s: &Option<String>| match s {
        Some(v) => Value::String(v.clone()),
        None => Value::Null,
    };
    let str_list = |items: &[String]| Value::Array(items.iter().cloned().map(Value::String).collect());
    match field.to_ascii_lowercase().as_str() {
        "path" => Value::String(doc.path.clone()),
        "slug" => Value::String(doc.slug.clone()),
        "href" => Value::String(doc.href.clone()),
        "title" => opt_str(&doc.title),
        "date" => opt_str(&doc.date),
        "description" => opt_str(&doc.description),
        "tags" => str_list(&doc.tags),
        "authors" => str_list(&doc.authors),
        "aliases" => str_list(&doc.aliases),
        "content" => Value::String(doc.content.clone()),
        "template" => Value::String(doc.template.clone()),
        "published" => Value::Bool(doc.published),
        "draft" => Value::Bool(doc.draft),
        "private" => Value::Bool(doc.private),
        "skip" => Value::Bool(doc.skip),
        _ => Value::Null,
    }
}

// --- Expression tree ------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Field(String),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp(Operand, CmpOp, Operand),
    Truthy(Operand),
}

/// A parsed, reusable filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    root: Expr,
}

/// Parse `expr` into a reusable [`Filter`].
pub fn parse(expr: &str) -> Result<Filter, FilterError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens, pos: 0 };
    let root = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(FilterError::Parse {
            pos: parser.peek_pos(),
            message: "trailing tokens after expression".to_string(),
        });
    }
    Ok(Filter { root })
}

impl Filter {
    /// Evaluate against one document.
    pub fn matches(&self, doc: &Document) -> Result<bool, FilterError> {
        eval(&self.root, doc).map_err(|message| FilterError::Eval {
            path: doc.path.clone(),
            message,
        })
    }

    /// Evaluate against every document, returning the matching subset and
    /// any per-document evaluation errors. Every document is attempted.
    pub fn match_all(&self, docs: &[Document]) -> (Vec<Document>, Vec<FilterError>) {
        let mut matched = Vec::new();
        let mut errors = Vec::new();
        for doc in docs {
            match self.matches(doc) {
                Ok(true) => matched.push(doc.clone()),
                Ok(false) => {}
                Err(e) => errors.push(e),
            }
        }
        (matched, errors)
    }
}

// --- Evaluation -----------------------------------------------------------

fn eval(expr: &Expr, doc: &Document) -> Result<bool, String> {
    match expr {
        Expr::Or(a, b) => Ok(eval(a, doc)? || eval(b, doc)?),
        Expr::And(a, b) => Ok(eval(a, doc)? && eval(b, doc)?),
        Expr::Not(inner) => Ok(!eval(inner, doc)?),
        Expr::Truthy(operand) => Ok(truthy(&resolve(operand, doc))),
        Expr::Cmp(left, op, right) => {
            let lv = resolve(left, doc);
            let rv = resolve(right, doc);
            compare(&lv, *op, &rv)
        }
    }
}

fn resolve(operand: &Operand, doc: &Document) -> Value {
    match operand {
        Operand::Field(name) => field_value(doc, name),
        Operand::Literal(v) => v.clone(),
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn compare(left: &Value, op: CmpOp, right: &Value) -> Result<bool, String> {
    match op {
        CmpOp::Eq => Ok(loose_eq(left, right)),
        CmpOp::Ne => Ok(!loose_eq(left, right)),
        CmpOp::In => Ok(contains(right, left)),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => {
                    match (a.as_f64(), b.as_f64()) {
                        (Some(x), Some(y)) => x.partial_cmp(&y),
                        _ => None,
                    }
                }
                // Strings compare lexicographically; RFC-3339 date prefixes
                // order correctly under this rule.
                (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
                // Null never orders against anything.
                (Value::Null, _) | (_, Value::Null) => return Ok(false),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return Err(format!("cannot order {left} against {right}"));
            };
            Ok(match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                CmpOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            })
        }
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => left == right,
    }
}

/// `needle in haystack`: array membership, or substring when both are
/// strings. Anything else is false.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::String(s) => match needle {
            Value::String(n) => s.contains(n.as_str()),
            _ => false,
        },
        _ => false,
    }
}

// --- Tokenizer ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Num(f64),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\n' | b'\r' => i += 1,
            b'(' => {
                tokens.push(Token { kind: TokenKind::LParen, pos: i });
                i += 1;
            }
            b')' => {
                tokens.push(Token { kind: TokenKind::RParen, pos: i });
                i += 1;
            }
            b'=' | b'!' | b'<' | b'>' => {
                let two = bytes.get(i + 1) == Some(&b'=');
                let kind = match (b, two) {
                    (b'=', true) => TokenKind::Eq,
                    (b'!', true) => TokenKind::Ne,
                    (b'<', true) => TokenKind::Le,
                    (b'>', true) => TokenKind::Ge,
                    (b'<', false) => TokenKind::Lt,
                    (b'>', false) => TokenKind::Gt,
                    _ => {
                        return Err(FilterError::Parse {
                            pos: i,
                            message: format!("unexpected character {:?}", b as char),
                        });
                    }
                };
                let len = if matches!(kind, TokenKind::Lt | TokenKind::Gt) { 1 } else { 2 };
                tokens.push(Token { kind, pos: i });
                i += len;
            }
            b'\'' | b'"' => {
                let quote = b;
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end] != quote {
                    end += 1;
                }
                if end == bytes.len() {
                    return Err(FilterError::Parse {
                        pos: i,
                        message: "unterminated string literal".to_string(),
                    });
                }
                tokens.push(Token {
                    kind: TokenKind::Str(input[start..end].to_string()),
                    pos: i,
                });
                i = end + 1;
            }
            b'0'..=b'9' | b'-' => {
                let start = i;
                i += 1;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let text = &input[start..i];
                let num: f64 = text.parse().map_err(|_| FilterError::Parse {
                    pos: start,
                    message: format!("malformed number {text:?}"),
                })?;
                tokens.push(Token { kind: TokenKind::Num(num), pos: start });
            }
            _ if b.is_ascii_alphabetic() || b == b'_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
                {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(input[start..i].to_string()),
                    pos: start,
                });
            }
            _ => {
                return Err(FilterError::Parse {
                    pos: i,
                    message: format!("unexpected character {:?}", b as char),
                });
            }
        }
    }
    Ok(tokens)
}

// --- Parser ---------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_pos(&self) -> usize {
        self.tokens.get(self.pos).map_or(0, |t| t.pos)
    }

    fn bump(&mut self) -> Option<TokenKind> {
        let t = self.tokens.get(self.pos).map(|t| t.kind.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if let Some(TokenKind::Ident(word)) = self.peek() {
            if word == kw {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_unary()?;
        while self.eat_keyword("and") {
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        if self.eat_keyword("not") {
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        if matches!(self.peek(), Some(TokenKind::LParen)) {
            self.pos += 1;
            let inner = self.parse_or()?;
            match self.bump() {
                Some(TokenKind::RParen) => return Ok(inner),
                _ => {
                    return Err(FilterError::Parse {
                        pos: self.peek_pos(),
                        message: "expected closing parenthesis".to_string(),
                    });
                }
            }
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, FilterError> {
        let left = self.parse_operand()?;
        let op = match self.peek() {
            Some(TokenKind::Eq) => Some(CmpOp::Eq),
            Some(TokenKind::Ne) => Some(CmpOp::Ne),
            Some(TokenKind::Lt) => Some(CmpOp::Lt),
            Some(TokenKind::Le) => Some(CmpOp::Le),
            Some(TokenKind::Gt) => Some(CmpOp::Gt),
            Some(TokenKind::Ge) => Some(CmpOp::Ge),
            Some(TokenKind::Ident(word)) if word == "in" => Some(CmpOp::In),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(Expr::Truthy(left));
        };
        self.pos += 1;
        let right = self.parse_operand()?;
        Ok(Expr::Cmp(left, op, right))
    }

    fn parse_operand(&mut self) -> Result<Operand, FilterError> {
        let pos = self.peek_pos();
        match self.bump() {
            Some(TokenKind::Str(s)) => Ok(Operand::Literal(Value::String(s))),
            Some(TokenKind::Num(n)) => Ok(Operand::Literal(
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Some(TokenKind::Ident(word)) => Ok(match word.as_str() {
                "true" => Operand::Literal(Value::Bool(true)),
                "false" => Operand::Literal(Value::Bool(false)),
                // Resolved once at parse time; a long-running process must
                // re-parse to pick up a date change.
                "today" => Operand::Literal(Value::String(
                    Local::now().format("%Y-%m-%d").to_string(),
                )),
                _ => Operand::Field(word),
            }),
            other => Err(FilterError::Parse {
                pos,
                message: format!("expected operand, found {other:?}"),
            }),
        }
    }
}
