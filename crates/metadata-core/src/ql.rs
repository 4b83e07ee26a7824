//! Free-text query language.
//!
//! ```text
//! beamline:3a AND (cycle:2023-3 OR cycle:2024-1) NOT sample:"test run"
//! energy:>=10 name:calib* silicon
//! ```
//!
//! `key:value` terms, implicit AND on juxtaposition, `AND`/`OR`/`NOT`,
//! parentheses, comparison prefixes (`>`, `>=`, `<`, `<=`, `!=`) and `*`
//! wildcards. A bare word searches every string field. A query starting with
//! `{` is taken as a JSON filter verbatim.

use crate::errors::{MetaError, Result};
use crate::filter::FilterSpec;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashSet;
use std::iter::Peekable;
use std::str::Chars;

/// Translates a query string into a filter specification.
pub trait QueryParser: Send + Sync {
    fn parse(&self, query: &str) -> Result<FilterSpec>;
}

/// The service's query language.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryLanguage;

impl QueryParser for QueryLanguage {
    fn parse(&self, query: &str) -> Result<FilterSpec> {
        parse_query(query)
    }
}

pub fn parse_query(query: &str) -> Result<FilterSpec> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(MetaError::Parse("empty query".into()));
    }
    if trimmed.starts_with('{') {
        let map: Map<String, JsonValue> = serde_json::from_str(trimmed)
            .map_err(|e| MetaError::Parse(format!("invalid JSON query: {e}")))?;
        return Ok(FilterSpec(map));
    }
    let tokens = Lexer::new(trimmed).tokenize().map_err(MetaError::Parse)?;
    let mut parser = TokenParser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let spec = parser.parse_or()?;
    match parser.peek() {
        Token::Eof => Ok(spec),
        Token::RightParen => Err(MetaError::Parse(
            "unbalanced parentheses: unexpected ')'".into(),
        )),
        other => Err(MetaError::Parse(format!("unexpected token {other:?}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
}

impl CmpOp {
    fn operator(self) -> &'static str {
        match self {
            CmpOp::Gt => "$gt",
            CmpOp::Gte => "$gte",
            CmpOp::Lt => "$lt",
            CmpOp::Lte => "$lte",
            CmpOp::Ne => "$ne",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LeftParen,
    RightParen,
    Colon,
    Cmp(CmpOp),
    And,
    Or,
    Not,
    Word(String),
    Quoted(String),
    Eof,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            column: 0,
        }
    }

    fn tokenize(&mut self) -> std::result::Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        tokens.push(Token::Eof);
        Ok(tokens)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.column += 1;
        }
        c
    }

    fn next_token(&mut self) -> std::result::Result<Option<Token>, String> {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
        let Some(c) = self.advance() else {
            return Ok(None);
        };
        let token = match c {
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            ':' => Token::Colon,
            '"' | '\'' => Token::Quoted(self.read_quoted(c)?),
            '>' | '<' => {
                let eq = self.chars.peek() == Some(&'=');
                if eq {
                    self.advance();
                }
                Token::Cmp(match (c, eq) {
                    ('>', false) => CmpOp::Gt,
                    ('>', true) => CmpOp::Gte,
                    ('<', false) => CmpOp::Lt,
                    _ => CmpOp::Lte,
                })
            }
            '!' if self.chars.peek() == Some(&'=') => {
                self.advance();
                Token::Cmp(CmpOp::Ne)
            }
            _ => {
                let word = self.read_word(c);
                match word.as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Word(word),
                }
            }
        };
        Ok(Some(token))
    }

    fn read_quoted(&mut self, quote: char) -> std::result::Result<String, String> {
        let start = self.column;
        let mut out = String::new();
        loop {
            match self.advance() {
                Some('\\') => match self.advance() {
                    Some(c) => out.push(c),
                    None => break,
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => break,
            }
        }
        Err(format!("unterminated quoted string starting at column {start}"))
    }

    fn read_word(&mut self, first: char) -> String {
        let mut out = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | ':' | '"' | '\'') {
                break;
            }
            out.push(c);
            self.advance();
        }
        out
    }
}

/// Cap on combined parenthesis and `NOT` nesting.
const MAX_NESTING: usize = 64;

struct TokenParser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl TokenParser {
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(MetaError::Parse("query nested too deeply".into()));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn next(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn match_token(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn starts_operand(&self) -> bool {
        matches!(
            self.peek(),
            Token::LeftParen | Token::Not | Token::Word(_) | Token::Quoted(_)
        )
    }

    fn parse_or(&mut self) -> Result<FilterSpec> {
        let mut branches = vec![self.parse_and()?];
        while self.match_token(&Token::Or) {
            branches.push(self.parse_and()?);
        }
        if branches.len() == 1 {
            return Ok(branches.remove(0));
        }
        let list = branches.into_iter().map(FilterSpec::into_value).collect();
        let mut spec = FilterSpec::new();
        spec.insert("$or", JsonValue::Array(list));
        Ok(spec)
    }

    fn parse_and(&mut self) -> Result<FilterSpec> {
        let mut parts = vec![self.parse_unary()?];
        loop {
            if self.match_token(&Token::And) {
                parts.push(self.parse_unary()?);
            } else if self.starts_operand() {
                parts.push(self.parse_unary()?);
            } else {
                break;
            }
        }
        Ok(conjunction(parts))
    }

    fn parse_unary(&mut self) -> Result<FilterSpec> {
        if self.match_token(&Token::Not) {
            let inner = self.nested(Self::parse_unary)?;
            let mut spec = FilterSpec::new();
            spec.insert("$nor", JsonValue::Array(vec![inner.into_value()]));
            return Ok(spec);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<FilterSpec> {
        match self.next() {
            Token::LeftParen => {
                let inner = self.nested(Self::parse_or)?;
                if !self.match_token(&Token::RightParen) {
                    return Err(MetaError::Parse(
                        "unbalanced parentheses: expected ')'".into(),
                    ));
                }
                Ok(inner)
            }
            Token::Word(word) => {
                if self.match_token(&Token::Colon) {
                    self.parse_term(word)
                } else {
                    Ok(text_search(word))
                }
            }
            Token::Quoted(text) => Ok(text_search(text)),
            Token::RightParen => Err(MetaError::Parse(
                "unbalanced parentheses: unexpected ')'".into(),
            )),
            Token::Eof => Err(MetaError::Parse("unexpected end of query".into())),
            Token::And | Token::Or => Err(MetaError::Parse("dangling boolean operator".into())),
            other => Err(MetaError::Parse(format!("unexpected token {other:?}"))),
        }
    }

    fn parse_term(&mut self, key: String) -> Result<FilterSpec> {
        let op = match self.peek() {
            Token::Cmp(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        };
        let value = match self.next() {
            Token::Word(w) => match op {
                Some(_) => scalar(&w),
                None => bare_value(&w),
            },
            Token::Quoted(s) => JsonValue::String(s),
            _ => return Err(MetaError::Parse(format!("missing value for key '{key}'"))),
        };
        let value = match op {
            Some(op) => json!({ op.operator(): value }),
            None => value,
        };
        let mut spec = FilterSpec::new();
        spec.insert(key, value);
        Ok(spec)
    }
}

fn text_search(word: String) -> FilterSpec {
    let mut spec = FilterSpec::new();
    spec.insert("$text", json!({ "$search": word }));
    spec
}

/// Flattens conjunctions over distinct keys into one mapping.
fn conjunction(mut parts: Vec<FilterSpec>) -> FilterSpec {
    if parts.len() == 1 {
        return parts.remove(0);
    }
    let mut seen = HashSet::new();
    let disjoint = parts
        .iter()
        .flat_map(|p| p.0.keys())
        .all(|k| seen.insert(k.clone()));
    let mut spec = FilterSpec::new();
    if disjoint {
        for p in parts {
            spec.0.extend(p.0);
        }
    } else {
        let list = parts.into_iter().map(FilterSpec::into_value).collect();
        spec.insert("$and", JsonValue::Array(list));
    }
    spec
}

fn scalar(word: &str) -> JsonValue {
    match word {
        "true" => return JsonValue::Bool(true),
        "false" => return JsonValue::Bool(false),
        _ => {}
    }
    if let Ok(i) = word.parse::<i64>() {
        return JsonValue::from(i);
    }
    if let Ok(f) = word.parse::<f64>() {
        if f.is_finite() {
            return JsonValue::from(f);
        }
    }
    JsonValue::String(word.to_string())
}

fn bare_value(word: &str) -> JsonValue {
    if word.contains('*') {
        let pattern = word
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        return json!({ "$regex": format!("^{pattern}$") });
    }
    scalar(word)
}
