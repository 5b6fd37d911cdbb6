//! Permissive literal parser for context/extra fields that are not JSON.
//!
//! Workers written against PHP loggers sometimes dump arrays with
//! `var_export`-like syntax. This parser accepts that family of literals and
//! builds a [`serde_json::Value`] from it. It only recognises data: there is
//! no expression, call or variable syntax, and nothing is ever evaluated.
//!
//! Accepted:
//! - maps: `{key: value, 'k' => v}` and `['k' => v, ...]` / `array('k' => v)`
//! - lists: `[1, 2]`, `array(1, 2)`
//! - strings: `'single'`, `"double"` (JSON escapes)
//! - numbers, `true`/`false`/`null` (any case), bare identifiers as strings
//! - trailing commas

use serde_json::{Map, Number, Value};
use thiserror::Error;

const MAX_DEPTH: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LiteralError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unexpected character {found:?} at byte {pos}")]
    UnexpectedChar { found: char, pos: usize },

    #[error("trailing input at byte {0}")]
    TrailingInput(usize),

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error("invalid escape sequence at byte {0}")]
    InvalidEscape(usize),

    #[error("nesting deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

/// Parses one complete literal. Leading/trailing whitespace is ignored.
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    let mut parser = Parser { src: text, pos: 0 };
    let value = parser.value(0)?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(LiteralError::TrailingInput(parser.pos));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

enum Entry {
    Keyed(String, Value),
    Positional(Value),
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.src[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> LiteralError {
        match self.peek() {
            Some(found) => LiteralError::UnexpectedChar {
                found,
                pos: self.pos,
            },
            None => LiteralError::UnexpectedEnd,
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(LiteralError::TooDeep);
        }
        self.skip_ws();
        match self.peek() {
            None => Err(LiteralError::UnexpectedEnd),
            Some('{') => {
                self.pos += 1;
                self.collection('}', depth)
            }
            Some('[') => {
                self.pos += 1;
                self.collection(']', depth)
            }
            Some('\'') | Some('"') => self.string().map(Value::String),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => self.number(),
            Some(c) if is_ident_start(c) => {
                let word = self.identifier();
                if word.eq_ignore_ascii_case("array") {
                    self.skip_ws();
                    if self.eat("(") {
                        return self.collection(')', depth);
                    }
                }
                Ok(keyword(&word).unwrap_or(Value::String(word)))
            }
            Some(_) => Err(self.unexpected()),
        }
    }

    /// Parses entries up to `close`. Any keyed entry turns the whole
    /// collection into a map; positional entries then get integer keys the
    /// way PHP arrays number them.
    fn collection(&mut self, close: char, depth: usize) -> Result<Value, LiteralError> {
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += close.len_utf8();
                break;
            }
            entries.push(self.entry(depth)?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                Some(c) if c == close => {}
                _ => return Err(self.unexpected()),
            }
        }

        if entries.iter().all(|e| matches!(e, Entry::Positional(_))) {
            let items = entries
                .into_iter()
                .filter_map(|e| match e {
                    Entry::Positional(v) => Some(v),
                    Entry::Keyed(..) => None,
                })
                .collect();
            return Ok(Value::Array(items));
        }

        let mut map = Map::new();
        let mut next_index: i64 = 0;
        for entry in entries {
            match entry {
                Entry::Keyed(key, value) => {
                    if let Ok(index) = key.parse::<i64>()
                        && index >= next_index
                    {
                        // i64::MAX as a key leaves the counter where it is
                        next_index = index.checked_add(1).unwrap_or(next_index);
                    }
                    map.insert(key, value);
                }
                Entry::Positional(value) => {
                    map.insert(next_index.to_string(), value);
                    next_index = next_index.saturating_add(1);
                }
            }
        }
        Ok(Value::Object(map))
    }

    fn entry(&mut self, depth: usize) -> Result<Entry, LiteralError> {
        let first = self.value(depth + 1)?;
        self.skip_ws();
        if self.eat("=>") || self.eat(":") {
            let key = key_text(first, self.pos)?;
            let value = self.value(depth + 1)?;
            return Ok(Entry::Keyed(key, value));
        }
        Ok(Entry::Positional(first))
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !(c.is_alphanumeric() || c == '_' || c == '-' || c == '.') {
                break;
            }
            self.pos += c.len_utf8();
        }
        self.src[start..self.pos].to_string()
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        while let Some(c) = self.peek() {
            if !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+')) {
                break;
            }
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];
        let trimmed = text.strip_prefix('+').unwrap_or(text);
        if let Ok(i) = trimmed.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| LiteralError::InvalidNumber(text.to_string()))
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
        let mut out = String::new();
        loop {
            let c = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let escape_at = self.pos - 1;
            let escaped = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
            if quote == '\'' {
                // PHP single quotes only escape the quote and the backslash
                match escaped {
                    '\'' | '\\' => out.push(escaped),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                continue;
            }
            match escaped {
                '"' | '\\' | '/' | '\'' => out.push(escaped),
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'u' => {
                    let hex = self
                        .src
                        .get(self.pos..self.pos + 4)
                        .ok_or(LiteralError::InvalidEscape(escape_at))?;
                    let code = u32::from_str_radix(hex, 16)
                        .map_err(|_| LiteralError::InvalidEscape(escape_at))?;
                    let ch = char::from_u32(code).ok_or(LiteralError::InvalidEscape(escape_at))?;
                    out.push(ch);
                    self.pos += 4;
                }
                _ => return Err(LiteralError::InvalidEscape(escape_at)),
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn keyword(word: &str) -> Option<Value> {
    match word.to_ascii_lowercase().as_str() {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "null" => Some(Value::Null),
        _ => None,
    }
}

fn key_text(key: Value, pos: usize) -> Result<String, LiteralError> {
    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err(LiteralError::UnexpectedChar {
            found: ':',
            pos: pos.saturating_sub(1),
        }),
    }
}
