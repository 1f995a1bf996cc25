//! Strict literal parser for string-encoded plan fields.
//!
//! The model emits `coordinates` and `api_body` as strings holding a literal
//! (`"[[0, 0], [1, 0]]"`, `"{'limit': 10}"`). This module upgrades such a
//! string into a [`serde_json::Value`] with a small recursive-descent parser.
//!
//! Accepted grammar (and nothing else):
//! - numbers: `12`, `-3`, `+4`, `1.5`, `.5`, `2e10`
//! - strings: single or double quoted, with backslash escapes
//! - constants: `True` / `False` / `None` and `true` / `false` / `null`
//! - lists `[a, b]`, tuples `(a, b)` (both become arrays), objects `{k: v}`
//!   with string keys; trailing commas are allowed
//!
//! Names, calls, operators and any trailing input are rejected, so parsing
//! can never evaluate anything.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Maximum container nesting depth.
const MAX_DEPTH: usize = 64;

/// A literal that could not be parsed, with the byte offset of the failure.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

/// Parse a complete literal. The whole input must be consumed.
pub fn parse(input: &str) -> Result<Value, LiteralError> {
    let mut parser = Parser { src: input, pos: 0 };
    parser.skip_ws();
    let value = parser.value(0)?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), LiteralError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some(b'[') => {
                self.pos += 1;
                self.sequence(b']', depth).map(Value::Array)
            }
            Some(b'(') => {
                self.pos += 1;
                self.tuple(depth)
            }
            Some(b'{') => {
                self.pos += 1;
                self.object(depth)
            }
            Some(b'"') | Some(b'\'') => self.string().map(Value::String),
            Some(b) if b == b'-' || b == b'+' || b == b'.' || b.is_ascii_digit() => self.number(),
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.constant(),
            Some(_) => Err(self.error("unexpected character")),
        }
    }

    /// Comma-separated values up to `close`; the opener is already consumed.
    fn sequence(&mut self, close: u8, depth: usize) -> Result<Vec<Value>, LiteralError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.value(depth + 1)?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b) if b == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                None => return Err(self.error("unexpected end of input")),
                Some(_) => return Err(self.error(format!("expected ',' or '{}'", close as char))),
            }
        }
    }

    /// `(a)` is just `a`; `()`, `(a,)` and `(a, b)` are arrays.
    fn tuple(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.skip_ws();
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(Value::Array(Vec::new()));
        }
        let first = self.value(depth + 1)?;
        self.skip_ws();
        match self.peek() {
            Some(b')') => {
                self.pos += 1;
                Ok(first)
            }
            Some(b',') => {
                self.pos += 1;
                let mut items = vec![first];
                items.extend(self.sequence(b')', depth)?);
                Ok(Value::Array(items))
            }
            None => Err(self.error("unexpected end of input")),
            Some(_) => Err(self.error("expected ',' or ')'")),
        }
    }

    fn object(&mut self, depth: usize) -> Result<Value, LiteralError> {
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                Some(b'"') | Some(b'\'') => {}
                None => return Err(self.error("unexpected end of input")),
                Some(_) => return Err(self.error("object keys must be strings")),
            }
            let key = self.string()?;
            self.skip_ws();
            self.expect(b':')?;
            self.skip_ws();
            let value = self.value(depth + 1)?;
            map.insert(key, value);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                None => return Err(self.error("unexpected end of input")),
                Some(_) => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let start = self.pos;
        let quote = self.src.as_bytes()[self.pos] as char;
        self.pos += 1;

        let mut out = String::new();
        let mut chars = self.src[self.pos..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                c if c == quote => {
                    self.pos += i + c.len_utf8();
                    return Ok(out);
                }
                '\n' => {
                    self.pos += i;
                    return Err(self.error("unescaped newline in string"));
                }
                '\\' => {
                    let Some((j, esc)) = chars.next() else { break };
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' | '/' => out.push(esc),
                        '\n' => {}
                        'x' | 'u' => {
                            let width = if esc == 'x' { 2 } else { 4 };
                            let digits_at = self.pos + j + 1;
                            let digits = self.src.get(digits_at..digits_at + width);
                            let decoded = digits
                                .filter(|d| d.bytes().all(|b| b.is_ascii_hexdigit()))
                                .and_then(|d| u32::from_str_radix(d, 16).ok())
                                .and_then(char::from_u32);
                            let Some(ch) = decoded else {
                                self.pos = digits_at;
                                return Err(self.error("invalid escape sequence"));
                            };
                            out.push(ch);
                            for _ in 0..width {
                                chars.next();
                            }
                        }
                        _ => {
                            self.pos += j;
                            return Err(self.error(format!("unknown escape '\\{esc}'")));
                        }
                    }
                }
                c => out.push(c),
            }
        }
        self.pos = start;
        Err(self.error("unterminated string"))
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        let mut end = self.pos;

        if matches!(bytes.get(end), Some(b'-') | Some(b'+')) {
            end += 1;
        }
        let int_start = end;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
        let mut int_digits = end - int_start;
        let mut is_float = false;

        if bytes.get(end) == Some(&b'.') {
            is_float = true;
            end += 1;
            let frac_start = end;
            while bytes.get(end).is_some_and(u8::is_ascii_digit) {
                end += 1;
            }
            int_digits += end - frac_start;
        }
        if int_digits == 0 {
            return Err(self.error("invalid number"));
        }
        if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
            is_float = true;
            end += 1;
            if matches!(bytes.get(end), Some(b'-') | Some(b'+')) {
                end += 1;
            }
            let exp_start = end;
            while bytes.get(end).is_some_and(u8::is_ascii_digit) {
                end += 1;
            }
            if end == exp_start {
                self.pos = end;
                return Err(self.error("invalid exponent"));
            }
        }
        if bytes.get(end).is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_') {
            self.pos = end;
            return Err(self.error("invalid number"));
        }

        let text = self.src[start..end].trim_start_matches('+');
        self.pos = end;

        if !is_float {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Value::Number(n.into()));
            }
            if let Ok(n) = text.parse::<u64>() {
                return Ok(Value::Number(n.into()));
            }
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| LiteralError {
                offset: start,
                message: "number out of range".into(),
            })
    }

    fn constant(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        let mut end = self.pos;
        while bytes
            .get(end)
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        {
            end += 1;
        }
        let value = match &self.src[start..end] {
            "True" | "true" => Value::Bool(true),
            "False" | "false" => Value::Bool(false),
            "None" | "null" => Value::Null,
            name => {
                return Err(LiteralError {
                    offset: start,
                    message: format!("names are not allowed: '{name}'"),
                });
            }
        };
        self.pos = end;
        Ok(value)
    }
}
