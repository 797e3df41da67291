//! The component parameter ("INI") parser.
//!
//! Grammar: `KEY = VALUE (, KEY = VALUE)*`. This is a hand-rolled
//! six-state machine — no parser-combinator crate, manual byte scanning, a
//! `thiserror` error enum carrying the byte offset of the failure so the
//! caller can point a caret at it.

use crate::value::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    MapKey,
    Comma,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IniError {
    #[error("expected a key at column {0}")]
    ExpectedKey(usize),
    #[error("expected '=' at column {0}")]
    ExpectedEqual(usize),
    #[error("expected a value at column {0}")]
    ExpectedValue(usize),
    #[error("expected ',' or end of input at column {0}")]
    ExpectedCommaOrEnd(usize),
    #[error("unterminated string starting at column {0}")]
    UnterminatedString(usize),
    #[error("invalid escape sequence at column {0}")]
    InvalidEscape(usize),
    #[error("integer literal at column {0} is out of range for a signed 64-bit integer")]
    IntegerOutOfRange(usize),
    #[error("invalid numeric literal at column {0}")]
    InvalidNumber(usize),
    #[error("duplicate key {key:?} at column {col}")]
    DuplicateKey { key: String, col: usize },
}

impl IniError {
    /// The byte column the diagnostic should place its caret at.
    pub fn column(&self) -> usize {
        match self {
            IniError::ExpectedKey(c)
            | IniError::ExpectedEqual(c)
            | IniError::ExpectedValue(c)
            | IniError::ExpectedCommaOrEnd(c)
            | IniError::UnterminatedString(c)
            | IniError::InvalidEscape(c)
            | IniError::IntegerOutOfRange(c)
            | IniError::InvalidNumber(c) => *c,
            IniError::DuplicateKey { col, .. } => *col,
        }
    }

    /// Render a two-line diagnostic: the original argument, then a caret
    /// pointing at the offending column.
    pub fn render(&self, source: &str) -> String {
        let col = self.column();
        format!("{source}\n{}^\n{self}", " ".repeat(col))
    }
}

fn is_key_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}
fn is_key_cont(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-')
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }
    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }
    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }
    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

/// Parse a `--params`-style argument into a map [`Value`].
pub fn parse(source: &str) -> Result<Value, IniError> {
    let map = Value::map();
    let mut sc = Scanner::new(source);
    let mut state = State::MapKey;
    sc.skip_ws();
    if sc.eof() {
        return Ok(map);
    }
    loop {
        match state {
            State::MapKey => {
                sc.skip_ws();
                let start = sc.pos;
                let Some(c) = sc.peek() else {
                    return Err(IniError::ExpectedKey(sc.pos));
                };
                if !is_key_start(c) {
                    return Err(IniError::ExpectedKey(sc.pos));
                }
                sc.bump();
                while matches!(sc.peek(), Some(c) if is_key_cont(c)) {
                    sc.bump();
                }
                let key = sc.src[start..sc.pos].to_string();
                sc.skip_ws();
                let eq_col = sc.pos;
                if sc.peek() != Some('=') {
                    return Err(IniError::ExpectedEqual(eq_col));
                }
                sc.bump();
                sc.skip_ws();
                let (value, _) = parse_value(&mut sc)?;
                if map.map_contains(&key) {
                    return Err(IniError::DuplicateKey { key, col: start });
                }
                map.map_insert_strict(key, value)
                    .expect("fresh map is mutable");
                sc.skip_ws();
                state = State::Comma;
            }
            State::Comma => {
                if sc.eof() {
                    break;
                }
                if sc.peek() == Some(',') {
                    sc.bump();
                    sc.skip_ws();
                    state = State::MapKey;
                } else {
                    return Err(IniError::ExpectedCommaOrEnd(sc.pos));
                }
            }
        }
    }
    Ok(map)
}

fn parse_value(sc: &mut Scanner<'_>) -> Result<(Value, usize), IniError> {
    let start = sc.pos;
    let Some(c) = sc.peek() else {
        return Err(IniError::ExpectedValue(start));
    };
    if c == '"' {
        return parse_string(sc).map(|v| (v, sc.pos));
    }
    if c == '-' || c.is_ascii_digit() {
        return parse_number(sc).map(|v| (v, sc.pos));
    }
    if is_key_start(c) {
        let ident_start = sc.pos;
        sc.bump();
        while matches!(sc.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            sc.bump();
        }
        let ident = &sc.src[ident_start..sc.pos];
        let value = match ident {
            "null" | "nul" | "NULL" => Value::Null,
            "true" | "TRUE" | "yes" | "YES" => Value::Bool(true),
            "false" | "FALSE" | "no" | "NO" => Value::Bool(false),
            other => Value::string(other),
        };
        return Ok((value, sc.pos));
    }
    Err(IniError::ExpectedValue(start))
}

fn parse_string(sc: &mut Scanner<'_>) -> Result<Value, IniError> {
    let start = sc.pos;
    sc.bump(); // opening quote
    let mut out = String::new();
    loop {
        match sc.bump() {
            None => return Err(IniError::UnterminatedString(start)),
            Some('"') => break,
            Some('\\') => {
                let esc_col = sc.pos - 1;
                match sc.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some('0') => out.push('\0'),
                    _ => return Err(IniError::InvalidEscape(esc_col)),
                }
            }
            Some(c) => out.push(c),
        }
    }
    Ok(Value::string(out))
}

fn parse_number(sc: &mut Scanner<'_>) -> Result<Value, IniError> {
    let start = sc.pos;
    let negative = sc.peek() == Some('-');
    if negative {
        sc.bump();
    }
    // radix-prefixed integer literals
    if sc.peek() == Some('0') {
        let save = sc.pos;
        sc.bump();
        match sc.peek() {
            Some('x') | Some('X') => {
                sc.bump();
                let digit_start = sc.pos;
                while matches!(sc.peek(), Some(c) if c.is_ascii_hexdigit()) {
                    sc.bump();
                }
                return finish_radix_int(&sc.src[digit_start..sc.pos], 16, negative, start);
            }
            Some('b') | Some('B') => {
                sc.bump();
                let digit_start = sc.pos;
                while matches!(sc.peek(), Some(c) if c == '0' || c == '1') {
                    sc.bump();
                }
                return finish_radix_int(&sc.src[digit_start..sc.pos], 2, negative, start);
            }
            Some(c) if c.is_ascii_digit() => {
                let digit_start = sc.pos;
                while matches!(sc.peek(), Some(c) if c.is_ascii_digit()) {
                    sc.bump();
                }
                return finish_radix_int(&sc.src[digit_start..sc.pos], 8, negative, start);
            }
            _ => {
                sc.pos = save;
            }
        }
    }
    let digit_start = sc.pos;
    while matches!(sc.peek(), Some(c) if c.is_ascii_digit()) {
        sc.bump();
    }
    let mut is_float = false;
    if sc.peek() == Some('.') {
        is_float = true;
        sc.bump();
        while matches!(sc.peek(), Some(c) if c.is_ascii_digit()) {
            sc.bump();
        }
    }
    if matches!(sc.peek(), Some('e') | Some('E')) {
        is_float = true;
        sc.bump();
        if matches!(sc.peek(), Some('+') | Some('-')) {
            sc.bump();
        }
        while matches!(sc.peek(), Some(c) if c.is_ascii_digit()) {
            sc.bump();
        }
    }
    let text = &sc.src[start..sc.pos];
    if digit_start == sc.pos && !is_float {
        return Err(IniError::InvalidNumber(start));
    }
    if is_float {
        text.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| IniError::InvalidNumber(start))
    } else {
        text.parse::<i64>()
            .map(Value::Int)
            .map_err(|_| IniError::IntegerOutOfRange(start))
    }
}

fn finish_radix_int(
    digits: &str,
    radix: u32,
    negative: bool,
    start: usize,
) -> Result<Value, IniError> {
    if digits.is_empty() {
        return Err(IniError::InvalidNumber(start));
    }
    let magnitude = u64::from_str_radix(digits, radix).map_err(|_| IniError::IntegerOutOfRange(start))?;
    let value = if negative {
        if magnitude > i64::MAX as u64 + 1 {
            return Err(IniError::IntegerOutOfRange(start));
        }
        (magnitude as i128 * -1) as i64
    } else {
        if magnitude > i64::MAX as u64 {
            return Err(IniError::IntegerOutOfRange(start));
        }
        magnitude as i64
    };
    Ok(Value::Int(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_map() {
        let v = parse(r#"a=1,b=-2,c="x",d=true,e=null"#).unwrap();
        assert_eq!(v.map_len(), Some(5));
        assert_eq!(v.map_get("a").unwrap().as_int(), Some(1));
        assert_eq!(v.map_get("b").unwrap().as_int(), Some(-2));
        assert_eq!(v.map_get("c").unwrap().as_str(), Some("x"));
        assert_eq!(v.map_get("d").unwrap().as_bool(), Some(true));
        assert!(v.map_get("e").unwrap().is_null());
    }

    #[test]
    fn duplicate_key_points_at_second_occurrence() {
        let err = parse("a=1,a=2").unwrap_err();
        assert!(matches!(err, IniError::DuplicateKey { ref key, .. } if key == "a"));
        // second `a` starts at byte 4
        assert_eq!(err.column(), 4);
    }

    #[test]
    fn oversized_hex_literal_rejected() {
        let err = parse("a=0x8000000000000000").unwrap_err();
        assert!(matches!(err, IniError::IntegerOutOfRange(_)));
    }

    #[test]
    fn binary_and_octal_literals() {
        let v = parse("a=0b101,b=017").unwrap();
        assert_eq!(v.map_get("a").unwrap().as_int(), Some(5));
        assert_eq!(v.map_get("b").unwrap().as_int(), Some(15));
    }

    #[test]
    fn scientific_float() {
        let v = parse("a=1.5e2").unwrap();
        assert_eq!(v.map_get("a").unwrap().as_float(), Some(150.0));
    }

    #[test]
    fn bare_identifier_is_a_string() {
        let v = parse("a=hello").unwrap();
        assert_eq!(v.map_get("a").unwrap().as_str(), Some("hello"));
    }
}
