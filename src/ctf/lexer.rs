//! The TSDL tokenizer (spec §4.5 "TSDL language").
//!
//! Case-sensitive, skips whitespace and `/* ... */`/`// ...` comments,
//! recognises identifiers, `0b`/`0`/`0x`-prefixed integers, doubles, and
//! double-quoted strings with escapes — a hand-rolled scanner in the same
//! style as [`crate::ini`], not a parser-combinator crate.

use smol_str::SmolStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(SmolStr),
    Integer(i64),
    Float(f64),
    Str(SmolStr),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Semi,
    Comma,
    Colon,
    Eq,
    Dot,
    Arrow,
    Ellipsis,
    Lt,
    Gt,
    Star,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated string literal starting at byte {0}")]
    UnterminatedString(usize),
    #[error("invalid escape sequence at byte {0}")]
    InvalidEscape(usize),
    #[error("unterminated block comment starting at byte {0}")]
    UnterminatedComment(usize),
    #[error("unexpected character {0:?} at byte {1}")]
    UnexpectedChar(char, usize),
    #[error("invalid numeric literal at byte {0}")]
    InvalidNumber(usize),
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Continuation characters for an identifier. spec §4.5 writes the
/// identifier grammar as `[A-Za-z_][A-Za-z0-9_.-:]*`, but `.` is also one of
/// the three unary-expression link kinds the grammar calls out separately
/// (`.`, `->`, `...`) — scoped references like `stream.packet.context` are
/// dotted chains of plain identifiers, not single tokens, per
/// original_source's `ctf-parser.y` grammar for `unary_expression`. `.` is
/// therefore tokenized on its own (see [`Token::Dot`]); `-` and `:` remain
/// valid continuation characters.
fn is_ident_cont(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':')
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

/// A token plus the byte offset it started at, for diagnostics.
pub type Spanned = (Token, usize);

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut it = self.src[self.pos..].chars();
        it.next();
        it.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek2() == Some('*') => {
                    let start = self.pos;
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            None => return Err(LexError::UnterminatedComment(start)),
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                }
                Some('/') if self.peek2() == Some('/') => {
                    while !matches!(self.peek(), Some('\n') | None) {
                        self.bump();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_string(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        self.bump(); // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(LexError::UnterminatedString(start)),
                Some('"') => break,
                Some('\\') => {
                    let esc_pos = self.pos - 1;
                    match self.bump() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some('r') => out.push('\r'),
                        Some('\\') => out.push('\\'),
                        Some('"') => out.push('"'),
                        Some('0') => out.push('\0'),
                        _ => return Err(LexError::InvalidEscape(esc_pos)),
                    }
                }
                Some(c) => out.push(c),
            }
        }
        Ok(Token::Str(out.into()))
    }

    fn lex_number(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek2(), Some('x') | Some('X')) {
            self.bump();
            self.bump();
            let digit_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = &self.src[digit_start..self.pos];
            return i64::from_str_radix(digits, 16)
                .or_else(|_| u64::from_str_radix(digits, 16).map(|v| v as i64))
                .map(Token::Integer)
                .map_err(|_| LexError::InvalidNumber(start));
        }
        if self.peek() == Some('0') && matches!(self.peek2(), Some('b') | Some('B')) {
            self.bump();
            self.bump();
            let digit_start = self.pos;
            while matches!(self.peek(), Some('0') | Some('1')) {
                self.bump();
            }
            return i64::from_str_radix(&self.src[digit_start..self.pos], 2)
                .map(Token::Integer)
                .map_err(|_| LexError::InvalidNumber(start));
        }
        if self.peek() == Some('0') && matches!(self.peek2(), Some(c) if c.is_ascii_digit()) {
            self.bump();
            let digit_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
            return i64::from_str_radix(&self.src[digit_start..self.pos], 8)
                .map(Token::Integer)
                .map_err(|_| LexError::InvalidNumber(start));
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        let mut is_float = false;
        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = &self.src[start..self.pos];
        if is_float {
            text.parse::<f64>().map(Token::Float).map_err(|_| LexError::InvalidNumber(start))
        } else {
            text.parse::<i64>().map(Token::Integer).map_err(|_| LexError::InvalidNumber(start))
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Spanned>, LexError> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let token = match c {
            '{' => { self.bump(); Token::LBrace }
            '}' => { self.bump(); Token::RBrace }
            '[' => { self.bump(); Token::LBracket }
            ']' => { self.bump(); Token::RBracket }
            '(' => { self.bump(); Token::LParen }
            ')' => { self.bump(); Token::RParen }
            ';' => { self.bump(); Token::Semi }
            ',' => { self.bump(); Token::Comma }
            ':' => { self.bump(); Token::Colon }
            '=' => { self.bump(); Token::Eq }
            '<' => { self.bump(); Token::Lt }
            '>' => { self.bump(); Token::Gt }
            '*' => { self.bump(); Token::Star }
            '"' => self.lex_string()?,
            '-' if matches!(self.peek2(), Some(c) if c.is_ascii_digit()) => self.lex_number()?,
            c if c.is_ascii_digit() => self.lex_number()?,
            '.' if self.src[self.pos..].starts_with("...") => {
                self.pos += 3;
                Token::Ellipsis
            }
            '.' => { self.bump(); Token::Dot }
            '-' if self.peek2() == Some('>') => {
                self.pos += 2;
                Token::Arrow
            }
            c if is_ident_start(c) => {
                let begin = self.pos;
                self.bump();
                while matches!(self.peek(), Some(c) if is_ident_cont(c)) {
                    self.bump();
                }
                Token::Ident(self.src[begin..self.pos].into())
            }
            other => return Err(LexError::UnexpectedChar(other, start)),
        };
        Ok(Some((token, start)))
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>, LexError> {
        let mut out = Vec::new();
        while let Some(tok) = self.next_token()? {
            out.push(tok);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn strips_comments() {
        assert_eq!(toks("/* hi */ a // trailing\n"), vec![Token::Ident("a".into())]);
    }

    #[test]
    fn integer_bases() {
        assert_eq!(toks("0x10 0b101 017 42"), vec![
            Token::Integer(16), Token::Integer(5), Token::Integer(15), Token::Integer(42),
        ]);
    }

    #[test]
    fn scoped_identifier() {
        assert_eq!(
            toks("event.name"),
            vec![Token::Ident("event".into()), Token::Dot, Token::Ident("name".into())]
        );
    }

    #[test]
    fn string_with_escapes() {
        assert_eq!(toks(r#""a\nb""#), vec![Token::Str("a\nb".into())]);
    }

    #[test]
    fn ellipsis_vs_dot() {
        assert_eq!(toks("a...b a.b"), vec![
            Token::Ident("a".into()), Token::Ellipsis, Token::Ident("b".into()),
            Token::Ident("a".into()), Token::Dot, Token::Ident("b".into()),
        ]);
    }
}
