//! The TSDL recursive-descent parser (spec §4.5 "TSDL language", pass 1 of
//! the "Three-pass AST processing").
//!
//! original_source generates this with `bison`/`flex` (`ctf-parser.y`); here
//! it's a hand-written recursive-descent parser over [`super::lexer::Lexer`]
//! output, in the same hand-scanned style as [`crate::ini`] and
//! [`crate::connect`] rather than a parser-combinator crate. Parent-linking
//! (spec §4.5 pass 1) is implicit in the tree shape (see [`super::ast`]);
//! this module only builds the tree and reports `INCOMPLETE` when the token
//! stream ends inside an open block, matching spec §4.5's "truncated or
//! structurally wrong AST → `INCOMPLETE` (caller may append more bytes and
//! retry)".

use super::ast::*;
use super::lexer::{Lexer, Spanned, Token};
use super::DecoderError;

struct Cursor<'a> {
    toks: &'a [Spanned],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(toks: &'a [Spanned]) -> Self {
        Cursor { toks, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn peek_ident(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Ident(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    fn bump(&mut self) -> Option<&Token> {
        let t = self.toks.get(self.pos).map(|(t, _)| t);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn expect(&mut self, tok: &Token) -> Result<(), DecoderError> {
        match self.bump() {
            Some(t) if t == tok => Ok(()),
            Some(other) => Err(DecoderError::Parse(format!("expected {tok:?}, found {other:?}"))),
            None => Err(DecoderError::Incomplete(format!("expected {tok:?}, reached end of input"))),
        }
    }

    /// Consume a keyword identifier (e.g. `trace`, `struct`), failing with
    /// `INCOMPLETE` rather than a hard parse error if we're simply out of
    /// tokens, since more metadata may still arrive (spec §4.5).
    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek_ident() == Some(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> Result<smol_str::SmolStr, DecoderError> {
        match self.bump() {
            Some(Token::Ident(s)) => Ok(s.clone()),
            Some(other) => Err(DecoderError::Parse(format!("expected identifier, found {other:?}"))),
            None => Err(DecoderError::Incomplete("expected identifier, reached end of input".into())),
        }
    }

    /// `:=` is two tokens in our lexer (`Colon` then `Eq`).
    fn eat_coloneq(&mut self) -> bool {
        if matches!(self.toks.get(self.pos), Some((Token::Colon, _)))
            && matches!(self.toks.get(self.pos + 1), Some((Token::Eq, _)))
        {
            self.pos += 2;
            true
        } else {
            false
        }
    }
}

/// Parse a complete TSDL document into a sequence of top-level declarations.
pub fn parse(src: &str) -> Result<Vec<TopDecl>, DecoderError> {
    let toks = Lexer::new(src).tokenize().map_err(DecoderError::Lex)?;
    let mut cur = Cursor::new(&toks);
    let mut decls = Vec::new();
    while !cur.at_end() {
        decls.push(parse_top_decl(&mut cur)?);
    }
    Ok(decls)
}

fn parse_top_decl(cur: &mut Cursor<'_>) -> Result<TopDecl, DecoderError> {
    if cur.eat_keyword("typedef") {
        let (ty, name, array_lens) = parse_typedef_body(cur)?;
        cur.expect(&Token::Semi)?;
        return Ok(TopDecl::Typedef { ty, name, array_lens });
    }
    if cur.eat_keyword("typealias") {
        let (ty, name) = parse_typealias_body(cur)?;
        cur.expect(&Token::Semi)?;
        return Ok(TopDecl::Typealias { ty, name });
    }
    let kw = cur
        .peek_ident()
        .ok_or_else(|| DecoderError::Parse("expected a top-level block keyword".into()))?
        .to_string();
    let ctor: fn(Vec<Entry>) -> TopDecl = match kw.as_str() {
        "trace" => TopDecl::Trace,
        "env" => TopDecl::Env,
        "clock" => TopDecl::Clock,
        "stream" => TopDecl::Stream,
        "event" => TopDecl::Event,
        "callsite" => TopDecl::Callsite,
        other => return Err(DecoderError::Parse(format!("unknown top-level block {other:?}"))),
    };
    cur.pos += 1;
    cur.expect(&Token::LBrace)?;
    let entries = parse_entries(cur)?;
    cur.expect(&Token::RBrace)?;
    cur.expect(&Token::Semi)?;
    Ok(ctor(entries))
}

fn parse_entries(cur: &mut Cursor<'_>) -> Result<Vec<Entry>, DecoderError> {
    let mut out = Vec::new();
    loop {
        if matches!(cur.peek(), Some(Token::RBrace)) || cur.at_end() {
            break;
        }
        out.push(parse_entry(cur)?);
        cur.expect(&Token::Semi)?;
    }
    Ok(out)
}

fn parse_entry(cur: &mut Cursor<'_>) -> Result<Entry, DecoderError> {
    if cur.eat_keyword("typedef") {
        let (ty, name, array_lens) = parse_typedef_body(cur)?;
        return Ok(Entry::Typedef { ty, name, array_lens });
    }
    if cur.eat_keyword("typealias") {
        let (ty, name) = parse_typealias_body(cur)?;
        return Ok(Entry::Typealias { ty, name });
    }
    // A type-expression keyword unambiguously starts a field declaration.
    if is_type_keyword(cur.peek_ident()) {
        let ty = parse_type_expr(cur)?;
        let (name, array_lens) = parse_declarator(cur)?;
        return Ok(Entry::Field(FieldDecl { ty, name, array_lens }));
    }
    // Otherwise: a dotted key, followed by `=` (scalar assign), `:=` (type
    // assign), or a bare declarator (the key was actually a named-type
    // reference, e.g. `uint32_t prev_pid;`).
    let key = parse_dotted_path(cur)?;
    if cur.eat_coloneq() {
        let ty = parse_type_expr(cur)?;
        return Ok(Entry::TypeAssign { key: key.into(), ty });
    }
    if matches!(cur.peek(), Some(Token::Eq)) {
        cur.pos += 1;
        let value = parse_literal(cur)?;
        return Ok(Entry::Assign { key: key.into(), value });
    }
    // Named-type field declaration: `key` was the type name; what follows is
    // the field's declarator.
    let ty = TypeExpr::Named(key.into());
    let (name, array_lens) = parse_declarator(cur)?;
    Ok(Entry::Field(FieldDecl { ty, name, array_lens }))
}

fn is_type_keyword(kw: Option<&str>) -> bool {
    matches!(
        kw,
        Some("integer") | Some("floating_point") | Some("string") | Some("struct")
            | Some("variant") | Some("enum")
    )
}

fn parse_dotted_path(cur: &mut Cursor<'_>) -> Result<String, DecoderError> {
    let mut path = cur.expect_ident()?.to_string();
    while matches!(cur.peek(), Some(Token::Dot)) {
        cur.pos += 1;
        path.push('.');
        path.push_str(&cur.expect_ident()?);
    }
    Ok(path)
}

fn parse_declarator(cur: &mut Cursor<'_>) -> Result<(smol_str::SmolStr, Vec<ArrayLen>), DecoderError> {
    let name = cur.expect_ident()?;
    let mut lens = Vec::new();
    while matches!(cur.peek(), Some(Token::LBracket)) {
        cur.pos += 1;
        let len = match cur.peek() {
            Some(Token::Integer(n)) => {
                let n = *n;
                cur.pos += 1;
                ArrayLen::Static(n.max(0) as u64)
            }
            _ => {
                let path = parse_dotted_path(cur)?;
                ArrayLen::Dynamic(path.into())
            }
        };
        cur.expect(&Token::RBracket)?;
        lens.push(len);
    }
    Ok((name, lens))
}

fn parse_typedef_body(
    cur: &mut Cursor<'_>,
) -> Result<(TypeExpr, smol_str::SmolStr, Vec<ArrayLen>), DecoderError> {
    let ty = parse_type_expr(cur)?;
    let (name, array_lens) = parse_declarator(cur)?;
    Ok((ty, name, array_lens))
}

fn parse_typealias_body(
    cur: &mut Cursor<'_>,
) -> Result<(TypeExpr, smol_str::SmolStr), DecoderError> {
    let ty = parse_type_expr(cur)?;
    if !cur.eat_coloneq() {
        return Err(DecoderError::Parse("expected ':=' in typealias".into()));
    }
    // spec §4.5 "exactly one declarator appears in a typealias": bare name,
    // no array suffix.
    let name = cur.expect_ident()?;
    Ok((ty, name))
}

fn parse_type_params(cur: &mut Cursor<'_>) -> Result<Vec<(smol_str::SmolStr, Literal)>, DecoderError> {
    cur.expect(&Token::LBrace)?;
    let mut params = Vec::new();
    loop {
        if matches!(cur.peek(), Some(Token::RBrace)) {
            break;
        }
        let key = cur.expect_ident()?;
        cur.expect(&Token::Eq)?;
        let value = parse_literal(cur)?;
        params.push((key, value));
        cur.expect(&Token::Semi)?;
    }
    cur.expect(&Token::RBrace)?;
    Ok(params)
}

fn parse_type_expr(cur: &mut Cursor<'_>) -> Result<TypeExpr, DecoderError> {
    if cur.eat_keyword("integer") {
        return Ok(TypeExpr::Integer(parse_type_params(cur)?));
    }
    if cur.eat_keyword("floating_point") {
        return Ok(TypeExpr::FloatingPoint(parse_type_params(cur)?));
    }
    if cur.eat_keyword("string") {
        let params = if matches!(cur.peek(), Some(Token::LBrace)) {
            parse_type_params(cur)?
        } else {
            Vec::new()
        };
        return Ok(TypeExpr::String(params));
    }
    if cur.eat_keyword("struct") {
        // optional struct tag name, e.g. `struct foo { ... }`
        if matches!(cur.peek(), Some(Token::Ident(_))) && matches!(cur.toks.get(cur.pos + 1), Some((Token::LBrace, _))) {
            cur.pos += 1; // tag name, unused (members are unambiguous without it here)
        }
        cur.expect(&Token::LBrace)?;
        let mut members = Vec::new();
        while !matches!(cur.peek(), Some(Token::RBrace)) {
            members.push(parse_struct_member(cur)?);
            cur.expect(&Token::Semi)?;
        }
        cur.expect(&Token::RBrace)?;
        let align = if cur.eat_keyword("align") {
            cur.expect(&Token::LParen)?;
            let n = match cur.bump() {
                Some(Token::Integer(n)) => *n as u32,
                other => return Err(DecoderError::Parse(format!("expected alignment integer, found {other:?}"))),
            };
            cur.expect(&Token::RParen)?;
            Some(n)
        } else {
            None
        };
        return Ok(TypeExpr::Struct { members, align });
    }
    if cur.eat_keyword("variant") {
        cur.expect(&Token::Lt)?;
        let tag = parse_dotted_path(cur)?;
        cur.expect(&Token::Gt)?;
        cur.expect(&Token::LBrace)?;
        let mut members = Vec::new();
        while !matches!(cur.peek(), Some(Token::RBrace)) {
            members.push(parse_struct_member(cur)?);
            cur.expect(&Token::Semi)?;
        }
        cur.expect(&Token::RBrace)?;
        return Ok(TypeExpr::Variant { tag: tag.into(), members });
    }
    if cur.eat_keyword("enum") {
        // optional tag name
        if matches!(cur.peek(), Some(Token::Ident(_))) && matches!(cur.toks.get(cur.pos + 1), Some((Token::Colon, _))) {
            cur.pos += 1;
        }
        cur.expect(&Token::Colon)?;
        let base = Box::new(parse_type_expr(cur)?);
        cur.expect(&Token::LBrace)?;
        let mut enumerators = Vec::new();
        let mut next_auto = 0i64;
        loop {
            if matches!(cur.peek(), Some(Token::RBrace)) {
                break;
            }
            let label = match cur.bump() {
                Some(Token::Ident(s)) => s.clone(),
                Some(Token::Str(s)) => s.clone(),
                other => return Err(DecoderError::Parse(format!("expected enumerator label, found {other:?}"))),
            };
            let explicit_range = if matches!(cur.peek(), Some(Token::Eq)) {
                cur.pos += 1;
                let start = parse_int_literal(cur)?;
                let end = if matches!(cur.peek(), Some(Token::Ellipsis)) {
                    cur.pos += 1;
                    parse_int_literal(cur)?
                } else {
                    start
                };
                next_auto = end + 1;
                Some((start, end))
            } else {
                let r = (next_auto, next_auto);
                next_auto += 1;
                Some(r)
            };
            enumerators.push(EnumeratorAst { label, explicit_range });
            if matches!(cur.peek(), Some(Token::Comma)) {
                cur.pos += 1;
            } else {
                break;
            }
        }
        cur.expect(&Token::RBrace)?;
        return Ok(TypeExpr::Enum { base, enumerators });
    }
    // Named reference to a typedef/typealias.
    let name = parse_dotted_path(cur)?;
    Ok(TypeExpr::Named(name.into()))
}

fn parse_struct_member(cur: &mut Cursor<'_>) -> Result<StructMember, DecoderError> {
    if cur.eat_keyword("typedef") {
        let (ty, name, array_lens) = parse_typedef_body(cur)?;
        return Ok(StructMember::Typedef { ty, name, array_lens });
    }
    let ty = parse_type_expr(cur)?;
    let (name, array_lens) = parse_declarator(cur)?;
    Ok(StructMember::Field(FieldDecl { ty, name, array_lens }))
}

fn parse_int_literal(cur: &mut Cursor<'_>) -> Result<i64, DecoderError> {
    match cur.bump() {
        Some(Token::Integer(n)) => Ok(*n),
        other => Err(DecoderError::Parse(format!("expected integer literal, found {other:?}"))),
    }
}

fn parse_literal(cur: &mut Cursor<'_>) -> Result<Literal, DecoderError> {
    match cur.bump() {
        Some(Token::Integer(n)) => Ok(Literal::Int(*n)),
        Some(Token::Float(f)) => Ok(Literal::Float(*f)),
        Some(Token::Str(s)) => Ok(Literal::Str(s.clone())),
        Some(Token::Ident(s)) => {
            let mut path = s.to_string();
            while matches!(cur.peek(), Some(Token::Dot)) {
                cur.pos += 1;
                path.push('.');
                path.push_str(&cur.expect_ident()?);
            }
            Ok(Literal::Ident(path.into()))
        }
        Some(other) => Err(DecoderError::Parse(format!("expected a value, found {other:?}"))),
        None => Err(DecoderError::Incomplete("expected a value, reached end of input".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trace_and_clock_blocks() {
        let src = r#"
            trace {
                major = 1;
                minor = 8;
                uuid = "abc";
                byte_order = le;
            };
            clock {
                name = mono;
                freq = 1000000000;
            };
        "#;
        let decls = parse(src).unwrap();
        assert!(matches!(decls[0], TopDecl::Trace(_)));
        assert!(matches!(decls[1], TopDecl::Clock(_)));
    }

    #[test]
    fn parses_stream_and_event_with_struct_fields() {
        let src = r#"
            stream {
                id = 0;
                event.header := struct {
                    integer { size = 32; } id;
                };
            };
            event {
                name = "sched_switch";
                id = 0;
                stream_id = 0;
                fields := struct {
                    integer { size = 32; signed = true; } prev_pid;
                    string name;
                };
            };
        "#;
        let decls = parse(src).unwrap();
        assert!(matches!(decls[0], TopDecl::Stream(_)));
        assert!(matches!(decls[1], TopDecl::Event(_)));
    }

    #[test]
    fn parses_variant_and_enum() {
        let src = r#"
            event {
                name = "x";
                id = 0;
                stream_id = 0;
                fields := struct {
                    enum : integer { size = 8; } { A, B, C } tag;
                    variant <tag> {
                        integer { size = 32; } A;
                        string B;
                    } payload;
                };
            };
        "#;
        parse(src).unwrap();
    }

    #[test]
    fn truncated_document_is_incomplete() {
        let src = "trace { major = 1;";
        let err = parse(src).unwrap_err();
        assert!(matches!(err, DecoderError::Incomplete(_)));
    }

    #[test]
    fn parses_callsite_and_env_blocks() {
        let src = r#"
            env {
                hostname = "host";
                tracer_major = 2;
            };
            callsite {
                name = "foo";
                ip = 0x1000;
            };
        "#;
        let decls = parse(src).unwrap();
        assert!(matches!(decls[0], TopDecl::Env(_)));
        assert!(matches!(decls[1], TopDecl::Callsite(_)));
    }
}
