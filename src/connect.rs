//! The `--connect` argument parser.
//!
//! Grammar: `UP[.UPGLOB]:DOWN[.DOWNGLOB]`. Each of the four fields is
//! scanned by hand (no parser-combinator crate). The parser is a four-state
//! FSM walking the fields in order: upstream name, optional upstream glob,
//! downstream name, optional downstream glob.

use crate::glob;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    UpstreamName,
    UpstreamGlob,
    DownstreamName,
    DownstreamGlob,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Field::UpstreamName => "upstream component name",
            Field::UpstreamGlob => "upstream port glob",
            Field::DownstreamName => "downstream component name",
            Field::DownstreamGlob => "downstream port glob",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("non-printable character at byte {0}")]
    NonPrintable(usize),
    #[error("{0} is empty")]
    EmptyField(Field),
    #[error("unterminated escape sequence at byte {0}")]
    UnterminatedEscape(usize),
    #[error("reserved glob character {ch:?} at byte {pos} must be escaped")]
    ReservedGlobChar { pos: usize, ch: char },
    #[error("unexpected '.' at byte {pos}: a component/glob pair may only contain one unescaped '.'")]
    ExtraDot { pos: usize },
    #[error("missing ':' separating upstream from downstream")]
    MissingColon,
    #[error("unexpected trailing characters at byte {0}")]
    TrailingCharacters(usize),
}

/// A parsed `--connect` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub upstream: String,
    pub upstream_glob: String,
    pub downstream: String,
    pub downstream_glob: String,
    /// The original textual argument, kept for error messages.
    pub original: String,
}

impl Connection {
    pub fn upstream_port_matches(&self, port_name: &str) -> bool {
        glob::matches(&self.upstream_glob, port_name)
    }
    pub fn downstream_port_matches(&self, port_name: &str) -> bool {
        glob::matches(&self.downstream_glob, port_name)
    }
}

fn is_allowed_control(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{0B}')
}

fn check_printable(s: &str) -> Result<(), ConnectError> {
    for (i, c) in s.char_indices() {
        if c.is_control() && !is_allowed_control(c) {
            return Err(ConnectError::NonPrintable(i));
        }
    }
    Ok(())
}

/// Scan a component-name field: decodes `\`-escapes for `\`, `.`, `:` and
/// stops at the first unescaped `.` or `:`, or the end of the string.
///
/// Returns the decoded name, which terminator (if any) ended it, and the
/// byte offset immediately after the terminator (or end of string).
fn scan_name(s: &str, base: usize) -> Result<(String, Option<char>, usize), ConnectError> {
    let mut out = String::new();
    let mut chars = s.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        match c {
            '\\' => {
                chars.next();
                match chars.next() {
                    Some((_, e)) if matches!(e, '\\' | '.' | ':') => out.push(e),
                    Some((p, _)) => return Err(ConnectError::UnterminatedEscape(base + p)),
                    None => return Err(ConnectError::UnterminatedEscape(base + i)),
                }
            }
            '.' | ':' => {
                let after = i + c.len_utf8();
                return Ok((out, Some(c), base + after));
            }
            other => {
                out.push(other);
                chars.next();
            }
        }
    }
    Ok((out, None, base + s.len()))
}

/// Scan a glob field: keeps `\`-escapes verbatim (so [`glob::matches`] can
/// interpret them later) but rejects an unescaped `.` (only one dot per
/// component/glob pair is legal), `?`, or `[` (reserved for future use).
///
/// `terminator`, if given, is the single character that ends the field (e.g.
/// `:` after an upstream glob); `None` means the field runs to end of string.
fn scan_glob(
    s: &str,
    base: usize,
    terminator: Option<char>,
) -> Result<(String, usize), ConnectError> {
    let mut out = String::new();
    let mut chars = s.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        if Some(c) == terminator {
            let after = i + c.len_utf8();
            return Ok((out, base + after));
        }
        match c {
            '\\' => {
                chars.next();
                match chars.next() {
                    Some((_, e)) if matches!(e, '\\' | '.' | ':' | '*' | '?' | '[') => {
                        out.push('\\');
                        out.push(e);
                    }
                    Some((p, _)) => return Err(ConnectError::UnterminatedEscape(base + p)),
                    None => return Err(ConnectError::UnterminatedEscape(base + i)),
                }
            }
            '.' => return Err(ConnectError::ExtraDot { pos: base + i }),
            '?' | '[' => {
                return Err(ConnectError::ReservedGlobChar { pos: base + i, ch: c });
            }
            other => {
                out.push(other);
                chars.next();
            }
        }
    }
    match terminator {
        Some(_) => Err(ConnectError::MissingColon),
        None => Ok((out, base + s.len())),
    }
}

/// Parse a `--connect` argument into a [`Connection`].
pub fn parse(arg: &str) -> Result<Connection, ConnectError> {
    check_printable(arg)?;

    let (upstream, up_term, mut pos) = scan_name(arg, 0)?;
    if upstream.is_empty() {
        return Err(ConnectError::EmptyField(Field::UpstreamName));
    }

    let upstream_glob = match up_term {
        Some('.') => {
            let (g, next) = scan_glob(&arg[pos..], pos, Some(':'))?;
            pos = next;
            if g.is_empty() {
                return Err(ConnectError::EmptyField(Field::UpstreamGlob));
            }
            g
        }
        Some(':') => "*".to_string(),
        Some(_) => unreachable!("scan_name only terminates on '.' or ':'"),
        None => return Err(ConnectError::MissingColon),
    };

    let (downstream, down_term, mut dpos) = scan_name(&arg[pos..], pos)?;
    if downstream.is_empty() {
        return Err(ConnectError::EmptyField(Field::DownstreamName));
    }

    let downstream_glob = match down_term {
        Some('.') => {
            let (g, next) = scan_glob(&arg[dpos..], dpos, None)?;
            dpos = next;
            if g.is_empty() {
                return Err(ConnectError::EmptyField(Field::DownstreamGlob));
            }
            g
        }
        Some(':') => {
            // a second, unescaped ':' after the downstream name is not part
            // of the grammar at all.
            return Err(ConnectError::TrailingCharacters(dpos - 1));
        }
        Some(_) => unreachable!("scan_name only terminates on '.' or ':'"),
        None => "*".to_string(),
    };

    if dpos != arg.len() {
        return Err(ConnectError::TrailingCharacters(dpos));
    }

    Ok(Connection {
        upstream,
        upstream_glob,
        downstream,
        downstream_glob,
        original: arg.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_globs() {
        let c = parse("src:snk").unwrap();
        assert_eq!(c.upstream, "src");
        assert_eq!(c.upstream_glob, "*");
        assert_eq!(c.downstream, "snk");
        assert_eq!(c.downstream_glob, "*");
    }

    #[test]
    fn escaped_star_in_glob() {
        let c = parse(r"a.out\*put:b.in").unwrap();
        assert_eq!(c.upstream, "a");
        assert_eq!(c.upstream_glob, r"out\*put");
        assert_eq!(c.downstream, "b");
        assert_eq!(c.downstream_glob, "in");
    }

    #[test]
    fn two_dots_on_upstream_rejected() {
        let err = parse("a.b.c:d").unwrap_err();
        assert!(matches!(err, ConnectError::ExtraDot { .. }));
    }

    #[test]
    fn reserved_glob_chars_must_be_escaped() {
        assert!(matches!(
            parse("a.b[:c").unwrap_err(),
            ConnectError::ReservedGlobChar { ch: '[', .. }
        ));
        assert!(matches!(
            parse("a.b?:c").unwrap_err(),
            ConnectError::ReservedGlobChar { ch: '?', .. }
        ));
    }

    #[test]
    fn missing_colon_is_an_error() {
        assert!(matches!(parse("nocolon").unwrap_err(), ConnectError::MissingColon));
    }

    #[test]
    fn glob_matching_through_parsed_connection() {
        let c = parse("a.out*:b.in").unwrap();
        assert!(c.upstream_port_matches("output"));
        assert!(c.downstream_port_matches("in"));
        assert!(!c.downstream_port_matches("other"));
    }
}
