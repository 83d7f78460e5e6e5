//! Splits a SQL dump into the individual statements Restore executes.
//!
//! Terminators inside quoted strings and comments are ignored, and the
//! client-side `DELIMITER` directive that dump tools emit around routines and
//! triggers switches the active terminator without producing a statement.

const DEFAULT_DELIMITER: &str = ";";

/// SQL flavour of the dump being split. Only MySQL treats a backslash inside
/// a quoted string as an escape; SQLite writes backslashes literally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Mysql,
    Sqlite,
}

impl Dialect {
    fn backslash_escapes(self) -> bool {
        matches!(self, Dialect::Mysql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    Quoted(u8),
    LineComment,
    BlockComment,
}

/// Returns the statements of `script` in file order. Leading comments and
/// surrounding whitespace are stripped; empty and comment-only chunks are dropped.
pub fn split_statements(script: &str, dialect: Dialect) -> Vec<String> {
    let backslash_escapes = dialect.backslash_escapes();
    let bytes = script.as_bytes();
    let mut delimiter = DEFAULT_DELIMITER.as_bytes().to_vec();
    let mut statements = Vec::new();
    let mut scan = Scan::Code;
    let mut start = 0;
    let mut i = 0;
    let mut line_start = true;

    while i < bytes.len() {
        let b = bytes[i];
        match scan {
            Scan::Code => {
                if line_start {
                    if let Some((token, next)) = delimiter_directive(bytes, i) {
                        push_statement(&mut statements, &script[start..i]);
                        delimiter = token;
                        start = next;
                        i = next;
                        continue;
                    }
                }
                if bytes[i..].starts_with(&delimiter) {
                    push_statement(&mut statements, &script[start..i]);
                    i += delimiter.len();
                    start = i;
                    line_start = false;
                    continue;
                }
                match b {
                    b'\'' | b'"' | b'`' => scan = Scan::Quoted(b),
                    b'#' => scan = Scan::LineComment,
                    b'-' if is_dash_comment(bytes, i) => scan = Scan::LineComment,
                    b'/' if bytes.get(i + 1) == Some(&b'*') => {
                        scan = Scan::BlockComment;
                        i += 2;
                        line_start = false;
                        continue;
                    }
                    _ => {}
                }
            }
            Scan::Quoted(quote) => {
                if b == b'\\' && quote != b'`' && backslash_escapes {
                    i += 2;
                    line_start = false;
                    continue;
                }
                if b == quote {
                    if bytes.get(i + 1) == Some(&quote) {
                        i += 2;
                        continue;
                    }
                    scan = Scan::Code;
                }
            }
            Scan::LineComment => {
                if b == b'\n' {
                    scan = Scan::Code;
                }
            }
            Scan::BlockComment => {
                if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    scan = Scan::Code;
                    i += 2;
                    line_start = false;
                    continue;
                }
            }
        }
        line_start = b == b'\n' || (line_start && matches!(b, b' ' | b'\t' | b'\r'));
        i += 1;
    }

    push_statement(&mut statements, &script[start..]);
    statements
}

fn push_statement(statements: &mut Vec<String>, chunk: &str) {
    if let Some(offset) = executable_start(chunk) {
        statements.push(chunk[offset..].trim_end().to_owned());
    }
}

/// `-- ` starts a comment only when followed by whitespace or end of input.
fn is_dash_comment(bytes: &[u8], i: usize) -> bool {
    bytes.get(i + 1) == Some(&b'-') && bytes.get(i + 2).map_or(true, |c| c.is_ascii_whitespace())
}

/// Recognises `DELIMITER <token>` at `i` and returns the token plus the offset
/// of the following line.
fn delimiter_directive(bytes: &[u8], i: usize) -> Option<(Vec<u8>, usize)> {
    const KEYWORD: &[u8] = b"DELIMITER";
    let rest = &bytes[i..];
    if rest.len() <= KEYWORD.len() || !rest[..KEYWORD.len()].eq_ignore_ascii_case(KEYWORD) {
        return None;
    }
    if !matches!(rest[KEYWORD.len()], b' ' | b'\t') {
        return None;
    }

    let line_end = rest.iter().position(|&c| c == b'\n').unwrap_or(rest.len());
    let token: Vec<u8> = rest[KEYWORD.len()..line_end]
        .iter()
        .copied()
        .skip_while(|c| c.is_ascii_whitespace())
        .take_while(|c| !c.is_ascii_whitespace())
        .collect();
    if token.is_empty() {
        return None;
    }

    let next = (i + line_end + 1).min(bytes.len());
    Some((token, next))
}

/// Offset of the first executable byte, skipping whitespace and plain
/// comments. `None` for comment-only chunks. MySQL conditional comments
/// (`/*! ... */`) count as executable.
fn executable_start(chunk: &str) -> Option<usize> {
    let bytes = chunk.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            c if c.is_ascii_whitespace() => i += 1,
            b'#' => i = skip_line(bytes, i),
            b'-' if is_dash_comment(bytes, i) => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') && bytes.get(i + 2) != Some(&b'!') => {
                i = bytes[i + 2..]
                    .windows(2)
                    .position(|w| w == b"*/")
                    .map_or(bytes.len(), |p| i + 2 + p + 2);
            }
            _ => return Some(i),
        }
    }
    None
}

fn skip_line(bytes: &[u8], i: usize) -> usize {
    bytes[i..]
        .iter()
        .position(|&c| c == b'\n')
        .map_or(bytes.len(), |p| i + p + 1)
}
