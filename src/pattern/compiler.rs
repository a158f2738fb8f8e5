//! Pattern scanner.
//!
//! Turns a pattern source into a flat token list. At every position the
//! scanner tries, in order: a literal run, a wildcard run, an alternation
//! block. Anything else is an invalid token.

use crate::error::PatternError;

/// One compiled pattern element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Token {
    /// Run of `[A-Za-z0-9_#]` and `::`, matched case-insensitively.
    Literal(String),
    /// `*`: zero or more word characters inside one path component.
    Segment,
    /// `**`: zero or more components, each optionally led by `::` or `#`.
    Components,
    /// `{a,b}`: exactly one of the literal alternatives.
    Alternation(Vec<String>),
}

/// Compiles an already-trimmed, non-empty pattern into tokens.
pub(crate) fn compile(pattern: &str) -> Result<Vec<Token>, PatternError> {
    let bytes = pattern.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if let Some(end) = scan_literal(bytes, pos) {
            tokens.push(Token::Literal(pattern[pos..end].to_string()));
            pos = end;
            continue;
        }

        if let Some(end) = scan_wildcard(bytes, pos) {
            let token = match end - pos {
                1 => Token::Segment,
                2 => Token::Components,
                _ => {
                    return Err(PatternError::AmbiguousWildcard {
                        run: pattern[pos..end].to_string(),
                        pos,
                        pattern: pattern.to_string(),
                    })
                }
            };
            tokens.push(token);
            pos = end;
            continue;
        }

        if let Some((end, variants)) = scan_alternation(pattern, pos) {
            tokens.push(Token::Alternation(variants));
            pos = end;
            continue;
        }

        let token = pattern[pos..].chars().next().map(String::from).unwrap_or_default();
        return Err(PatternError::InvalidToken {
            token,
            pos,
            pattern: pattern.to_string(),
        });
    }

    Ok(tokens)
}

/// Characters a single `*` may consume.
#[inline]
pub(crate) fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn scan_literal(bytes: &[u8], start: usize) -> Option<usize> {
    let mut pos = start;
    loop {
        match bytes.get(pos) {
            Some(&b) if is_word(b) || b == b'#' => pos += 1,
            Some(b':') if bytes.get(pos + 1) == Some(&b':') => pos += 2,
            _ => break,
        }
    }
    (pos > start).then_some(pos)
}

fn scan_wildcard(bytes: &[u8], start: usize) -> Option<usize> {
    let run = bytes[start..].iter().take_while(|&&b| b == b'*').count();
    (run > 0).then_some(start + run)
}

/// Scans `{body}` where body holds no `*` or `{`. The body extends to the last
/// `}` before the next `*`/`{` (or end of input).
fn scan_alternation(pattern: &str, start: usize) -> Option<(usize, Vec<String>)> {
    let bytes = pattern.as_bytes();
    if bytes[start] != b'{' {
        return None;
    }

    let run_end = bytes[start + 1..]
        .iter()
        .position(|&b| b == b'*' || b == b'{')
        .map_or(bytes.len(), |off| start + 1 + off);

    let close = bytes[start + 1..run_end].iter().rposition(|&b| b == b'}')? + start + 1;
    if close == start + 1 {
        return None;
    }

    let body = &pattern[start + 1..close];
    let mut variants: Vec<String> = body.split(',').map(String::from).collect();
    while variants.last().is_some_and(|v| v.is_empty()) {
        variants.pop();
    }
    if variants.is_empty() {
        variants.push(String::new());
    }

    Some((close + 1, variants))
}
