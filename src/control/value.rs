// src/control/value.rs

//! Lexing of control file values: comments, quoting, brace lists, wildcards

use super::ParseError;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Characters that turn a bare list value into a wildcard pattern
const GLOB_CHARS: &[char] = &['*', '?', '['];

/// Drop everything from the first unescaped `#`; `\#` becomes a literal `#`
pub fn strip_comment(line: &str) -> Cow<'_, str> {
    if !line.contains('#') {
        return Cow::Borrowed(line);
    }

    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'#') => {
                out.push('#');
                chars.next();
            }
            '#' => break,
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Remove one optional pair of surrounding double quotes
pub fn unquote(value: &str, line: usize) -> Result<&str, ParseError> {
    let starts = value.starts_with('"');
    let ends = value.len() > 1 && value.ends_with('"');
    match (starts, ends) {
        (true, true) => Ok(&value[1..value.len() - 1]),
        (false, false) => Ok(value),
        _ => Err(ParseError::UnbalancedQuote { line }),
    }
}

/// Parse `{ "a", "b" }`; every item must be double-quoted
///
/// Empty items (`""` or a stray comma) are skipped. Text after the closing
/// brace is an error.
pub fn parse_brace_list(value: &str, line: usize) -> Result<Vec<String>, ParseError> {
    let mut rest = value
        .strip_prefix('{')
        .ok_or(ParseError::UnterminatedList { line })?;
    let mut items = Vec::new();

    loop {
        rest = rest.trim_start();
        let Some(c) = rest.chars().next() else {
            return Err(ParseError::UnterminatedList { line });
        };

        match c {
            '}' => {
                let trailing = rest[1..].trim();
                if !trailing.is_empty() {
                    return Err(ParseError::TrailingText {
                        line,
                        trailing: trailing.to_string(),
                    });
                }
                return Ok(items);
            }
            ',' => rest = &rest[1..],
            '"' => {
                let body = &rest[1..];
                let close = body.find('"').ok_or(ParseError::UnbalancedQuote { line })?;
                let item = &body[..close];
                if !item.is_empty() {
                    items.push(item.to_string());
                }
                rest = body[close + 1..].trim_start();
                match rest.chars().next() {
                    Some(',') | Some('}') => {}
                    Some(_) => {
                        let junk = rest.split([',', '}']).next().unwrap_or(rest);
                        return Err(ParseError::UnquotedItem {
                            line,
                            item: junk.trim().to_string(),
                        });
                    }
                    None => return Err(ParseError::UnterminatedList { line }),
                }
            }
            _ => {
                let item = rest.split([',', '}']).next().unwrap_or(rest);
                return Err(ParseError::UnquotedItem {
                    line,
                    item: item.trim().to_string(),
                });
            }
        }
    }
}

/// Whether a bare value should be expanded as a wildcard
pub fn is_pattern(value: &str) -> bool {
    value.contains(GLOB_CHARS)
}

/// Expand a wildcard relative to `base_dir`
///
/// Matches come back in the order `glob` yields them (sorted by path). A
/// pattern matching nothing is kept as a single literal entry, so the
/// missing file is reported when the build tries to copy it.
pub fn expand_pattern(base_dir: &Path, pattern: &str, line: usize) -> Result<Vec<PathBuf>, ParseError> {
    let full = base_dir.join(pattern);
    // Only `pattern` carries wildcards; the base directory is matched literally
    let escaped = Path::new(&glob::Pattern::escape(&base_dir.to_string_lossy())).join(pattern);

    let paths = glob::glob(&escaped.to_string_lossy()).map_err(|e| ParseError::BadPattern {
        line,
        pattern: pattern.to_string(),
        message: e.msg.to_string(),
    })?;

    let mut matches = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => matches.push(path),
            Err(e) => warn!("Skipping unreadable match for {}: {}", pattern, e),
        }
    }

    if matches.is_empty() {
        warn!("Pattern {} matched no files; keeping it as a literal path", pattern);
        matches.push(full);
    }

    Ok(matches)
}
