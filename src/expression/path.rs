// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Property paths into an execution context.
//!
//! Supports dot notation (`@input.user.name`), bracket indexes (`items[0]`),
//! quoted bracket keys (`headers["Content-Type"]`) and optional chaining
//! (`@input?.user`). Lookups never fail: a miss is simply `None`.

use std::fmt;

use serde_json::Value;

/// One step in a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// A path string that does not follow the path grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSyntaxError {
    pub path: String,
    pub offset: usize,
    pub reason: &'static str,
}

impl fmt::Display for PathSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid path {:?} at offset {}: {}",
            self.path, self.offset, self.reason
        )
    }
}

impl std::error::Error for PathSyntaxError {}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '@' | '$' | '-')
}

/// Parse a path into segments.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, PathSyntaxError> {
    let chars: Vec<char> = path.chars().collect();
    let fail = |offset: usize, reason: &'static str| PathSyntaxError {
        path: path.to_string(),
        offset,
        reason,
    };

    let mut segments = Vec::new();
    let mut pos = 0;

    let read_ident = |pos: &mut usize| -> Option<String> {
        let start = *pos;
        while *pos < chars.len() && is_ident_char(chars[*pos]) {
            *pos += 1;
        }
        (start != *pos).then(|| chars[start..*pos].iter().collect())
    };

    if chars.first() != Some(&'[') {
        let root = read_ident(&mut pos).ok_or_else(|| fail(0, "expected identifier"))?;
        segments.push(PathSegment::Key(root));
    }

    while pos < chars.len() {
        match chars[pos] {
            '?' => {
                if chars.get(pos + 1) != Some(&'.') {
                    return Err(fail(pos, "expected '.' after '?'"));
                }
                pos += 2;
                if chars.get(pos) == Some(&'[') {
                    continue;
                }
                let key = read_ident(&mut pos).ok_or_else(|| fail(pos, "expected identifier"))?;
                segments.push(PathSegment::Key(key));
            }
            '.' => {
                pos += 1;
                let key = read_ident(&mut pos).ok_or_else(|| fail(pos, "expected identifier"))?;
                segments.push(PathSegment::Key(key));
            }
            '[' => {
                pos += 1;
                match chars.get(pos) {
                    Some(&quote) if quote == '"' || quote == '\'' => {
                        pos += 1;
                        let start = pos;
                        while pos < chars.len() && chars[pos] != quote {
                            pos += 1;
                        }
                        if pos >= chars.len() {
                            return Err(fail(start, "unterminated quoted key"));
                        }
                        let key: String = chars[start..pos].iter().collect();
                        pos += 1;
                        segments.push(PathSegment::Key(key));
                    }
                    Some(c) if c.is_ascii_digit() => {
                        let start = pos;
                        while pos < chars.len() && chars[pos].is_ascii_digit() {
                            pos += 1;
                        }
                        let digits: String = chars[start..pos].iter().collect();
                        let index = digits
                            .parse::<usize>()
                            .map_err(|_| fail(start, "index out of range"))?;
                        segments.push(PathSegment::Index(index));
                    }
                    _ => return Err(fail(pos, "expected index or quoted key")),
                }
                if chars.get(pos) != Some(&']') {
                    return Err(fail(pos, "expected ']'"));
                }
                pos += 1;
            }
            _ => return Err(fail(pos, "unexpected character")),
        }
    }

    if segments.is_empty() {
        return Err(fail(0, "empty path"));
    }
    Ok(segments)
}

/// Walk parsed segments from `root`.
pub fn get_path<'a>(root: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get(key)?,
            (Value::Object(map), PathSegment::Index(index)) => map.get(&index.to_string())?,
            (Value::Array(items), PathSegment::Index(index)) => items.get(*index)?,
            (Value::Array(items), PathSegment::Key(key)) => {
                if key == "length" {
                    return None;
                }
                items.get(key.parse::<usize>().ok()?)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a path string against `root`; malformed paths resolve to `None`.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path).ok()?;
    get_path(root, &segments)
}

/// Check whether `candidate` is a bare variable reference into `context`.
///
/// The string must follow the path grammar exactly (no surrounding whitespace
/// or template delimiters) and its root key must exist in the context.
pub fn is_simple_path(candidate: &str, context: &Value) -> bool {
    let Ok(segments) = parse_path(candidate) else {
        return false;
    };
    match (segments.first(), context) {
        (Some(PathSegment::Key(root)), Value::Object(map)) => map.contains_key(root),
        _ => false,
    }
}
