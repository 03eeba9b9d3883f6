//! Line-oriented `key=value` codec for [`super::Properties`].
//!
//! `#`-prefixed lines are comments. Whitespace, `=`, `:`, `#`, `!` and
//! `\` are backslash-escaped inside keys and values. A line ending in
//! an unescaped `\` continues on the next line.

use thiserror::Error;

use super::{PropertyValue, Properties};

/// Failure parsing the `key=value` line format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertiesError {
    #[error("line {line}: missing '=' separator")]
    MissingSeparator { line: usize },
    #[error("line {line}: dangling escape at end of value")]
    DanglingEscape { line: usize },
}

const ESCAPE_CHARS: &[char] = &[' ', '\\', '=', ':', '#', '!'];

fn escape(s: &str, escape_leading_hash: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        if ESCAPE_CHARS.contains(&c) && (i > 0 || c != '#' || escape_leading_hash) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape(s: &str, line: usize) -> Result<String, PropertiesError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => return Err(PropertiesError::DanglingEscape { line }),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Joins physical lines into logical lines, following a trailing
/// unescaped `\` as a continuation marker.
fn join_continuations(text: &str) -> Vec<(usize, String)> {
    let mut logical = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trailing_backslashes = raw.chars().rev().take_while(|&c| c == '\\').count();
        let continues = trailing_backslashes % 2 == 1;
        let content = if continues {
            &raw[..raw.len() - 1]
        } else {
            raw
        };

        match pending.take() {
            Some((start, mut acc)) => {
                acc.push_str(content.trim_start());
                if continues {
                    pending = Some((start, acc));
                } else {
                    logical.push((start, acc));
                }
            }
            None => {
                if continues {
                    pending = Some((line_no, content.to_string()));
                } else {
                    logical.push((line_no, content.to_string()));
                }
            }
        }
    }
    if let Some(leftover) = pending {
        logical.push(leftover);
    }
    logical
}

/// Finds the index of the first unescaped `=` or `:`.
fn find_separator(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut i = 0;
    let mut escaped = false;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' {
            return Some(i);
        }
        i += 1;
    }
    None
}

pub fn load(text: &str) -> Result<Properties, PropertiesError> {
    let mut props = Properties::new();
    for (line_no, line) in join_continuations(text) {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }
        let sep = find_separator(trimmed).ok_or(PropertiesError::MissingSeparator { line: line_no })?;
        let raw_key = &trimmed[..sep];
        let raw_value = &trimmed[sep + 1..];
        let key = unescape(raw_key.trim_end(), line_no)?;
        let value = unescape(raw_value.trim_start(), line_no)?;
        props.set(key, PropertyValue::Str(value));
    }
    Ok(props)
}

pub fn save(props: &Properties) -> String {
    let mut out = String::new();
    for (key, value) in props.iter() {
        out.push_str(&escape(key, true));
        out.push('=');
        out.push_str(&escape(&value.to_value_string(), false));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_simple_key_value() {
        let p = load("service.name=com.example.Foo\n").unwrap();
        assert_eq!(
            p.get("service.name").unwrap().as_str(),
            Some("com.example.Foo")
        );
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let p = load("# a comment\n\nkey=value\n! also a comment\n").unwrap();
        assert_eq!(p.len(), 1);
        assert_eq!(p.get("key").unwrap().as_str(), Some("value"));
    }

    #[test]
    fn handles_escaped_whitespace_in_key() {
        let p = load("my\\ key=value\n").unwrap();
        assert_eq!(p.get("my key").unwrap().as_str(), Some("value"));
    }

    #[test]
    fn handles_line_continuation() {
        let p = load("key=part one \\\npart two\n").unwrap();
        assert_eq!(p.get("key").unwrap().as_str(), Some("part one part two"));
    }

    #[test]
    fn missing_separator_is_an_error() {
        let err = load("not-a-property-line\n").unwrap_err();
        assert!(matches!(err, PropertiesError::MissingSeparator { .. }));
    }

    #[test]
    fn save_then_load_roundtrips() {
        let mut p = Properties::new();
        p.set("service.id", 1i64);
        p.set("service.name", "com.example.Foo Bar");
        p.set("enabled", true);

        let text = p.save();
        let reloaded = Properties::load(&text).unwrap();

        assert_eq!(reloaded.get("service.id").unwrap().as_str(), Some("1"));
        assert_eq!(
            reloaded.get("service.name").unwrap().as_str(),
            Some("com.example.Foo Bar")
        );
        assert_eq!(reloaded.get("enabled").unwrap().as_str(), Some("true"));
    }

    #[test]
    fn save_is_idempotent_under_reload() {
        let mut p = Properties::new();
        p.set("a", "1");
        p.set("b with space", "value with space");

        let first = p.save();
        let reloaded = Properties::load(&first).unwrap();
        let second = reloaded.save();

        assert_eq!(first, second);
    }
}
