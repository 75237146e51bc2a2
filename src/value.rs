// The tagged value type every frame slot, stack cell, and literal
// argument eventually becomes.
//
// Unlike the dashboard VM this interpreter was adapted from, there is
// no silent coercion between variants: every instruction that reads a
// Value checks its tag explicitly and reports Error::TypeError (or a
// more specific variant) on mismatch. The only polymorphic case is
// `EQ`, which treats `Nil` as comparable to anything (see engine.rs).

use crate::error::Error;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
}

/// The four type tags a running program can observe via `TYPE`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    Nil,
    Bool,
    Int,
    Str,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Nil => "nil",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Str => "string",
        };
        write!(f, "{}", s)
    }
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) => Kind::Int,
            Value::Str(_) => Kind::Str,
        }
    }

    /// Render the textual form used by WRITE/DPRINT/string ops.
    /// Strings are decoded first; `Nil` renders as the empty string;
    /// booleans render as the lowercase tokens `true`/`false`.
    pub fn text(&self) -> String {
        match self {
            Value::Nil => String::new(),
            Value::Bool(b) => if *b { "true".into() } else { "false".into() },
            Value::Int(i) => i.to_string(),
            Value::Str(s) => decode_escapes(s),
        }
    }

    pub fn as_int(&self) -> Result<i64, Error> {
        match self {
            Value::Int(i) => Ok(*i),
            v => Err(Error::TypeError(format!("expected int, got {}", v.kind()))),
        }
    }

    pub fn as_bool(&self) -> Result<bool, Error> {
        match self {
            Value::Bool(b) => Ok(*b),
            v => Err(Error::TypeError(format!("expected bool, got {}", v.kind()))),
        }
    }

    /// Decoded string contents, for use sites that need the raw
    /// Rust `String` rather than the generic `text()` rendering.
    pub fn as_decoded_str(&self) -> Result<String, Error> {
        match self {
            Value::Str(s) => Ok(decode_escapes(s)),
            v => Err(Error::TypeError(format!("expected string, got {}", v.kind()))),
        }
    }
}

lazy_static! {
    static ref ESCAPE_RE: Regex = Regex::new(r"\\([0-9]{3})").unwrap();
}

/// Resolve `\DDD` escape sequences (DDD = three decimal digits) into
/// the Unicode scalar value they name. Idempotent on strings that
/// contain no such sequence.
pub fn decode_escapes(raw: &str) -> String {
    ESCAPE_RE
        .replace_all(raw, |caps: &regex::Captures| {
            let code: u32 = caps[1].parse().unwrap_or(0);
            char::from_u32(code).map(|c| c.to_string()).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_simple_escape() {
        assert_eq!(decode_escapes("a\\032b"), "a b");
    }

    #[test]
    fn decode_idempotent_on_plain_text() {
        assert_eq!(decode_escapes("hello world"), "hello world");
    }

    #[test]
    fn decode_multiple_escapes() {
        assert_eq!(decode_escapes("\\104\\105"), "HI");
    }

    #[test]
    fn bool_text_is_lowercase() {
        assert_eq!(Value::Bool(true).text(), "true");
        assert_eq!(Value::Bool(false).text(), "false");
    }

    #[test]
    fn nil_text_is_empty() {
        assert_eq!(Value::Nil.text(), "");
    }
}
