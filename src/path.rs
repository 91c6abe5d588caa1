//! Dotted key paths (`post.title`, `items.0.name`, `this.name`)
//!
//! A path is parsed once and then used both for lookups against JSON values
//! and for matching store watchers against changed locations.

use std::fmt;

use serde_json::Value;

use crate::error::ScopeError;

/// Parsed dotted path
///
/// `this` is only meaningful as the first segment: it pins the lookup to the
/// current context and is not kept in `segments`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    original: String,
    segments: Vec<String>,
    explicit_this: bool,
}

impl KeyPath {
    /// Parse `a.b.c`, `this`, `this.a` or `0` style paths
    pub fn parse(path: &str) -> Result<Self, ScopeError> {
        let trimmed = path.trim();
        let invalid = || ScopeError::InvalidPath {
            path: path.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut segments = Vec::new();
        let mut explicit_this = false;

        for (i, part) in trimmed.split('.').enumerate() {
            if part.is_empty() || part.chars().any(|c| c.is_whitespace() || "{}\"'=".contains(c)) {
                return Err(invalid());
            }
            if part == "this" {
                if i != 0 {
                    return Err(invalid());
                }
                explicit_this = true;
                continue;
            }
            segments.push(part.to_string());
        }

        Ok(Self {
            original: trimmed.to_string(),
            segments,
            explicit_this,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn head(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn tail(&self) -> &[String] {
        self.segments.get(1..).unwrap_or(&[])
    }

    /// Path was written with a leading `this`
    pub fn is_this(&self) -> bool {
        self.explicit_this
    }

    /// Single segment without `this` (usable as an alias name)
    pub fn is_identifier(&self) -> bool {
        !self.explicit_this && self.segments.len() == 1
    }

    /// Follow the path through objects and arrays (by reference)
    pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        lookup_segments(value, &self.segments)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Zero-clone traversal: numeric segments index arrays, others read object fields
pub fn lookup_segments<'a>(value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i))?,
            Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

/// True when one path is a prefix of the other (a write to either affects both)
pub fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

/// Human-readable JSON type name for error messages
pub fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
