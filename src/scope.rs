//! Rendering scopes
//!
//! A `Scope` is the value passed down each render call: the current context
//! stream plus the keyword aliases visible at that point. Child scopes are
//! built by copying, never by mutating a shared map.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::path::KeyPath;
use crate::stream::Stream;
use crate::template::Expr;

/// Alias → binding source mappings visible in a block
#[derive(Debug, Clone, Default)]
pub struct Keywords {
    entries: FxHashMap<String, Stream>,
}

impl Keywords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Stream> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy with one more alias (shadows an existing entry of the same name)
    pub fn with(&self, name: impl Into<String>, stream: Stream) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(name.into(), stream);
        Self { entries }
    }

    /// Copy with `other` layered on top
    pub fn merged(&self, other: &Keywords) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        let mut entries = self.entries.clone();
        entries.extend(other.entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { entries }
    }
}

/// Context + keywords for one render call
#[derive(Debug, Clone)]
pub struct Scope {
    context: Stream,
    keywords: Keywords,
}

impl Scope {
    pub fn new(context: Stream) -> Self {
        Self {
            context,
            keywords: Keywords::new(),
        }
    }

    pub fn context(&self) -> &Stream {
        &self.context
    }

    pub fn keywords(&self) -> &Keywords {
        &self.keywords
    }

    /// Child scope with a replaced context (keywords stay visible)
    pub fn with_context(&self, context: Stream) -> Self {
        Self {
            context,
            keywords: self.keywords.clone(),
        }
    }

    /// Child scope with extra keywords layered on
    pub fn with_keywords(&self, extra: &Keywords) -> Self {
        Self {
            context: self.context.clone(),
            keywords: self.keywords.merged(extra),
        }
    }

    /// Resolve a path to a binding source
    ///
    /// Keywords win over context properties for the first segment unless the
    /// path starts with `this`.
    pub fn get_stream(&self, path: &KeyPath) -> Stream {
        if !path.is_this() {
            if let Some(keyword) = path.head().and_then(|head| self.keywords.get(head)) {
                return keyword.child(path.tail());
            }
        }
        self.context.child(path.segments())
    }

    /// Resolve any template expression (literals become constant streams)
    pub fn resolve(&self, expr: &Expr) -> Stream {
        match expr {
            Expr::Path(path) => self.get_stream(path),
            Expr::Literal(value) => Stream::constant(value.clone()),
        }
    }

    /// Current value of an expression
    pub fn value_of(&self, expr: &Expr) -> Value {
        self.resolve(expr).value()
    }
}
