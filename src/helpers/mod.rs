//! Block helpers
//!
//! A helper receives an [`Invocation`]: positional [`Param`]s (after its
//! own `preprocess` pass), the evaluated [`Hash`], immutable
//! [`RenderOptions`] and the [`Env`]. Built-in helpers:
//!
//! - `with`: bind a value as new context or under an alias (`with`)
//! - `if`: render by truthiness (`if_helper`)

mod if_helper;
mod with;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::ScopeError;
use crate::path::KeyPath;
use crate::render::{Env, Fragment};
use crate::scope::{Keywords, Scope};
use crate::stream::Stream;
use crate::template::{Expr, Program};

pub use if_helper::{truthy, IfHelper};
pub use with::{exists, is_valid_alias, normalize_params, WithHelper, WithMode, DEPRECATION_MESSAGE};

/// Positional helper argument
///
/// The variant is the argument kind: the parser only produces `Path` and
/// `Literal`; `Keyword` is produced by the `with` normalizer.
#[derive(Debug, Clone)]
pub enum Param {
    Path(KeyPath),
    Literal(Value),
    Keyword(KeywordArg),
}

impl Param {
    pub fn kind(&self) -> &'static str {
        match self {
            Param::Path(_) => "path",
            Param::Literal(_) => "literal",
            Param::Keyword(_) => "keyword",
        }
    }
}

impl From<Expr> for Param {
    fn from(expr: Expr) -> Self {
        match expr {
            Expr::Path(path) => Param::Path(path),
            Expr::Literal(value) => Param::Literal(value),
        }
    }
}

/// Normalized `<from> as <to>` argument
#[derive(Debug, Clone)]
pub struct KeywordArg {
    pub from: Expr,
    pub to: String,
    pub stream: Stream,
}

/// Named options (`key=value`), evaluated once at invocation time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hash {
    values: BTreeMap<String, Value>,
    keyword_name: Option<String>,
}

impl Hash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(entries: &[(String, Expr)], scope: &Scope) -> Self {
        Self {
            values: entries
                .iter()
                .map(|(key, expr)| (key.clone(), scope.value_of(expr)))
                .collect(),
            keyword_name: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn with_value(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.values.insert(key.into(), value);
        next
    }

    /// Alias installed by a keyword-mode helper, for the block view
    pub fn keyword_name(&self) -> Option<&str> {
        self.keyword_name.as_deref()
    }

    pub fn with_keyword_name(&self, name: impl Into<String>) -> Self {
        Self {
            values: self.values.clone(),
            keyword_name: Some(name.into()),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Block programs plus block-scoped keywords
///
/// Immutable: adding a keyword returns a new record, so a shared options
/// value is never changed under another helper.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    render: Option<Arc<Program>>,
    inverse: Option<Arc<Program>>,
    keywords: Keywords,
}

impl RenderOptions {
    pub fn new(render: Option<Arc<Program>>, inverse: Option<Arc<Program>>) -> Self {
        Self {
            render,
            inverse,
            keywords: Keywords::new(),
        }
    }

    /// Primary block (`{{#x}}...{{else}}`)
    pub fn block(&self) -> Option<&Arc<Program>> {
        self.render.as_ref()
    }

    /// Alternate block (`{{else}}...{{/x}}`)
    pub fn inverse(&self) -> Option<&Arc<Program>> {
        self.inverse.as_ref()
    }

    pub fn has_block(&self) -> bool {
        self.render.is_some()
    }

    pub fn keywords(&self) -> &Keywords {
        &self.keywords
    }

    pub fn with_keyword(&self, name: impl Into<String>, stream: Stream) -> Self {
        Self {
            render: self.render.clone(),
            inverse: self.inverse.clone(),
            keywords: self.keywords.with(name, stream),
        }
    }
}

/// Everything a helper call receives
pub struct Invocation<'a> {
    /// Name the helper was registered under
    pub name: &'a str,
    pub scope: &'a Scope,
    pub params: Vec<Param>,
    pub hash: Hash,
    pub options: RenderOptions,
    pub env: &'a Env,
}

pub trait BlockHelper: Send + Sync {
    /// Rewrite raw params before `invoke` (no errors here)
    fn preprocess(&self, _scope: &Scope, _params: &mut Vec<Param>) {}

    fn invoke(&self, invocation: Invocation<'_>) -> Result<Fragment, ScopeError>;
}

/// Named helpers available to templates
#[derive(Clone, Default)]
pub struct HelperRegistry {
    helpers: FxHashMap<String, Arc<dyn BlockHelper>>,
}

impl HelperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `with` and `if`
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("with", WithHelper);
        registry.register("if", IfHelper);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, helper: impl BlockHelper + 'static) {
        self.helpers.insert(name.into(), Arc::new(helper));
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn BlockHelper>, ScopeError> {
        self.helpers
            .get(name)
            .cloned()
            .ok_or_else(|| ScopeError::UnknownHelper {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }
}

impl fmt::Debug for HelperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.helpers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("HelperRegistry").field("helpers", &names).finish()
    }
}
