//! `{{#with}}` helper
//!
//! Two forms, decided once per invocation:
//!
//! ```handlebars
//! {{#with user.posts as blogPosts}}      {{!-- keyword: outer context kept --}}
//!   {{blogPosts.length}} posts by {{user.name}}
//! {{/with}}
//!
//! {{#with user}}                          {{!-- deprecated: context replaced --}}
//!   {{name}}
//! {{/with}}
//! ```
//!
//! `controller='name'` wraps the bound value in a registered controller
//! (see [`WithView`]).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::{BlockHelper, Invocation, KeywordArg, Param};
use crate::binder::{self, BindRequest, WithView};
use crate::diagnostics::DiagnosticKind;
use crate::error::ScopeError;
use crate::path::KeyPath;
use crate::render::Fragment;
use crate::scope::Scope;
use crate::stream::Stream;
use crate::template::Expr;

pub const DEPRECATION_MESSAGE: &str = "Using the context switching form of `{{with}}` is deprecated. \
     Please use the keyword form (`{{with foo as bar}}`) instead.";

const USAGE: &str = "a single argument or use the `as` syntax";

/// Plain identifier usable as an alias
static ALIAS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$-]*$").expect("valid alias regex"));

pub fn is_valid_alias(alias: &str) -> bool {
    ALIAS_RE.is_match(alias) && alias != "this" && alias != "as"
}

/// Existence test: only null/absent values take the inverse branch
///
/// `0`, `false`, `""` and empty collections exist.
pub fn exists(value: &Value) -> bool {
    !value.is_null()
}

/// Rewrite `<expr> as <name>` into a single [`Param::Keyword`]
///
/// Any other shape is left untouched (arity is checked by the helper), so
/// running this on already normalized params does nothing.
pub fn normalize_params(scope: &Scope, params: &mut Vec<Param>) {
    let [from, Param::Path(keyword), Param::Path(to)] = params.as_slice() else {
        return;
    };
    if keyword.as_str() != "as" {
        return;
    }
    let from = match from {
        Param::Path(path) => Expr::Path(path.clone()),
        Param::Literal(value) => Expr::Literal(value.clone()),
        Param::Keyword(_) => return,
    };
    let keyword = KeywordArg {
        stream: scope.resolve(&from),
        from,
        to: to.as_str().to_string(),
    };
    params.clear();
    params.push(Param::Keyword(keyword));
}

/// Binding mode selected from normalized params
#[derive(Debug, Clone)]
pub enum WithMode {
    /// `{{#with expr}}`: the block's context becomes `source`
    ContextSwitch { source: Stream, path: KeyPath },
    /// `{{#with expr as alias}}`: `alias` names `source`, context kept
    KeywordAlias { source: Stream, alias: String },
}

impl WithMode {
    pub fn from_params(
        helper: &str,
        params: Vec<Param>,
        scope: &Scope,
        strict_aliases: bool,
    ) -> Result<Self, ScopeError> {
        let count = params.len();
        let mut params = params.into_iter();
        let (Some(param), None) = (params.next(), params.next()) else {
            return Err(ScopeError::WrongArity {
                helper: helper.to_string(),
                usage: USAGE.to_string(),
                count,
            });
        };

        match param {
            Param::Path(path) => Ok(WithMode::ContextSwitch {
                source: scope.get_stream(&path),
                path,
            }),
            Param::Keyword(KeywordArg { to, stream, .. }) => {
                if strict_aliases && !is_valid_alias(&to) {
                    return Err(ScopeError::InvalidAlias { alias: to });
                }
                Ok(WithMode::KeywordAlias {
                    source: stream,
                    alias: to,
                })
            }
            Param::Literal(_) => Err(ScopeError::UnsupportedArgument {
                helper: helper.to_string(),
                kind: "literal".to_string(),
            }),
        }
    }

    pub fn source(&self) -> &Stream {
        match self {
            WithMode::ContextSwitch { source, .. } | WithMode::KeywordAlias { source, .. } => source,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            WithMode::ContextSwitch { .. } => None,
            WithMode::KeywordAlias { alias, .. } => Some(alias),
        }
    }

    pub fn preserves_context(&self) -> bool {
        matches!(self, WithMode::KeywordAlias { .. })
    }
}

pub struct WithHelper;

impl BlockHelper for WithHelper {
    fn preprocess(&self, scope: &Scope, params: &mut Vec<Param>) {
        normalize_params(scope, params);
    }

    fn invoke(&self, invocation: Invocation<'_>) -> Result<Fragment, ScopeError> {
        let Invocation {
            name,
            scope,
            params,
            hash,
            options,
            env,
        } = invocation;

        if !options.has_block() {
            return Err(ScopeError::MissingBlock {
                helper: name.to_string(),
            });
        }

        let mode = WithMode::from_params(name, params, scope, env.config().strict_aliases)?;
        debug!(helper = name, source = mode.source().label(), alias = mode.alias(), "with");

        let (source, options, hash, preserve_context) = match mode {
            WithMode::ContextSwitch { source, path } => {
                env.deprecate(name, DEPRECATION_MESSAGE, path.as_str())?;
                (source, options, hash, false)
            }
            WithMode::KeywordAlias { source, alias } => {
                if scope.keywords().contains(&alias) {
                    env.diagnostics().emit(DiagnosticKind::KeywordShadowed {
                        helper: name.into(),
                        alias: alias.clone(),
                    });
                }
                let localized = options.with_keyword(alias.clone(), source.clone());
                (source, localized, hash.with_keyword_name(alias), true)
            }
        };

        binder::bind(BindRequest {
            scope,
            source,
            hash,
            options,
            env,
            preserve_context,
            predicate: exists,
            view: &WithView,
        })
    }
}
