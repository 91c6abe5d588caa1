//! `{{#if}}` helper: truthiness-based block
//!
//! Unlike `{{#with}}`, empty strings, `0`, `false` and empty arrays pick
//! the inverse branch. The block keeps the outer context.

use serde_json::Value;

use super::{BlockHelper, Invocation, Param};
use crate::binder::{self, BindRequest, PlainView};
use crate::error::ScopeError;
use crate::render::Fragment;
use crate::stream::Stream;

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

pub struct IfHelper;

impl BlockHelper for IfHelper {
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

        let [param] = params.as_slice() else {
            return Err(ScopeError::WrongArity {
                helper: name.to_string(),
                usage: "a single argument".to_string(),
                count: params.len(),
            });
        };

        let source = match param {
            Param::Path(path) => scope.get_stream(path),
            Param::Literal(value) => Stream::constant(value.clone()),
            Param::Keyword(_) => {
                return Err(ScopeError::UnsupportedArgument {
                    helper: name.to_string(),
                    kind: "keyword".to_string(),
                })
            }
        };

        binder::bind(BindRequest {
            scope,
            source,
            hash,
            options,
            env,
            preserve_context: true,
            predicate: truthy,
            view: &PlainView,
        })
    }
}
