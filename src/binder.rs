//! Scope binder
//!
//! `bind` is the primitive block helpers delegate to. Given a binding
//! source it:
//!
//! 1. evaluates the predicate on the source's current value to pick the
//!    primary or the inverse program,
//! 2. renders that program against the outer context (`preserve_context`)
//!    or with the source as the new context, with the options' keywords
//!    layered over the outer ones,
//! 3. subscribes to the source so a change re-runs 1 and 2 on the next flush,
//! 4. unsubscribes when the block is destroyed or replaced.
//!
//! The [`BlockView`] hint lets a helper adjust the child frame before
//! anything renders; [`WithView`] uses it for `controller=` wrapping.

use serde_json::Value;
use tracing::instrument;

use crate::controller;
use crate::error::ScopeError;
use crate::helpers::{Hash, RenderOptions};
use crate::render::{BoundBlock, Env, Fragment};
use crate::scope::{Keywords, Scope};
use crate::stream::Stream;

/// Chooses primary (`true`) or inverse (`false`) program
pub type Predicate = fn(&Value) -> bool;

/// Context and keywords the block body renders with
#[derive(Debug, Clone)]
pub struct BlockFrame {
    pub context: Stream,
    pub keywords: Keywords,
}

/// Hook applied to the child frame when a bound block is created
pub trait BlockView: Send + Sync {
    fn name(&self) -> &'static str;

    fn prepare(&self, frame: BlockFrame, hash: &Hash, env: &Env) -> Result<BlockFrame, ScopeError>;
}

/// Leaves the frame as is
pub struct PlainView;

impl BlockView for PlainView {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn prepare(&self, frame: BlockFrame, _hash: &Hash, _env: &Env) -> Result<BlockFrame, ScopeError> {
        Ok(frame)
    }
}

/// View for `{{#with}}`: applies `controller=<name>` wrapping
///
/// With an alias (`hash.keyword_name()`), the alias is wrapped; otherwise
/// the new context is.
pub struct WithView;

impl BlockView for WithView {
    fn name(&self) -> &'static str {
        "with"
    }

    fn prepare(&self, frame: BlockFrame, hash: &Hash, env: &Env) -> Result<BlockFrame, ScopeError> {
        let Some(value) = hash.get("controller") else {
            return Ok(frame);
        };
        let name = value.as_str().ok_or_else(|| ScopeError::UnknownController {
            name: value.to_string(),
        })?;
        let wrapper = env.controllers().get(name)?;

        match hash.keyword_name() {
            Some(alias) => {
                let model = frame
                    .keywords
                    .get(alias)
                    .cloned()
                    .unwrap_or_else(|| frame.context.clone());
                let wrapped = controller::wrap_stream(name, wrapper, &model);
                Ok(BlockFrame {
                    context: frame.context,
                    keywords: frame.keywords.with(alias, wrapped),
                })
            }
            None => Ok(BlockFrame {
                context: controller::wrap_stream(name, wrapper, &frame.context),
                keywords: frame.keywords,
            }),
        }
    }
}

/// Arguments to [`bind`]
pub struct BindRequest<'a> {
    /// Scope the helper was invoked in
    pub scope: &'a Scope,
    pub source: Stream,
    pub hash: Hash,
    pub options: RenderOptions,
    pub env: &'a Env,
    /// Keep the outer context (`true`) or switch to `source` (`false`)
    pub preserve_context: bool,
    pub predicate: Predicate,
    pub view: &'a dyn BlockView,
}

/// Bind a block to a source; see the module docs for the contract
#[instrument(
    level = "debug",
    skip_all,
    fields(source = %request.source.label(), view = request.view.name(), preserve = request.preserve_context)
)]
pub fn bind(request: BindRequest<'_>) -> Result<Fragment, ScopeError> {
    let BindRequest {
        scope,
        source,
        hash,
        options,
        env,
        preserve_context,
        predicate,
        view,
    } = request;

    let context = if preserve_context {
        scope.context().clone()
    } else {
        source.clone()
    };
    let frame = view.prepare(
        BlockFrame {
            context,
            keywords: options.keywords().clone(),
        },
        &hash,
        env,
    )?;
    let child = scope.with_context(frame.context).with_keywords(&frame.keywords);

    let label = format!("#{} {}", view.name(), source.label());
    let env = env.clone();
    let render = move |value: &Value| {
        let program = if predicate(value) {
            options.block()
        } else {
            options.inverse()
        };
        match program {
            Some(program) => env.render_program(program, &child),
            None => Ok(Vec::new()),
        }
    };

    let block = BoundBlock::new(label, source, Box::new(render))?;
    Ok(Fragment::Bound(block))
}
