//! Rendering: environment, bound fragments and change propagation
//!
//! Rendering a program produces a tree of [`Fragment`]s. Every mustache and
//! every helper block becomes a [`BoundBlock`] subscribed to its binding
//! source. A store write only marks the affected blocks dirty; the next
//! [`RenderedTemplate::flush`] re-renders them top-down. Dropping a block
//! (or its parent re-rendering) drops its subscription.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{DeprecationPolicy, RenderConfig};
use crate::controller::{Controller, ControllerRegistry};
use crate::diagnostics::{DiagnosticKind, DiagnosticLog, DiagnosticSink};
use crate::error::ScopeError;
use crate::helpers::{BlockHelper, Hash, HelperRegistry, Invocation, Param, RenderOptions};
use crate::scope::Scope;
use crate::store::{Store, Subscription};
use crate::stream::Stream;
use crate::template::{self, Expr, MustacheNode, Node, Program};

/// Environment handle shared by every render call
#[derive(Clone)]
pub struct Env {
    helpers: Arc<HelperRegistry>,
    controllers: Arc<ControllerRegistry>,
    diagnostics: Arc<dyn DiagnosticSink>,
    config: Arc<RenderConfig>,
}

impl Default for Env {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

impl Env {
    /// Built-in helpers, no controllers, diagnostics into a fresh log
    pub fn new(config: RenderConfig) -> Self {
        Self {
            helpers: Arc::new(HelperRegistry::builtin()),
            controllers: Arc::new(ControllerRegistry::new()),
            diagnostics: Arc::new(DiagnosticLog::new()),
            config: Arc::new(config),
        }
    }

    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn with_controller(mut self, name: impl Into<String>, controller: impl Controller + 'static) -> Self {
        Arc::make_mut(&mut self.controllers).register(name, controller);
        self
    }

    pub fn with_helper(mut self, name: impl Into<String>, helper: impl BlockHelper + 'static) -> Self {
        Arc::make_mut(&mut self.helpers).register(name, helper);
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn controllers(&self) -> &ControllerRegistry {
        &self.controllers
    }

    pub fn helpers(&self) -> &HelperRegistry {
        &self.helpers
    }

    pub fn diagnostics(&self) -> &dyn DiagnosticSink {
        self.diagnostics.as_ref()
    }

    /// Report a deprecated form according to the configured policy
    pub fn deprecate(&self, helper: &str, message: &str, source: &str) -> Result<(), ScopeError> {
        match self.config.deprecations {
            DeprecationPolicy::Silence => Ok(()),
            DeprecationPolicy::Raise => Err(ScopeError::Deprecated {
                message: message.to_string(),
            }),
            DeprecationPolicy::Warn => {
                warn!(helper, source, "{message}");
                self.diagnostics.emit(DiagnosticKind::Deprecation {
                    helper: Arc::from(helper),
                    message: message.to_string(),
                    source: source.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Render a parsed program against the store root
    pub fn render(&self, program: &Program, store: &Store) -> Result<RenderedTemplate, ScopeError> {
        let scope = Scope::new(store.root_stream());
        let fragments = self.render_program(program, &scope)?;
        Ok(RenderedTemplate { fragments })
    }

    /// Parse (through the global cache) and render
    pub fn render_str(&self, source: &str, store: &Store) -> Result<RenderedTemplate, ScopeError> {
        let program = template::compile(source)?;
        self.render(&program, store)
    }

    /// Render a program in an explicit scope
    pub fn render_program(&self, program: &Program, scope: &Scope) -> Result<Vec<Fragment>, ScopeError> {
        let mut fragments = Vec::with_capacity(program.nodes.len());
        for node in &program.nodes {
            let fragment = match node {
                Node::Text(text) => Fragment::Text(text.clone()),
                Node::Mustache(mustache) => self.render_mustache(mustache, scope)?,
                Node::Block(block) => {
                    let helper = self.helpers.get(&block.helper)?;
                    let options = RenderOptions::new(Some(Arc::clone(&block.program)), block.inverse.clone());
                    self.invoke(&block.helper, helper.as_ref(), &block.params, &block.hash, options, scope)?
                }
            };
            fragments.push(fragment);
        }
        Ok(fragments)
    }

    fn render_mustache(&self, mustache: &MustacheNode, scope: &Scope) -> Result<Fragment, ScopeError> {
        let helper_name = mustache
            .expr
            .as_path()
            .filter(|p| p.is_identifier())
            .map(|p| p.as_str())
            .filter(|name| self.helpers.contains(name));

        if let Some(name) = helper_name {
            let helper = self.helpers.get(name)?;
            return self.invoke(name, helper.as_ref(), &mustache.params, &mustache.hash, RenderOptions::default(), scope);
        }

        if !mustache.params.is_empty() || !mustache.hash.is_empty() {
            let name = match &mustache.expr {
                Expr::Path(p) => p.to_string(),
                Expr::Literal(v) => v.to_string(),
            };
            return Err(ScopeError::UnknownHelper { name });
        }

        let source = scope.resolve(&mustache.expr);
        let escape = mustache.escaped && self.config.escape_html;
        let label = source.label().to_string();
        let block = BoundBlock::new(
            label,
            source,
            Box::new(move |value: &Value| {
                let text = value_to_string(value);
                let text = if escape {
                    escape_html(&text).into_owned()
                } else {
                    text
                };
                Ok(vec![Fragment::Text(text)])
            }),
        )?;
        Ok(Fragment::Bound(block))
    }

    fn invoke(
        &self,
        name: &str,
        helper: &dyn BlockHelper,
        params: &[Expr],
        hash: &[(String, Expr)],
        options: RenderOptions,
        scope: &Scope,
    ) -> Result<Fragment, ScopeError> {
        let mut params: Vec<Param> = params.iter().cloned().map(Param::from).collect();
        helper.preprocess(scope, &mut params);
        let hash = Hash::evaluate(hash, scope);
        debug!(helper = name, params = params.len(), block = options.has_block(), "invoking helper");
        helper.invoke(Invocation {
            name,
            scope,
            params,
            hash,
            options,
            env: self,
        })
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("helpers", &self.helpers)
            .field("controllers", &self.controllers)
            .field("config", &self.config)
            .finish()
    }
}

pub type RenderFn = Box<dyn Fn(&Value) -> Result<Vec<Fragment>, ScopeError> + Send + Sync>;

/// Piece of rendered output
#[derive(Debug, Clone)]
pub enum Fragment {
    Text(String),
    Bound(Arc<BoundBlock>),
}

impl Fragment {
    /// Current output (without flushing pending changes)
    pub fn html(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn flush(&self, rerendered: &mut usize) -> Result<(), ScopeError> {
        match self {
            Fragment::Text(_) => Ok(()),
            Fragment::Bound(block) => block.flush(rerendered),
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            Fragment::Text(text) => out.push_str(text),
            Fragment::Bound(block) => block.write_to(out),
        }
    }

    fn is_dirty(&self) -> bool {
        match self {
            Fragment::Text(_) => false,
            Fragment::Bound(block) => block.is_dirty() || block.children.lock().iter().any(Fragment::is_dirty),
        }
    }

    fn block_count(&self) -> usize {
        match self {
            Fragment::Text(_) => 0,
            Fragment::Bound(block) => 1 + block.children.lock().iter().map(Fragment::block_count).sum::<usize>(),
        }
    }
}

/// Output region tied to one binding source
pub struct BoundBlock {
    label: String,
    source: Stream,
    render: RenderFn,
    children: Mutex<Vec<Fragment>>,
    dirty: Arc<AtomicBool>,
    renders: AtomicUsize,
    subscription: Mutex<Option<Subscription>>,
}

impl BoundBlock {
    /// Subscribe to `source` and render once
    pub fn new(label: impl Into<String>, source: Stream, render: RenderFn) -> Result<Arc<Self>, ScopeError> {
        let dirty = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&dirty);
        let subscription = source.subscribe(move || flag.store(true, Ordering::SeqCst));

        let children = render(&source.value())?;
        Ok(Arc::new(Self {
            label: label.into(),
            source,
            render,
            children: Mutex::new(children),
            dirty,
            renders: AtomicUsize::new(1),
            subscription: Mutex::new(Some(subscription)),
        }))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Times the block body has been rendered (initial render included)
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    /// Unsubscribe and drop rendered children
    pub fn destroy(&self) {
        self.subscription.lock().take();
        self.children.lock().clear();
        self.dirty.store(false, Ordering::SeqCst);
    }

    pub fn is_destroyed(&self) -> bool {
        self.subscription.lock().is_none()
    }

    fn flush(&self, rerendered: &mut usize) -> Result<(), ScopeError> {
        if self.is_destroyed() {
            return Ok(());
        }
        if self.dirty.swap(false, Ordering::SeqCst) {
            debug!(block = %self.label, "re-rendering");
            let fresh = match (self.render)(&self.source.value()) {
                Ok(fresh) => fresh,
                Err(e) => {
                    // stay dirty so the next flush retries
                    self.dirty.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            };
            // old children (and their subscriptions) drop here
            *self.children.lock() = fresh;
            self.renders.fetch_add(1, Ordering::SeqCst);
            *rerendered += 1;
            return Ok(());
        }
        for child in self.children.lock().iter() {
            child.flush(rerendered)?;
        }
        Ok(())
    }

    fn write_to(&self, out: &mut String) {
        for child in self.children.lock().iter() {
            child.write_to(out);
        }
    }
}

impl fmt::Debug for BoundBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundBlock")
            .field("label", &self.label)
            .field("dirty", &self.is_dirty())
            .field("renders", &self.render_count())
            .finish()
    }
}

/// Result of rendering a template; stays live until dropped
#[derive(Debug)]
pub struct RenderedTemplate {
    fragments: Vec<Fragment>,
}

impl RenderedTemplate {
    /// Re-render every dirty block; returns how many re-rendered
    pub fn flush(&self) -> Result<usize, ScopeError> {
        let mut rerendered = 0;
        for fragment in &self.fragments {
            fragment.flush(&mut rerendered)?;
        }
        Ok(rerendered)
    }

    /// Flush, then produce the current output
    pub fn html(&self) -> Result<String, ScopeError> {
        self.flush()?;
        let mut out = String::new();
        for fragment in &self.fragments {
            fragment.write_to(&mut out);
        }
        Ok(out)
    }

    pub fn is_dirty(&self) -> bool {
        self.fragments.iter().any(Fragment::is_dirty)
    }

    /// Live bound blocks (mustaches included)
    pub fn block_count(&self) -> usize {
        self.fragments.iter().map(Fragment::block_count).sum()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }
}

/// Convert a JSON value to template output (null renders as nothing)
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // For objects/arrays, return compact JSON representation
        other => other.to_string(),
    }
}

/// Escape `& < > " '` for HTML text and attribute context
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}
