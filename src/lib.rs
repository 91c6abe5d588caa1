//! Scopebind - reactive scope binding for mustache block helpers

pub mod binder;
pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod helpers;
pub mod path;
pub mod render;
pub mod scope;
pub mod store;
pub mod stream;
pub mod template;

pub use binder::{bind, BindRequest, BlockFrame, BlockView, PlainView, WithView};
pub use config::{DeprecationPolicy, RenderConfig};
pub use controller::{Controller, ControllerRegistry};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog, DiagnosticSink, Severity};
pub use error::{FixSuggestion, ScopeError};
pub use helpers::{BlockHelper, Hash, HelperRegistry, Invocation, Param, RenderOptions, WithHelper};
pub use path::KeyPath;
pub use render::{Env, Fragment, RenderedTemplate};
pub use scope::{Keywords, Scope};
pub use store::{Store, Subscription};
pub use stream::Stream;
pub use template::Program;
