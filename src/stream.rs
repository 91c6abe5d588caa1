//! Binding sources
//!
//! A `Stream` is a live reference to a value: a path into a [`Store`], a
//! constant, or a value derived from another stream. Subscribing to a
//! derived stream subscribes to the stream it was derived from.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::path;
use crate::store::{Store, Subscription};

type MapFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Clone)]
enum Source {
    Path { store: Store, segments: Vec<String> },
    Constant(Arc<Value>),
    Mapped { inner: Arc<Stream>, map: MapFn },
}

/// Observable reference to a value
#[derive(Clone)]
pub struct Stream {
    source: Source,
    label: Arc<str>,
}

impl Stream {
    pub(crate) fn from_store(store: Store, segments: Vec<String>) -> Self {
        let label = if segments.is_empty() {
            Arc::from("this")
        } else {
            Arc::from(segments.join("."))
        };
        Self {
            source: Source::Path { store, segments },
            label,
        }
    }

    /// Stream that never changes
    pub fn constant(value: Value) -> Self {
        let label = Arc::from(value.to_string());
        Self {
            source: Source::Constant(Arc::new(value)),
            label,
        }
    }

    /// Current value (`Value::Null` when the path is absent)
    pub fn value(&self) -> Value {
        match &self.source {
            Source::Path { store, segments } => store.get(segments),
            Source::Constant(value) => value.as_ref().clone(),
            Source::Mapped { inner, map } => map(&inner.value()),
        }
    }

    /// Call `notify` whenever the underlying value may have changed
    pub fn subscribe(&self, notify: impl Fn() + Send + Sync + 'static) -> Subscription {
        match &self.source {
            Source::Path { store, segments } => store.watch(segments.clone(), Arc::new(notify)),
            Source::Constant(_) => Subscription::inert(),
            Source::Mapped { inner, .. } => inner.subscribe(notify),
        }
    }

    /// Stream for a nested path below this one
    pub fn child(&self, segments: &[String]) -> Stream {
        if segments.is_empty() {
            return self.clone();
        }
        let label: Arc<str> = Arc::from(format!("{}.{}", self.label, segments.join(".")));
        match &self.source {
            Source::Path {
                store,
                segments: base,
            } => {
                let mut full = base.clone();
                full.extend(segments.iter().cloned());
                Self {
                    source: Source::Path {
                        store: store.clone(),
                        segments: full,
                    },
                    label,
                }
            }
            Source::Constant(value) => Self {
                source: Source::Constant(Arc::new(
                    path::lookup_segments(value, segments)
                        .cloned()
                        .unwrap_or(Value::Null),
                )),
                label,
            },
            Source::Mapped { .. } => {
                let segments = segments.to_vec();
                let mut mapped = self.map(move |v| {
                    path::lookup_segments(v, &segments)
                        .cloned()
                        .unwrap_or(Value::Null)
                });
                mapped.label = label;
                mapped
            }
        }
    }

    /// Derived stream: `f` is applied to every read of this stream
    pub fn map(&self, f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Stream {
        Self {
            source: Source::Mapped {
                inner: Arc::new(self.clone()),
                map: Arc::new(f),
            },
            label: Arc::clone(&self.label),
        }
    }

    /// Rename for logs and diagnostics
    pub fn labeled(mut self, label: impl Into<String>) -> Stream {
        self.label = Arc::from(label.into());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_constant(&self) -> bool {
        match &self.source {
            Source::Constant(_) => true,
            Source::Path { .. } => false,
            Source::Mapped { inner, .. } => inner.is_constant(),
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            Source::Path { .. } => "path",
            Source::Constant(_) => "constant",
            Source::Mapped { .. } => "mapped",
        };
        f.debug_struct("Stream")
            .field("kind", &kind)
            .field("label", &self.label)
            .finish()
    }
}
