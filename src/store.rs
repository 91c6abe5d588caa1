//! Reactive data store
//!
//! A single JSON root guarded by a `parking_lot::RwLock`, plus a registry of
//! path watchers. Writes notify every watcher whose path overlaps the written
//! path (ancestors and descendants alike). Notification happens after all
//! internal locks are released, so watchers may read the store freely.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ScopeError;
use crate::path::{self, KeyPath};
use crate::stream::Stream;

type Notify = Arc<dyn Fn() + Send + Sync>;

struct Watcher {
    path: Vec<String>,
    notify: Notify,
}

struct StoreInner {
    root: RwLock<Value>,
    watchers: RwLock<FxHashMap<u64, Watcher>>,
    next_id: AtomicU64,
}

/// Shared, observable JSON document
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn new(root: Value) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                root: RwLock::new(root),
                watchers: RwLock::new(FxHashMap::default()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Value at `segments` (cloned), `Value::Null` when absent
    pub fn get(&self, segments: &[String]) -> Value {
        let root = self.inner.root.read();
        path::lookup_segments(&root, segments)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Copy of the whole document
    pub fn snapshot(&self) -> Value {
        self.inner.root.read().clone()
    }

    /// Set the value at a dotted path and notify overlapping watchers
    ///
    /// Returns the number of watchers notified (0 when the value is unchanged).
    pub fn set(&self, path: &str, value: Value) -> Result<usize, ScopeError> {
        let path = KeyPath::parse(path)?;
        self.set_path(&path, value)
    }

    pub fn set_path(&self, path: &KeyPath, value: Value) -> Result<usize, ScopeError> {
        {
            let mut root = self.inner.root.write();
            if path::lookup_segments(&root, path.segments()) == Some(&value) {
                return Ok(0);
            }
            assign(&mut root, path.segments(), value, path.as_str())?;
        }
        Ok(self.notify(path.segments()))
    }

    /// Replace the whole document
    pub fn replace(&self, root: Value) -> usize {
        *self.inner.root.write() = root;
        self.notify(&[])
    }

    /// Binding source for a dotted path
    pub fn stream(&self, path: &str) -> Result<Stream, ScopeError> {
        let path = KeyPath::parse(path)?;
        Ok(Stream::from_store(self.clone(), path.segments().to_vec()))
    }

    /// Binding source for the document root
    pub fn root_stream(&self) -> Stream {
        Stream::from_store(self.clone(), Vec::new())
    }

    /// Register a watcher; it stays active until the subscription drops
    pub(crate) fn watch(&self, path: Vec<String>, notify: Notify) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.watchers.write().insert(id, Watcher { path, notify });
        Subscription {
            handle: Some((Arc::downgrade(&self.inner), id)),
        }
    }

    /// Number of live watchers
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.read().len()
    }

    fn notify(&self, changed: &[String]) -> usize {
        // Collect first: callbacks run without holding the watcher lock
        let pending: Vec<Notify> = self
            .inner
            .watchers
            .read()
            .values()
            .filter(|w| path::overlaps(&w.path, changed))
            .map(|w| Arc::clone(&w.notify))
            .collect();

        debug!(path = %changed.join("."), watchers = pending.len(), "store changed");

        for notify in &pending {
            notify();
        }
        pending.len()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("watchers", &self.watcher_count())
            .finish()
    }
}

/// Write `value` at `segments`, creating intermediate objects as needed
fn assign(root: &mut Value, segments: &[String], value: Value, full_path: &str) -> Result<(), ScopeError> {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for segment in parents {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let len = items.len();
                segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| ScopeError::InvalidAssignment {
                        segment: segment.clone(),
                        value_type: format!("array of length {len}"),
                        path: full_path.to_string(),
                    })?
            }
            other => {
                return Err(ScopeError::InvalidAssignment {
                    segment: segment.clone(),
                    value_type: path::value_type(other).to_string(),
                    path: full_path.to_string(),
                })
            }
        };
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => match last.parse::<usize>() {
            Ok(i) if i < items.len() => {
                items[i] = value;
                Ok(())
            }
            Ok(i) if i == items.len() => {
                items.push(value);
                Ok(())
            }
            _ => Err(ScopeError::InvalidAssignment {
                segment: last.clone(),
                value_type: format!("array of length {}", items.len()),
                path: full_path.to_string(),
            }),
        },
        other => Err(ScopeError::InvalidAssignment {
            segment: last.clone(),
            value_type: path::value_type(other).to_string(),
            path: full_path.to_string(),
        }),
    }
}

/// Handle to a store watcher; dropping it unsubscribes
///
/// Subscriptions to constant sources are inert.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    handle: Option<(Weak<StoreInner>, u64)>,
}

impl Subscription {
    pub fn inert() -> Self {
        Self { handle: None }
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .and_then(|(store, _)| store.upgrade())
            .is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some((store, id)) = self.handle.take() {
            if let Some(store) = store.upgrade() {
                store.watchers.write().remove(&id);
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
