//! Controllers for `{{#with ... controller='name'}}`
//!
//! A controller decorates a model value with computed properties. The
//! wrapped value is a proxy object: the model's own fields, the model itself
//! under `model`, and the controller's properties on top.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::error::ScopeError;
use crate::stream::Stream;

/// Key under which the proxy exposes the wrapped model
pub const MODEL_KEY: &str = "model";

pub trait Controller: Send + Sync {
    /// Computed properties for `model`
    fn properties(&self, model: &Value) -> Map<String, Value>;
}

impl<F> Controller for F
where
    F: Fn(&Value) -> Map<String, Value> + Send + Sync,
{
    fn properties(&self, model: &Value) -> Map<String, Value> {
        self(model)
    }
}

/// Named controllers available to templates
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    controllers: FxHashMap<String, Arc<dyn Controller>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, controller: impl Controller + 'static) {
        self.controllers.insert(name.into(), Arc::new(controller));
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Controller>, ScopeError> {
        self.controllers
            .get(name)
            .cloned()
            .ok_or_else(|| ScopeError::UnknownController {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.controllers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.controllers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("controllers", &self.names())
            .finish()
    }
}

/// Build the proxy object for one model value
pub fn wrap(controller: &dyn Controller, model: &Value) -> Value {
    let mut proxy = match model {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };
    proxy.insert(MODEL_KEY.to_string(), model.clone());
    proxy.extend(controller.properties(model));
    Value::Object(proxy)
}

/// Derived stream that re-wraps the model on every read
pub fn wrap_stream(name: &str, controller: Arc<dyn Controller>, model: &Stream) -> Stream {
    let label = format!("{}({})", name, model.label());
    model
        .map(move |value| wrap(controller.as_ref(), value))
        .labeled(label)
}
