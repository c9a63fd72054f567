//! Engine registry - resolves engine names to script engine factories.

use crate::backends::{JavaScriptEngine, JqEngine, LuaEngine, RhaiEngine, StarlarkEngine};
use indexmap::IndexMap;
use sf_error::ConfigError;
use sf_traits::ScriptEngine;
use std::sync::Arc;
use tracing::debug;

/// Registry of available script engines, keyed by engine name.
///
/// Names are matched exactly (case-sensitive). Iteration follows
/// registration order.
#[derive(Clone)]
pub struct EngineRegistry {
    engines: IndexMap<String, Arc<dyn ScriptEngine>>,
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EngineRegistry {
    /// Creates a registry with no engines.
    pub fn empty() -> Self {
        Self {
            engines: IndexMap::new(),
        }
    }

    /// Creates a registry holding every backend compiled into this build.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(RhaiEngine));
        registry.register(Arc::new(LuaEngine));
        registry.register(Arc::new(JavaScriptEngine));
        registry.register(Arc::new(StarlarkEngine));
        registry.register(Arc::new(JqEngine));
        #[cfg(feature = "python")]
        registry.register(Arc::new(crate::backends::PythonEngine));
        registry
    }

    /// Registers an engine under its own name, replacing any engine already
    /// registered with that name.
    pub fn register(&mut self, engine: Arc<dyn ScriptEngine>) -> &mut Self {
        let name = engine.name().to_string();
        debug!(engine = %name, "Registered script engine");
        self.engines.insert(name, engine);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ScriptEngine>> {
        self.engines.get(name).cloned()
    }

    /// Looks up an engine, failing with [`ConfigError::UnknownEngine`]
    /// listing the available names.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ScriptEngine>, ConfigError> {
        self.get(name).ok_or_else(|| ConfigError::UnknownEngine {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    /// Registered engine names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
