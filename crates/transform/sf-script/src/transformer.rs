//! ScriptTransformer - the configurable, scripted record transform.

use crate::config::TransformerConfig;
use crate::pool::{RuntimePool, ScriptSources};
use crate::registry::EngineRegistry;
use crate::stats::{TransformStats, TransformStatsSnapshot};
use sf_error::{Direction, MarshalError, Result, SfError};
use sf_traits::Transform;
use sf_types::{FunctionKind, Record, RecordId, Value};
use std::sync::Arc;
use tracing::{debug, trace};

/// Record transform driven by user scripts in any registered engine.
///
/// A transformer starts unconfigured. [`configure`](Self::configure) must be
/// called exactly once; it resolves the engine, compiles the scripts on the
/// calling thread and fails with a configuration or compilation error if
/// anything is wrong. A failed `configure` leaves the transformer
/// unconfigured, and configuring twice is an illegal-state error.
///
/// Once configured the transformer is `Send + Sync` and can be shared by any
/// number of threads. Each thread lazily gets its own interpreter with its
/// own compiled copy of the scripts.
///
/// Interpreters are released when the transformer is dropped, on each
/// thread's next `apply`, or when a thread exits. The exception is the
/// `javascript` engine: boa keeps its heap in a thread-local that may be
/// torn down first, so an interpreter still live when its thread exits is
/// leaked. Every thread that exits while the transformer is alive costs one
/// boa context, so share JavaScript transformers across long-lived worker
/// threads rather than short-lived ones.
///
/// # Example
///
/// ```rust,ignore
/// use sf_script::ScriptTransformer;
/// use sf_traits::Transform;
///
/// let mut transformer = ScriptTransformer::new();
/// transformer.configure([
///     ("engine-name", "lua"),
///     ("key-script", r#"function keyTransform(k) return k .. "123" end"#),
/// ])?;
///
/// let output = transformer.apply(&record)?;
/// ```
pub struct ScriptTransformer {
    registry: Arc<EngineRegistry>,
    state: State,
    name: String,
    stats: Arc<TransformStats>,
}

enum State {
    Unconfigured,
    Configured(Configured),
}

struct Configured {
    config: TransformerConfig,
    engine_name: String,

    /// `None` when neither script is present: pure pass-through.
    pool: Option<RuntimePool>,
}

impl std::fmt::Debug for ScriptTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptTransformer")
            .field("name", &self.name)
            .field("engine", &self.engine_name())
            .finish_non_exhaustive()
    }
}

impl Default for ScriptTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptTransformer {
    /// Creates an unconfigured transformer over the built-in engines.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(EngineRegistry::builtin()))
    }

    /// Creates an unconfigured transformer resolving engines from `registry`.
    pub fn with_registry(registry: Arc<EngineRegistry>) -> Self {
        Self {
            registry,
            state: State::Unconfigured,
            name: "script_transform".to_string(),
            stats: Arc::new(TransformStats::new()),
        }
    }

    /// Creates and configures a transformer in one step.
    pub fn from_config(config: TransformerConfig) -> Result<Self> {
        let mut transformer = Self::new();
        transformer.configure_with(config)?;
        Ok(transformer)
    }

    /// Sets the transform name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Configures from an option map (`engine-name`, `key-script`,
    /// `value-script`). Unrecognized keys are ignored.
    ///
    /// # Errors
    ///
    /// - [`SfError::IllegalState`] if already configured
    /// - [`SfError::Config`] if `engine-name` is missing or unknown
    /// - [`SfError::Compilation`] if a script does not compile
    pub fn configure<I, K, V>(&mut self, options: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.ensure_unconfigured()?;
        let config = TransformerConfig::from_options(options)?;
        self.configure_with(config)
    }

    /// Configures from a typed configuration.
    pub fn configure_with(&mut self, config: TransformerConfig) -> Result<()> {
        self.ensure_unconfigured()?;
        config.validate()?;

        let engine = self.registry.resolve(&config.engine_name)?;
        let sources = ScriptSources {
            key: config.effective_key_script().map(str::to_string),
            value: config.effective_value_script().map(str::to_string),
        };

        let pool = if config.is_passthrough() {
            None
        } else {
            Some(RuntimePool::new(
                Arc::clone(&engine),
                sources,
                Arc::clone(&self.stats),
            )?)
        };

        debug!(
            name = %self.name,
            engine = engine.name(),
            key_script = config.effective_key_script().is_some(),
            value_script = config.effective_value_script().is_some(),
            "Configured script transformer"
        );

        self.state = State::Configured(Configured {
            engine_name: engine.name().to_string(),
            config,
            pool,
        });
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, State::Configured(_))
    }

    /// The active configuration, once configured.
    pub fn config(&self) -> Option<&TransformerConfig> {
        match &self.state {
            State::Configured(configured) => Some(&configured.config),
            State::Unconfigured => None,
        }
    }

    pub fn engine_name(&self) -> Option<&str> {
        match &self.state {
            State::Configured(configured) => Some(&configured.engine_name),
            State::Unconfigured => None,
        }
    }

    /// Snapshot of this transformer's counters.
    pub fn stats(&self) -> TransformStatsSnapshot {
        self.stats.snapshot()
    }

    fn ensure_unconfigured(&self) -> Result<()> {
        match self.state {
            State::Unconfigured => Ok(()),
            State::Configured(_) => Err(SfError::IllegalState(
                "transformer is already configured".to_string(),
            )),
        }
    }

    fn configured(&self) -> Result<&Configured> {
        match &self.state {
            State::Configured(configured) => Ok(configured),
            State::Unconfigured => Err(SfError::IllegalState(
                "apply called before configure".to_string(),
            )),
        }
    }

    fn record_outcome<T>(&self, result: &Result<T>) {
        match result {
            Ok(_) => self.stats.record_success(),
            Err(_) => self.stats.record_failure(),
        }
    }
}

fn expected_mapping(value: &Value, record: &RecordId) -> SfError {
    SfError::Marshal {
        record: record.clone(),
        source: MarshalError::ExpectedMapping {
            shape: value.shape().to_string(),
            direction: Direction::ToScript,
        },
    }
}

impl Transform for ScriptTransformer {
    fn apply(&self, record: &Record) -> Result<Record> {
        let configured = self.configured()?;
        let Some(pool) = &configured.pool else {
            self.stats.record_success();
            return Ok(record.clone());
        };

        trace!(record = %record.id(), "Applying script transform");
        let engine = configured.engine_name.as_str();

        let result = pool.with_instance(|instance| {
            let key = match instance.key {
                Some(handle) => instance
                    .runtime
                    .invoke_key(handle, record.key())
                    .map_err(|e| e.into_sf_error(engine, FunctionKind::Key, record.id()))?,
                None => record.key().clone(),
            };

            let value = match instance.value {
                Some(handle) => {
                    let map = record
                        .value()
                        .as_map()
                        .ok_or_else(|| expected_mapping(record.value(), record.id()))?;
                    let map = instance
                        .runtime
                        .invoke_value(handle, map)
                        .map_err(|e| e.into_sf_error(engine, FunctionKind::Value, record.id()))?;
                    Value::Map(map)
                }
                None => record.value().clone(),
            };

            Ok(record.new_record(key, value))
        });

        self.record_outcome(&result);
        result
    }

    /// Consumes the record, letting runtimes that can reuse the host mapping
    /// skip the copy made by `apply`.
    fn apply_owned(&self, record: Record) -> Result<Record> {
        let configured = self.configured()?;
        let Some(pool) = &configured.pool else {
            self.stats.record_success();
            return Ok(record);
        };

        trace!(record = %record.id(), "Applying script transform (owned)");
        let engine = configured.engine_name.as_str();
        let (id, key, value) = record.into_parts();

        let result = pool.with_instance(|instance| {
            let key = match instance.key {
                Some(handle) => instance
                    .runtime
                    .invoke_key(handle, &key)
                    .map_err(|e| e.into_sf_error(engine, FunctionKind::Key, &id))?,
                None => key,
            };

            let value = match instance.value {
                Some(handle) => {
                    let map = value
                        .into_map()
                        .map_err(|other| expected_mapping(&other, &id))?;
                    let map = instance
                        .runtime
                        .invoke_value_owned(handle, map)
                        .map_err(|e| e.into_sf_error(engine, FunctionKind::Value, &id))?;
                    Value::Map(map)
                }
                None => value,
            };

            Ok(Record::from_parts(id, key, value))
        });

        self.record_outcome(&result);
        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}
