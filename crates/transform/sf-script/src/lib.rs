//! Scripted record transforms for scriptflow.
//!
//! This crate provides [`ScriptTransformer`], a record transform whose key
//! and value functions are written in an embedded scripting language chosen
//! by name at configuration time.
//!
//! # Features
//!
//! - **Pluggable engines**: `rhai`, `lua`, `javascript`, `starlark`, `jq`,
//!   and `python` behind the `python` cargo feature
//! - **Compile once, invoke many**: scripts are compiled when the transformer
//!   is configured and invoked per record through opaque handles
//! - **Per-thread runtimes**: each calling thread gets its own interpreter,
//!   so the steady-state path takes no locks
//! - **Pass-through**: an absent or blank script leaves its field untouched
//!
//! # Example
//!
//! ```rust,ignore
//! use sf_script::{ScriptTransformer, TransformerConfig};
//! use sf_traits::Transform;
//!
//! let config = TransformerConfig::new("javascript")
//!     .with_key_script("function keyTransform(k) { return k + '123'; }")
//!     .with_value_script("function valueTransform(v) { v.qweqweq = 12312312; return v; }");
//!
//! let transformer = ScriptTransformer::from_config(config)?;
//! let output = transformer.apply(&record)?;
//! ```

mod backends;
mod config;
mod native;
mod pool;
mod registry;
mod stats;
mod transformer;

pub use backends::{JavaScriptEngine, JqEngine, LuaEngine, RhaiEngine, StarlarkEngine};
#[cfg(feature = "python")]
pub use backends::PythonEngine;
pub use config::{
    TransformerConfig, ENGINE_NAME_CONFIG, KEY_SCRIPT_CONFIG, VALUE_SCRIPT_CONFIG,
};
pub use native::NativeTransformer;
pub use registry::EngineRegistry;
pub use stats::{TransformStats, TransformStatsSnapshot};
pub use transformer::ScriptTransformer;
