//! Script engine backends.
//!
//! Each backend pairs a [`ScriptEngine`](sf_traits::ScriptEngine) factory
//! with a runtime type and a `conversion` module that marshals
//! [`Value`](sf_types::Value)s to and from the runtime's native values.

mod javascript;
mod jq;
mod lua;
#[cfg(feature = "python")]
mod python;
mod rhai;
mod starlark;

pub use self::javascript::JavaScriptEngine;
pub use self::jq::JqEngine;
pub use self::lua::LuaEngine;
#[cfg(feature = "python")]
pub use self::python::PythonEngine;
pub use self::rhai::RhaiEngine;
pub use self::starlark::StarlarkEngine;

use sf_error::{InvokeError, ScriptFailure};

/// Compiled functions owned by one runtime, addressed by handle slot.
pub(crate) struct FunctionTable<F> {
    functions: Vec<F>,
}

impl<F> FunctionTable<F> {
    pub(crate) fn new() -> Self {
        Self {
            functions: Vec::with_capacity(2),
        }
    }

    /// Stores a compiled function and returns its slot.
    pub(crate) fn insert(&mut self, function: F) -> usize {
        self.functions.push(function);
        self.functions.len() - 1
    }

    pub(crate) fn get(&self, slot: usize) -> Result<&F, InvokeError> {
        self.functions.get(slot).ok_or_else(|| {
            ScriptFailure::new(format!("no compiled function in slot {slot}")).into()
        })
    }
}

impl<F> Default for FunctionTable<F> {
    fn default() -> Self {
        Self::new()
    }
}
