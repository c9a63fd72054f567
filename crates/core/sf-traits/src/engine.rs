//! Script engine capability traits.
//!
//! Every supported dialect implements the same two-phase contract: compile
//! a named function from source text into an opaque handle, then invoke the
//! handle any number of times. The transformer only sees these traits, never
//! the runtime's own value or function types.

use sf_error::{CompilationError, InvokeError};
use sf_types::{Map, Value};

/// Opaque reference to a compiled `keyTransform`.
///
/// A handle is only meaningful to the [`ScriptRuntime`] that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyFunctionHandle(usize);

impl KeyFunctionHandle {
    pub fn new(slot: usize) -> Self {
        Self(slot)
    }

    pub fn slot(self) -> usize {
        self.0
    }
}

/// Opaque reference to a compiled `valueTransform`.
///
/// A handle is only meaningful to the [`ScriptRuntime`] that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueFunctionHandle(usize);

impl ValueFunctionHandle {
    pub fn new(slot: usize) -> Self {
        Self(slot)
    }

    pub fn slot(self) -> usize {
        self.0
    }
}

/// Factory for runtimes of one scripting dialect.
///
/// Engines are shared across threads and registered by name. Creating a
/// runtime is comparatively expensive and happens once per transformer per
/// thread.
pub trait ScriptEngine: Send + Sync {
    /// Returns the case-sensitive name used in `engine-name`.
    fn name(&self) -> &str;

    /// Creates a fresh interpreter with no compiled functions.
    ///
    /// # Errors
    ///
    /// Returns [`CompilationError::Runtime`] if the interpreter cannot be
    /// initialized.
    fn create_runtime(&self) -> Result<Box<dyn ScriptRuntime>, CompilationError>;
}

/// A single interpreter instance.
///
/// Runtimes are not required to be `Send`: most embedded interpreters keep
/// thread-affine state. Callers confine each runtime to the thread that
/// created it.
pub trait ScriptRuntime {
    /// Compiles `source` and locates its top-level `keyTransform`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source does not parse, does not define
    /// `keyTransform`, or defines it with an arity that cannot take exactly
    /// one argument.
    fn compile_key_function(&mut self, source: &str) -> Result<KeyFunctionHandle, CompilationError>;

    /// Compiles `source` and locates its top-level `valueTransform`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ScriptRuntime::compile_key_function`].
    fn compile_value_function(
        &mut self,
        source: &str,
    ) -> Result<ValueFunctionHandle, CompilationError>;

    /// Runs a compiled `keyTransform` once.
    fn invoke_key(&mut self, handle: KeyFunctionHandle, key: &Value) -> Result<Value, InvokeError>;

    /// Runs a compiled `valueTransform` once.
    ///
    /// The script receives a copy of `value`; the result must be a mapping.
    fn invoke_value(&mut self, handle: ValueFunctionHandle, value: &Map) -> Result<Map, InvokeError>;

    /// Runs a compiled `valueTransform`, taking ownership of the input.
    ///
    /// Runtimes whose native mapping can reuse host allocations override this
    /// to avoid a copy.
    fn invoke_value_owned(
        &mut self,
        handle: ValueFunctionHandle,
        value: Map,
    ) -> Result<Map, InvokeError> {
        self.invoke_value(handle, &value)
    }

    /// Returns false if dropping this runtime while its thread is exiting is
    /// unsound, typically because the interpreter keeps its heap in a
    /// thread-local that may already be destroyed. Such runtimes are leaked
    /// at thread exit instead.
    fn drop_on_thread_exit(&self) -> bool {
        true
    }
}
