//! Embedded CPython backend, enabled with the `python` feature.
//!
//! Scripts are module sources defining top-level functions:
//!
//! ```text
//! def keyTransform(key):
//!     return key + "123"
//! ```
//!
//! Every script is loaded as its own module, so helper names never clash
//! between the key and value scripts.

mod conversion;

use super::FunctionTable;
use pyo3::exceptions::PyTypeError;
use pyo3::prelude::*;
use pyo3::types::PyModule;
use sf_error::{CompilationError, InvokeError, MarshalError, ScriptFailure};
use sf_traits::{KeyFunctionHandle, ScriptEngine, ScriptRuntime, ValueFunctionHandle};
use sf_types::{FunctionKind, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

const ENGINE_NAME: &str = "python";

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(0);

/// Factory for Python runtimes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonEngine;

impl ScriptEngine for PythonEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn create_runtime(&self) -> Result<Box<dyn ScriptRuntime>, CompilationError> {
        Ok(Box::new(PythonRuntime::default()))
    }
}

#[derive(Default)]
pub(crate) struct PythonRuntime {
    functions: FunctionTable<Py<PyAny>>,
}

impl PythonRuntime {
    fn compile(&mut self, source: &str, kind: FunctionKind) -> Result<usize, CompilationError> {
        let name = kind.function_name();
        let id = NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed);
        let module_name = format!("sf_script_{id}");

        let function = Python::with_gil(|py| {
            let module = PyModule::from_code_bound(py, source, &format!("{name}.py"), &module_name)
                .map_err(|e| CompilationError::syntax(ENGINE_NAME, kind, e))?;

            let function = match module.getattr(name) {
                Ok(function) if function.is_callable() => function,
                _ => return Err(CompilationError::missing_function(ENGINE_NAME, kind)),
            };
            check_arity(py, &function, kind)?;
            Ok(function.unbind())
        })?;

        debug!(function = name, module = %module_name, "Compiled Python function");
        Ok(self.functions.insert(function))
    }
}

/// Binds a single positional argument against the function signature.
/// Callables without an inspectable signature are accepted.
fn check_arity(py: Python<'_>, function: &Bound<'_, PyAny>, kind: FunctionKind) -> Result<(), CompilationError> {
    let inspect = PyModule::import_bound(py, "inspect")
        .map_err(|e| CompilationError::runtime(ENGINE_NAME, e))?;
    let Ok(signature) = inspect.call_method1("signature", (function,)) else {
        return Ok(());
    };
    match signature.call_method1("bind", (py.None(),)) {
        Ok(_) => Ok(()),
        Err(e) if e.is_instance_of::<PyTypeError>(py) => {
            Err(CompilationError::arity(ENGINE_NAME, kind, e))
        }
        Err(e) => Err(CompilationError::runtime(ENGINE_NAME, e)),
    }
}

impl ScriptRuntime for PythonRuntime {
    fn compile_key_function(&mut self, source: &str) -> Result<KeyFunctionHandle, CompilationError> {
        self.compile(source, FunctionKind::Key)
            .map(KeyFunctionHandle::new)
    }

    fn compile_value_function(
        &mut self,
        source: &str,
    ) -> Result<ValueFunctionHandle, CompilationError> {
        self.compile(source, FunctionKind::Value)
            .map(ValueFunctionHandle::new)
    }

    fn invoke_key(&mut self, handle: KeyFunctionHandle, key: &Value) -> Result<Value, InvokeError> {
        trace!("Calling Python keyTransform");
        let function = self.functions.get(handle.slot())?;
        Python::with_gil(|py| {
            let arg = conversion::to_py(py, key).map_err(MarshalError::backend)?;
            let result = function
                .bind(py)
                .call1((arg,))
                .map_err(ScriptFailure::new)?;
            Ok(conversion::from_py(&result)?)
        })
    }

    fn invoke_value(&mut self, handle: ValueFunctionHandle, value: &Map) -> Result<Map, InvokeError> {
        trace!("Calling Python valueTransform");
        let function = self.functions.get(handle.slot())?;
        Python::with_gil(|py| {
            let arg = conversion::map_to_py(py, value).map_err(MarshalError::backend)?;
            let result = function
                .bind(py)
                .call1((arg,))
                .map_err(ScriptFailure::new)?;
            Ok(conversion::map_from_py(&result)?)
        })
    }
}
