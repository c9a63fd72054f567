//! Rhai backend.
//!
//! Scripts define plain Rhai functions:
//!
//! ```text
//! fn keyTransform(key) { key + "123" }
//! fn valueTransform(value) { value.qweqweq = 12312312; value }
//! ```
//!
//! Functions are called directly from the compiled AST without evaluating
//! top-level statements.

mod conversion;

use super::FunctionTable;
use rhai::{CallFnOptions, Dynamic, Engine, OptimizationLevel, Scope, AST};
use sf_error::{CompilationError, InvokeError, ScriptFailure};
use sf_traits::{KeyFunctionHandle, ScriptEngine, ScriptRuntime, ValueFunctionHandle};
use sf_types::{FunctionKind, Map, Value};
use tracing::{debug, trace};

const ENGINE_NAME: &str = "rhai";

/// Factory for Rhai runtimes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RhaiEngine;

impl ScriptEngine for RhaiEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn create_runtime(&self) -> Result<Box<dyn ScriptRuntime>, CompilationError> {
        Ok(Box::new(RhaiRuntime::new()))
    }
}

/// A compiled function: the AST it lives in and the name to call.
struct RhaiFunction {
    ast: AST,
    name: &'static str,
}

/// One Rhai engine plus the scripts compiled against it.
pub(crate) struct RhaiRuntime {
    engine: Engine,
    functions: FunctionTable<RhaiFunction>,

    /// Reused across calls; cleared before each one.
    scope: Scope<'static>,
}

impl std::fmt::Debug for RhaiRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiRuntime").finish_non_exhaustive()
    }
}

impl RhaiRuntime {
    fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_optimization_level(OptimizationLevel::Full);

        Self {
            engine,
            functions: FunctionTable::new(),
            scope: Scope::new(),
        }
    }

    fn compile(&mut self, source: &str, kind: FunctionKind) -> Result<usize, CompilationError> {
        let name = kind.function_name();
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| CompilationError::syntax(ENGINE_NAME, kind, e))?;

        let arities: Vec<usize> = ast
            .iter_functions()
            .filter(|f| f.name == name)
            .map(|f| f.params.len())
            .collect();

        if arities.is_empty() {
            return Err(CompilationError::missing_function(ENGINE_NAME, kind));
        }
        if !arities.contains(&1) {
            return Err(CompilationError::arity(
                ENGINE_NAME,
                kind,
                format!("declared with {arities:?} parameters"),
            ));
        }

        debug!(function = name, "Compiled Rhai function");
        Ok(self.functions.insert(RhaiFunction { ast, name }))
    }

    fn call(&mut self, slot: usize, arg: Dynamic) -> Result<Dynamic, InvokeError> {
        let function = self.functions.get(slot)?;
        self.scope.clear();

        trace!(function = function.name, "Calling Rhai function");

        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        self.engine
            .call_fn_with_options::<Dynamic>(
                options,
                &mut self.scope,
                &function.ast,
                function.name,
                (arg,),
            )
            .map_err(|e| ScriptFailure::new(e).into())
    }
}

impl ScriptRuntime for RhaiRuntime {
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
        let result = self.call(handle.slot(), conversion::to_dynamic(key))?;
        Ok(conversion::from_dynamic(result)?)
    }

    fn invoke_value(&mut self, handle: ValueFunctionHandle, value: &Map) -> Result<Map, InvokeError> {
        let arg = Dynamic::from_map(conversion::map_to_rhai(value));
        let result = self.call(handle.slot(), arg)?;
        Ok(conversion::map_from_dynamic(result)?)
    }

    fn invoke_value_owned(
        &mut self,
        handle: ValueFunctionHandle,
        value: Map,
    ) -> Result<Map, InvokeError> {
        let result = self.call(handle.slot(), conversion::into_dynamic(Value::Map(value)))?;
        Ok(conversion::map_from_dynamic(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> RhaiRuntime {
        RhaiRuntime::new()
    }

    #[test]
    fn test_key_transform() {
        let mut rt = runtime();
        let handle = rt
            .compile_key_function(r#"fn keyTransform(key) { key + "123" }"#)
            .unwrap();
        let key = rt.invoke_key(handle, &Value::from("abc")).unwrap();
        assert_eq!(key, Value::from("abc123"));
    }

    #[test]
    fn test_value_transform() {
        let mut rt = runtime();
        let handle = rt
            .compile_value_function("fn valueTransform(v) { v.qweqweq = 12312312; v }")
            .unwrap();

        let mut input = Map::new();
        input.insert("created_when".to_string(), Value::from("2019-05-31T00:17:00.188Z"));

        let output = rt.invoke_value(handle, &input).unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(output.get("qweqweq"), Some(&Value::Int(12312312)));
        // The caller's map is untouched
        assert_eq!(input.len(), 1);
    }

    #[test]
    fn test_syntax_error() {
        let err = runtime()
            .compile_key_function("fn keyTransform(key) { key + ")
            .unwrap_err();
        assert!(matches!(err, CompilationError::Syntax { .. }));
    }

    #[test]
    fn test_missing_function() {
        let err = runtime()
            .compile_value_function("fn somethingElse(v) { v }")
            .unwrap_err();
        assert!(matches!(err, CompilationError::MissingFunction { .. }));
    }

    #[test]
    fn test_wrong_arity() {
        let err = runtime()
            .compile_key_function("fn keyTransform(a, b) { a + b }")
            .unwrap_err();
        assert!(matches!(err, CompilationError::Arity { .. }));
    }

    #[test]
    fn test_runtime_error() {
        let mut rt = runtime();
        let handle = rt
            .compile_key_function(r#"fn keyTransform(key) { throw "bad key: " + key; }"#)
            .unwrap();
        let err = rt.invoke_key(handle, &Value::from("abc")).unwrap_err();
        match err {
            InvokeError::Script(failure) => assert!(failure.message.contains("bad key: abc")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_map_result() {
        let mut rt = runtime();
        let handle = rt
            .compile_value_function("fn valueTransform(v) { 42 }")
            .unwrap();
        let err = rt.invoke_value(handle, &Map::new()).unwrap_err();
        assert!(matches!(err, InvokeError::Marshal(_)));
    }

    #[test]
    fn test_no_state_between_calls() {
        let mut rt = runtime();
        let handle = rt
            .compile_value_function(
                r#"fn valueTransform(v) {
                    if type_of(v.count) == "()" { v.count = 0; }
                    v.count += 1;
                    v
                }"#,
            )
            .unwrap();
        for _ in 0..3 {
            let out = rt.invoke_value(handle, &Map::new()).unwrap();
            assert_eq!(out.get("count"), Some(&Value::Int(1)));
        }
    }
}
