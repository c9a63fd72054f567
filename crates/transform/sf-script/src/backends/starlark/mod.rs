//! Starlark backend.
//!
//! Scripts are Starlark modules defining top-level functions:
//!
//! ```text
//! def keyTransform(key):
//!     return key + "123"
//!
//! def valueTransform(value):
//!     value["qweqweq"] = 12312312
//!     return value
//! ```
//!
//! Each script is evaluated once into its own frozen module. Frozen values
//! are immutable, so every call gets a fresh heap and no state carries over
//! between records.

mod conversion;

use super::FunctionTable;
use starlark::docs::{DocItem, DocMember, DocParams};
use starlark::environment::{Globals, Module};
use starlark::eval::Evaluator;
use starlark::syntax::{AstModule, Dialect};
use starlark::values::{OwnedFrozenValue, Value as StarlarkValue};
use sf_error::{CompilationError, InvokeError, ScriptFailure};
use sf_traits::{KeyFunctionHandle, ScriptEngine, ScriptRuntime, ValueFunctionHandle};
use sf_types::{FunctionKind, Map, Value};
use tracing::{debug, trace};

const ENGINE_NAME: &str = "starlark";

/// Factory for Starlark runtimes.
#[derive(Debug, Default, Clone, Copy)]
pub struct StarlarkEngine;

impl ScriptEngine for StarlarkEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn create_runtime(&self) -> Result<Box<dyn ScriptRuntime>, CompilationError> {
        Ok(Box::new(StarlarkRuntime::new()))
    }
}

pub(crate) struct StarlarkRuntime {
    globals: Globals,
    functions: FunctionTable<OwnedFrozenValue>,
}

impl StarlarkRuntime {
    fn new() -> Self {
        Self {
            globals: Globals::standard(),
            functions: FunctionTable::new(),
        }
    }

    fn compile(&mut self, source: &str, kind: FunctionKind) -> Result<usize, CompilationError> {
        let name = kind.function_name();
        let ast = AstModule::parse(&format!("{name}.star"), source.to_string(), &Dialect::Standard)
            .map_err(|e| CompilationError::syntax(ENGINE_NAME, kind, e))?;

        let module = Module::new();
        {
            let mut eval = Evaluator::new(&module);
            eval.eval_module(ast, &self.globals)
                .map_err(|e| CompilationError::runtime(ENGINE_NAME, e))?;
        }
        let frozen = module
            .freeze()
            .map_err(|e| CompilationError::runtime(ENGINE_NAME, starlark::Error::from(e)))?;

        let function = frozen
            .get_option(name)
            .map_err(|e| CompilationError::runtime(ENGINE_NAME, e))?
            .ok_or_else(|| CompilationError::missing_function(ENGINE_NAME, kind))?;

        match function.value().documentation() {
            DocItem::Member(DocMember::Function(doc)) => {
                if !accepts_single_argument(&doc.params) {
                    return Err(CompilationError::arity(
                        ENGINE_NAME,
                        kind,
                        "must be callable with exactly one positional argument",
                    ));
                }
            }
            _ => return Err(CompilationError::missing_function(ENGINE_NAME, kind)),
        }

        debug!(function = name, "Compiled Starlark function");
        Ok(self.functions.insert(function))
    }

    /// Calls a compiled function on a fresh heap, converting the argument
    /// and result with the supplied closures.
    fn call<T>(
        &self,
        slot: usize,
        arg: impl for<'v> FnOnce(&'v Module) -> StarlarkValue<'v>,
        result: impl for<'v> FnOnce(StarlarkValue<'v>) -> Result<T, InvokeError>,
    ) -> Result<T, InvokeError> {
        let function = self.functions.get(slot)?;
        let module = Module::new();
        let mut eval = Evaluator::new(&module);
        let callee = function.owned_value(module.frozen_heap());
        let arg = arg(&module);
        let value = eval
            .eval_function(callee, &[arg], &[])
            .map_err(ScriptFailure::new)?;
        result(value)
    }
}

/// A function qualifies when one positional argument satisfies every
/// required parameter.
fn accepts_single_argument(params: &DocParams) -> bool {
    let positional = params.pos_only.iter().chain(&params.pos_or_named);
    let required_positional = positional
        .clone()
        .filter(|p| p.default_value.is_none())
        .count();
    let takes_positional = positional.count() > 0 || params.args.is_some();
    let required_named = params
        .named_only
        .iter()
        .filter(|p| p.default_value.is_none())
        .count();

    takes_positional && required_positional <= 1 && required_named == 0
}

impl ScriptRuntime for StarlarkRuntime {
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
        trace!("Calling Starlark keyTransform");
        self.call(
            handle.slot(),
            |module| conversion::to_starlark(key, module.heap()),
            |value| Ok(conversion::from_starlark(value)?),
        )
    }

    fn invoke_value(&mut self, handle: ValueFunctionHandle, value: &Map) -> Result<Map, InvokeError> {
        trace!("Calling Starlark valueTransform");
        self.call(
            handle.slot(),
            |module| conversion::map_to_starlark(value, module.heap()),
            |value| Ok(conversion::map_from_starlark(value)?),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> StarlarkRuntime {
        StarlarkRuntime::new()
    }

    #[test]
    fn test_key_transform() {
        let mut rt = runtime();
        let handle = rt
            .compile_key_function("def keyTransform(key):\n    return key + \"123\"\n")
            .unwrap();
        assert_eq!(
            rt.invoke_key(handle, &Value::from("abc")).unwrap(),
            Value::from("abc123")
        );
    }

    #[test]
    fn test_value_transform() {
        let mut rt = runtime();
        let handle = rt
            .compile_value_function(
                "def valueTransform(v):\n    v[\"qweqweq\"] = 12312312\n    return v\n",
            )
            .unwrap();

        let mut input = Map::new();
        input.insert("created_when".to_string(), Value::from("2019-05-31T00:17:00.188Z"));
        let output = rt.invoke_value(handle, &input).unwrap();

        assert_eq!(output.len(), 2);
        assert_eq!(output.get("qweqweq"), Some(&Value::Int(12312312)));
    }

    #[test]
    fn test_lambda_binding() {
        let mut rt = runtime();
        let handle = rt
            .compile_key_function("keyTransform = lambda k: k * 2")
            .unwrap();
        assert_eq!(rt.invoke_key(handle, &Value::Int(21)).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_default_parameters_allowed() {
        let mut rt = runtime();
        rt.compile_key_function("def keyTransform(k, suffix = \"!\"):\n    return k + suffix\n")
            .unwrap();
    }

    #[test]
    fn test_syntax_error() {
        let err = runtime()
            .compile_key_function("def keyTransform(key)\n    return key\n")
            .unwrap_err();
        assert!(matches!(err, CompilationError::Syntax { .. }));
    }

    #[test]
    fn test_missing_function() {
        let err = runtime()
            .compile_value_function("def other(v):\n    return v\n")
            .unwrap_err();
        assert!(matches!(err, CompilationError::MissingFunction { .. }));
    }

    #[test]
    fn test_non_function_binding() {
        let err = runtime()
            .compile_value_function("valueTransform = 3\n")
            .unwrap_err();
        assert!(matches!(err, CompilationError::MissingFunction { .. }));
    }

    #[test]
    fn test_wrong_arity() {
        let err = runtime()
            .compile_key_function("def keyTransform(a, b):\n    return a\n")
            .unwrap_err();
        assert!(matches!(err, CompilationError::Arity { .. }));
    }

    #[test]
    fn test_runtime_error() {
        let mut rt = runtime();
        let handle = rt
            .compile_value_function("def valueTransform(v):\n    return v[\"missing\"]\n")
            .unwrap();
        let err = rt.invoke_value(handle, &Map::new()).unwrap_err();
        assert!(matches!(err, InvokeError::Script(_)));
    }

    #[test]
    fn test_calls_do_not_share_state() {
        let mut rt = runtime();
        let handle = rt
            .compile_value_function(
                "def valueTransform(v):\n    v[\"n\"] = v.get(\"n\", 0) + 1\n    return v\n",
            )
            .unwrap();
        for _ in 0..3 {
            let out = rt.invoke_value(handle, &Map::new()).unwrap();
            assert_eq!(out.get("n"), Some(&Value::Int(1)));
        }
    }
}
