//! JavaScript (ECMAScript) backend on boa.
//!
//! Scripts define global functions:
//!
//! ```text
//! function keyTransform(key) { return key + "123"; }
//! function valueTransform(value) { value.qweqweq = 12312312; return value; }
//! ```
//!
//! Functions declaring more than one formal parameter are rejected.
//!
//! Host integers outside the `i32` range reach scripts as `BigInt`s; see
//! [`conversion`] for how numbers map in each direction.

mod conversion;

use self::conversion::JsMarshaler;
use super::FunctionTable;
use boa_engine::{js_string, Context, JsObject, JsString, JsValue, Script, Source};
use sf_error::{CompilationError, InvokeError, ScriptFailure};
use sf_traits::{KeyFunctionHandle, ScriptEngine, ScriptRuntime, ValueFunctionHandle};
use sf_types::{FunctionKind, Map, Value};
use tracing::{debug, trace};

const ENGINE_NAME: &str = "javascript";

/// Factory for JavaScript runtimes.
#[derive(Debug, Default, Clone, Copy)]
pub struct JavaScriptEngine;

impl ScriptEngine for JavaScriptEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn create_runtime(&self) -> Result<Box<dyn ScriptRuntime>, CompilationError> {
        Ok(Box::new(JavaScriptRuntime::new()?))
    }
}

/// One boa context plus the functions compiled into it.
pub(crate) struct JavaScriptRuntime {
    // Object handles are declared before the context so they drop first.
    functions: FunctionTable<JsObject>,
    object_keys: JsObject,
    object_prototype: JsObject,
    context: Context,
}

impl JavaScriptRuntime {
    fn new() -> Result<Self, CompilationError> {
        let mut context = Context::default();
        let object_keys = context
            .eval(Source::from_bytes("Object.keys"))
            .map_err(|e| CompilationError::runtime(ENGINE_NAME, e))?
            .as_callable()
            .cloned()
            .ok_or_else(|| CompilationError::runtime(ENGINE_NAME, "Object.keys is not callable"))?;
        let object_prototype = context.intrinsics().constructors().object().prototype();

        Ok(Self {
            functions: FunctionTable::new(),
            object_keys,
            object_prototype,
            context,
        })
    }

    fn compile(&mut self, source: &str, kind: FunctionKind) -> Result<usize, CompilationError> {
        let name = kind.function_name();
        let context = &mut self.context;

        let script = Script::parse(Source::from_bytes(source), None, context)
            .map_err(|e| CompilationError::syntax(ENGINE_NAME, kind, e))?;
        script
            .evaluate(context)
            .map_err(|e| CompilationError::syntax(ENGINE_NAME, kind, e))?;

        let value = context
            .global_object()
            .get(JsString::from(name), context)
            .map_err(|e| CompilationError::runtime(ENGINE_NAME, e))?;
        let function = value
            .as_callable()
            .cloned()
            .ok_or_else(|| CompilationError::missing_function(ENGINE_NAME, kind))?;

        let declared = function
            .get(js_string!("length"), context)
            .ok()
            .and_then(|length| length.as_number())
            .unwrap_or(0.0);
        if declared > 1.0 {
            return Err(CompilationError::arity(
                ENGINE_NAME,
                kind,
                format!("declares {declared} parameters"),
            ));
        }

        debug!(function = name, "Compiled JavaScript function");
        Ok(self.functions.insert(function))
    }
}

fn call(function: &JsObject, arg: JsValue, context: &mut Context) -> Result<JsValue, InvokeError> {
    function
        .call(&JsValue::undefined(), &[arg], context)
        .map_err(|e| ScriptFailure::new(e).into())
}

impl ScriptRuntime for JavaScriptRuntime {
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
        trace!("Calling JavaScript keyTransform");
        let Self {
            functions,
            object_keys,
            object_prototype,
            context,
        } = self;
        let marshaler = JsMarshaler::new(object_keys, object_prototype);
        let function = functions.get(handle.slot())?;
        let arg = marshaler.to_js(key, context)?;
        let result = call(function, arg, context)?;
        Ok(marshaler.from_js(&result, context)?)
    }

    fn invoke_value(&mut self, handle: ValueFunctionHandle, value: &Map) -> Result<Map, InvokeError> {
        trace!("Calling JavaScript valueTransform");
        let Self {
            functions,
            object_keys,
            object_prototype,
            context,
        } = self;
        let marshaler = JsMarshaler::new(object_keys, object_prototype);
        let function = functions.get(handle.slot())?;
        let arg = JsValue::Object(marshaler.map_to_js(value, context)?);
        let result = call(function, arg, context)?;
        Ok(marshaler.map_from_js(&result, context)?)
    }

    // The Boa heap lives in a thread-local of its own.
    fn drop_on_thread_exit(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> JavaScriptRuntime {
        JavaScriptRuntime::new().unwrap()
    }

    #[test]
    fn test_key_transform() {
        let mut rt = runtime();
        let handle = rt
            .compile_key_function(r#"function keyTransform(key) { return key + "123"; }"#)
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
                "function valueTransform(v) { v.qweqweq = 12312312; return v; }",
            )
            .unwrap();

        let mut input = Map::new();
        input.insert("created_when".to_string(), Value::from("2019-05-31T00:17:00.188Z"));
        let output = rt.invoke_value(handle, &input).unwrap();

        assert_eq!(output.len(), 2);
        assert_eq!(output.get("qweqweq"), Some(&Value::Int(12312312)));
        assert_eq!(
            output.keys().collect::<Vec<_>>(),
            vec!["created_when", "qweqweq"]
        );
    }

    #[test]
    fn test_number_types_follow_representation() {
        let mut rt = runtime();
        let handle = rt
            .compile_value_function(
                r#"function valueTransform(v) {
                    return {
                        bytes_type: typeof v.bytes,
                        bytes_next: v.bytes + 1n,
                        ratio: v.ratio,
                        half: v.small / 2,
                        literal: 5000000000,
                        overflow: 2147483647 + 1,
                    };
                }"#,
            )
            .unwrap();

        let mut input = Map::new();
        input.insert("bytes".to_string(), Value::Int(5_000_000_000));
        input.insert("ratio".to_string(), Value::Float(1e10));
        input.insert("small".to_string(), Value::Int(6));
        let output = rt.invoke_value(handle, &input).unwrap();

        assert_eq!(output.get("bytes_type"), Some(&Value::from("bigint")));
        assert_eq!(output.get("bytes_next"), Some(&Value::Int(5_000_000_001)));
        assert_eq!(output.get("ratio"), Some(&Value::Float(1e10)));
        assert_eq!(output.get("half"), Some(&Value::Int(3)));
        assert_eq!(output.get("literal"), Some(&Value::Float(5e9)));
        assert_eq!(output.get("overflow"), Some(&Value::Float(2_147_483_648.0)));
    }

    #[test]
    fn test_mixing_bigint_and_number_fails() {
        let mut rt = runtime();
        let handle = rt
            .compile_value_function("function valueTransform(v) { v.bytes = v.bytes + 1; return v; }")
            .unwrap();
        let mut input = Map::new();
        input.insert("bytes".to_string(), Value::Int(5_000_000_000));
        assert!(matches!(
            rt.invoke_value(handle, &input),
            Err(InvokeError::Script(_))
        ));
    }

    #[test]
    fn test_arrow_function_binding() {
        let mut rt = runtime();
        let handle = rt
            .compile_key_function("var keyTransform = (k) => k.toUpperCase();")
            .unwrap();
        assert_eq!(
            rt.invoke_key(handle, &Value::from("abc")).unwrap(),
            Value::from("ABC")
        );
    }

    #[test]
    fn test_syntax_error() {
        let err = runtime()
            .compile_key_function("function keyTransform(key) { return key + ; }")
            .unwrap_err();
        assert!(matches!(err, CompilationError::Syntax { .. }));
    }

    #[test]
    fn test_missing_function() {
        let err = runtime()
            .compile_value_function("var valueTransform = 42;")
            .unwrap_err();
        assert!(matches!(err, CompilationError::MissingFunction { .. }));
    }

    #[test]
    fn test_wrong_arity() {
        let err = runtime()
            .compile_key_function("function keyTransform(a, b) { return a; }")
            .unwrap_err();
        assert!(matches!(err, CompilationError::Arity { .. }));
    }

    #[test]
    fn test_thrown_error() {
        let mut rt = runtime();
        let handle = rt
            .compile_value_function("function valueTransform(v) { return v.missing.field; }")
            .unwrap();
        let err = rt.invoke_value(handle, &Map::new()).unwrap_err();
        match err {
            InvokeError::Script(failure) => assert!(failure.message.contains("TypeError")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_function_result_rejected() {
        let mut rt = runtime();
        let handle = rt
            .compile_key_function("function keyTransform(k) { return function() {}; }")
            .unwrap();
        let err = rt.invoke_key(handle, &Value::Null).unwrap_err();
        assert!(matches!(err, InvokeError::Marshal(_)));
    }
}
