//! jq backend on jaq.
//!
//! Scripts define jq filters with no arguments:
//!
//! ```text
//! def keyTransform: . + "123";
//! def valueTransform: .qweqweq = 12312312;
//! ```
//!
//! The input value is the filter input. The first output is the result;
//! further outputs are ignored and a filter with no output is an error.

mod conversion;

use super::FunctionTable;
use jaq_core::load::{parse, Arena, File, Loader};
use jaq_core::{Compiler, Ctx, Filter, Native, RcIter};
use jaq_json::Val;
use sf_error::{CompilationError, InvokeError, MarshalError, ScriptFailure};
use sf_traits::{KeyFunctionHandle, ScriptEngine, ScriptRuntime, ValueFunctionHandle};
use sf_types::{FunctionKind, Map, Value};
use tracing::{debug, trace};

const ENGINE_NAME: &str = "jq";

/// Factory for jq runtimes.
#[derive(Debug, Default, Clone, Copy)]
pub struct JqEngine;

impl ScriptEngine for JqEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn create_runtime(&self) -> Result<Box<dyn ScriptRuntime>, CompilationError> {
        Ok(Box::new(JqRuntime::default()))
    }
}

#[derive(Default)]
pub(crate) struct JqRuntime {
    functions: FunctionTable<Filter<Native<Val>>>,
}

impl JqRuntime {
    fn compile(&mut self, source: &str, kind: FunctionKind) -> Result<usize, CompilationError> {
        let name = kind.function_name();
        let program = format!("{source}\n{name}");

        let arena = Arena::default();
        let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
        let modules = loader
            .load(&arena, File { code: program.as_str(), path: () })
            .map_err(|errors| {
                let message = errors
                    .into_iter()
                    .map(|(_, error)| describe_load_error(error))
                    .collect::<Vec<_>>()
                    .join("; ");
                CompilationError::syntax(ENGINE_NAME, kind, message)
            })?;

        let filter = Compiler::default()
            .with_funs(jaq_std::funs().chain(jaq_json::funs()))
            .compile(modules)
            .map_err(|errors| {
                let undefined: Vec<_> = errors
                    .into_iter()
                    .flat_map(|(_, errs)| errs)
                    .map(|(symbol, undefined)| format!("undefined {} '{symbol}'", undefined.as_str()))
                    .collect();
                if undefined.iter().any(|e| e.ends_with(&format!("'{name}'"))) {
                    missing_or_arity(source, kind)
                } else {
                    CompilationError::syntax(ENGINE_NAME, kind, undefined.join("; "))
                }
            })?;

        debug!(function = name, "Compiled jq filter");
        Ok(self.functions.insert(filter))
    }

    fn run(&self, slot: usize, input: Val) -> Result<Val, InvokeError> {
        let filter = self.functions.get(slot)?;
        let inputs = RcIter::new(core::iter::empty());
        let mut outputs = filter.run((Ctx::new([], &inputs), input));
        match outputs.next() {
            Some(Ok(output)) => Ok(output),
            Some(Err(error)) => Err(ScriptFailure::new(error).into()),
            None => Err(MarshalError::NoResult.into()),
        }
    }
}

/// A filter defined only with parameters cannot be called with the record
/// as its sole input.
fn missing_or_arity(source: &str, kind: FunctionKind) -> CompilationError {
    let name = kind.function_name();
    let defs = parse(source, |p| p.defs()).unwrap_or_default();
    match defs.iter().find(|def| def.name == name) {
        Some(def) => CompilationError::arity(
            ENGINE_NAME,
            kind,
            format!("defined with {} arguments, expected none", def.args.len()),
        ),
        None => CompilationError::missing_function(ENGINE_NAME, kind),
    }
}

fn describe_load_error(error: jaq_core::load::Error<&str>) -> String {
    use jaq_core::load::Error;

    let found = |s: &str| s.chars().take(16).collect::<String>();
    match error {
        Error::Io(errs) => errs
            .into_iter()
            .map(|(path, message)| format!("{path}: {message}"))
            .collect::<Vec<_>>()
            .join(", "),
        Error::Lex(errs) => errs
            .into_iter()
            .map(|(expect, at)| format!("expected {} near '{}'", expect.as_str(), found(at)))
            .collect::<Vec<_>>()
            .join(", "),
        Error::Parse(errs) => errs
            .into_iter()
            .map(|(expect, at)| format!("expected {} near '{}'", expect.as_str(), found(at)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

impl ScriptRuntime for JqRuntime {
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
        trace!("Running jq keyTransform");
        let output = self.run(handle.slot(), conversion::to_val(key))?;
        Ok(conversion::from_val(output)?)
    }

    fn invoke_value(&mut self, handle: ValueFunctionHandle, value: &Map) -> Result<Map, InvokeError> {
        trace!("Running jq valueTransform");
        let output = self.run(handle.slot(), conversion::map_to_val(value))?;
        Ok(conversion::map_from_val(output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_transform() {
        let mut rt = JqRuntime::default();
        let handle = rt
            .compile_key_function(r#"def keyTransform: . + "123";"#)
            .unwrap();
        assert_eq!(
            rt.invoke_key(handle, &Value::from("abc")).unwrap(),
            Value::from("abc123")
        );
    }

    #[test]
    fn test_value_transform() {
        let mut rt = JqRuntime::default();
        let handle = rt
            .compile_value_function("def valueTransform: .qweqweq = 12312312;")
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
    fn test_helper_definitions() {
        let mut rt = JqRuntime::default();
        let handle = rt
            .compile_value_function(
                "def tag: . + {tagged: true};\ndef valueTransform: tag | del(.secret);",
            )
            .unwrap();
        let mut input = Map::new();
        input.insert("secret".to_string(), Value::from("x"));
        let output = rt.invoke_value(handle, &input).unwrap();
        assert_eq!(output.get("tagged"), Some(&Value::Bool(true)));
        assert!(output.get("secret").is_none());
    }

    #[test]
    fn test_syntax_error() {
        let err = JqRuntime::default()
            .compile_key_function("def keyTransform: . +;")
            .unwrap_err();
        assert!(matches!(err, CompilationError::Syntax { .. }));
    }

    #[test]
    fn test_missing_function() {
        let err = JqRuntime::default()
            .compile_key_function("def other: .;")
            .unwrap_err();
        assert!(matches!(err, CompilationError::MissingFunction { .. }));
    }

    #[test]
    fn test_wrong_arity() {
        let err = JqRuntime::default()
            .compile_key_function("def keyTransform(f): f;")
            .unwrap_err();
        assert!(matches!(err, CompilationError::Arity { .. }));
    }

    #[test]
    fn test_runtime_error() {
        let mut rt = JqRuntime::default();
        let handle = rt
            .compile_value_function(r#"def valueTransform: error("rejected");"#)
            .unwrap();
        let err = rt.invoke_value(handle, &Map::new()).unwrap_err();
        match err {
            InvokeError::Script(failure) => assert!(failure.message.contains("rejected")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_output() {
        let mut rt = JqRuntime::default();
        let handle = rt
            .compile_key_function("def keyTransform: empty;")
            .unwrap();
        let err = rt.invoke_key(handle, &Value::Null).unwrap_err();
        assert!(matches!(err, InvokeError::Marshal(MarshalError::NoResult)));
    }
}
