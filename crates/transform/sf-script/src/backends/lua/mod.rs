//! Lua 5.4 backend.
//!
//! Scripts define global functions:
//!
//! ```text
//! function keyTransform(key) return key .. "123" end
//! function valueTransform(value) value.qweqweq = 12312312 return value end
//! ```
//!
//! The chunk runs once at compile time; the global function it leaves
//! behind is pinned in the registry. A global `null` is provided for
//! storing null values inside tables.

mod conversion;

use self::conversion::LuaMarshaler;
use super::FunctionTable;
use mlua::{Function, Lua, RegistryKey, Table, Value as LuaValue};
use sf_error::{CompilationError, InvokeError, MarshalError, ScriptFailure};
use sf_traits::{KeyFunctionHandle, ScriptEngine, ScriptRuntime, ValueFunctionHandle};
use sf_types::{FunctionKind, Map, Value};
use tracing::{debug, trace};

const ENGINE_NAME: &str = "lua";

/// Factory for Lua runtimes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LuaEngine;

impl ScriptEngine for LuaEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn create_runtime(&self) -> Result<Box<dyn ScriptRuntime>, CompilationError> {
        Ok(Box::new(LuaRuntime::new()?))
    }
}

/// One Lua state plus the functions compiled into it.
pub(crate) struct LuaRuntime {
    lua: Lua,

    /// Metatable marking tables that came from host arrays.
    array_mt: RegistryKey,

    functions: FunctionTable<RegistryKey>,
}

impl LuaRuntime {
    fn new() -> Result<Self, CompilationError> {
        let lua = Lua::new();
        let init = |lua: &Lua| -> mlua::Result<RegistryKey> {
            lua.globals().raw_set("null", LuaValue::NULL)?;
            let array_mt = lua.create_table()?;
            array_mt.raw_set("__name", "array")?;
            lua.create_registry_value(array_mt)
        };
        let array_mt = init(&lua).map_err(|e| CompilationError::runtime(ENGINE_NAME, e))?;

        Ok(Self {
            lua,
            array_mt,
            functions: FunctionTable::new(),
        })
    }

    fn compile(&mut self, source: &str, kind: FunctionKind) -> Result<usize, CompilationError> {
        let name = kind.function_name();
        let globals = self.lua.globals();

        // A previous script may have left a function with the same name behind.
        globals
            .raw_set(name, LuaValue::Nil)
            .map_err(|e| CompilationError::runtime(ENGINE_NAME, e))?;

        self.lua
            .load(source)
            .set_name(format!("={name}"))
            .exec()
            .map_err(|e| CompilationError::syntax(ENGINE_NAME, kind, e))?;

        let function = match globals.raw_get::<_, LuaValue>(name) {
            Ok(LuaValue::Function(function)) => function,
            Ok(_) => return Err(CompilationError::missing_function(ENGINE_NAME, kind)),
            Err(e) => return Err(CompilationError::runtime(ENGINE_NAME, e)),
        };
        let key = self
            .lua
            .create_registry_value(function)
            .map_err(|e| CompilationError::runtime(ENGINE_NAME, e))?;

        debug!(function = name, "Compiled Lua function");
        Ok(self.functions.insert(key))
    }

    fn marshaler(&self) -> Result<LuaMarshaler<'_>, MarshalError> {
        let array_mt: Table = self
            .lua
            .registry_value(&self.array_mt)
            .map_err(MarshalError::backend)?;
        Ok(LuaMarshaler::new(&self.lua, array_mt))
    }

    fn function(&self, slot: usize) -> Result<Function<'_>, InvokeError> {
        let key = self.functions.get(slot)?;
        self.lua
            .registry_value(key)
            .map_err(|e| ScriptFailure::new(e).into())
    }
}

fn call<'lua>(function: &Function<'lua>, arg: LuaValue<'lua>) -> Result<LuaValue<'lua>, InvokeError> {
    function
        .call::<_, LuaValue>(arg)
        .map_err(|e| ScriptFailure::new(e).into())
}

impl ScriptRuntime for LuaRuntime {
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
        trace!("Calling Lua keyTransform");
        let marshaler = self.marshaler()?;
        let function = self.function(handle.slot())?;
        let result = call(&function, marshaler.to_lua(key)?)?;
        Ok(marshaler.from_lua(result)?)
    }

    fn invoke_value(&mut self, handle: ValueFunctionHandle, value: &Map) -> Result<Map, InvokeError> {
        trace!("Calling Lua valueTransform");
        let marshaler = self.marshaler()?;
        let function = self.function(handle.slot())?;
        let arg = LuaValue::Table(marshaler.map_to_lua(value)?);
        let result = call(&function, arg)?;
        Ok(marshaler.map_from_lua(result)?)
    }
}
