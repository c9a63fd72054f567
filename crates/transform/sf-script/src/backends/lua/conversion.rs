//! Conversion between host values and Lua values.
//!
//! Lua has a single table type for both sequences and mappings. Sequences
//! built from host arrays carry a shared marker metatable so that an empty
//! array survives the round trip. Unmarked tables are read back as arrays
//! when their keys are exactly `1..=n`, otherwise as string-keyed mappings.
//!
//! `nil` cannot be stored in a table, so null values nested inside arrays
//! and mappings are represented by the `null` light userdata sentinel.

use mlua::{Lua, Table, Value as LuaValue};
use sf_error::{Direction, MarshalError};
use sf_types::{Map, Value};

/// Tables nested deeper than this are rejected; this also stops cycles.
const MAX_DEPTH: usize = 128;

/// Marshals values for one Lua state.
pub(crate) struct LuaMarshaler<'lua> {
    lua: &'lua Lua,
    array_mt: Table<'lua>,
}

impl<'lua> LuaMarshaler<'lua> {
    pub(crate) fn new(lua: &'lua Lua, array_mt: Table<'lua>) -> Self {
        Self { lua, array_mt }
    }

    /// Converts a top-level host value. Null becomes `nil`.
    pub(crate) fn to_lua(&self, value: &Value) -> Result<LuaValue<'lua>, MarshalError> {
        match value {
            Value::Null => Ok(LuaValue::Nil),
            other => self.nested_to_lua(other),
        }
    }

    pub(crate) fn map_to_lua(&self, map: &Map) -> Result<Table<'lua>, MarshalError> {
        let table = self
            .lua
            .create_table_with_capacity(0, map.len())
            .map_err(MarshalError::backend)?;
        for (key, value) in map {
            table
                .raw_set(key.as_str(), self.nested_to_lua(value)?)
                .map_err(MarshalError::backend)?;
        }
        Ok(table)
    }

    fn nested_to_lua(&self, value: &Value) -> Result<LuaValue<'lua>, MarshalError> {
        Ok(match value {
            Value::Null => LuaValue::NULL,
            Value::Bool(b) => LuaValue::Boolean(*b),
            Value::Int(i) => LuaValue::Integer(*i),
            Value::Float(f) => LuaValue::Number(*f),
            Value::String(s) => {
                LuaValue::String(self.lua.create_string(s).map_err(MarshalError::backend)?)
            }
            Value::Array(items) => {
                let table = self
                    .lua
                    .create_table_with_capacity(items.len(), 0)
                    .map_err(MarshalError::backend)?;
                for (i, item) in items.iter().enumerate() {
                    table
                        .raw_set(i + 1, self.nested_to_lua(item)?)
                        .map_err(MarshalError::backend)?;
                }
                table.set_metatable(Some(self.array_mt.clone()));
                LuaValue::Table(table)
            }
            Value::Map(map) => LuaValue::Table(self.map_to_lua(map)?),
        })
    }

    /// Converts a Lua value back into a host value.
    pub(crate) fn from_lua(&self, value: LuaValue<'lua>) -> Result<Value, MarshalError> {
        self.from_lua_at(value, 0)
    }

    /// Converts a Lua table back into a host mapping.
    pub(crate) fn map_from_lua(&self, value: LuaValue<'lua>) -> Result<Map, MarshalError> {
        match self.from_lua(value)? {
            Value::Map(map) => Ok(map),
            // An empty table is a valid (empty) mapping.
            Value::Array(items) if items.is_empty() => Ok(Map::new()),
            other => Err(MarshalError::ExpectedMapping {
                shape: other.shape().to_string(),
                direction: Direction::ToHost,
            }),
        }
    }

    fn from_lua_at(&self, value: LuaValue<'lua>, depth: usize) -> Result<Value, MarshalError> {
        match value {
            LuaValue::Nil => Ok(Value::Null),
            LuaValue::LightUserData(ud) if ud.0.is_null() => Ok(Value::Null),
            LuaValue::Boolean(b) => Ok(Value::Bool(b)),
            LuaValue::Integer(i) => Ok(Value::Int(i)),
            LuaValue::Number(n) => Ok(Value::Float(n)),
            LuaValue::String(s) => s
                .to_str()
                .map(|s| Value::String(s.to_string()))
                .map_err(|_| MarshalError::unsupported("non-UTF-8 string", Direction::ToHost)),
            LuaValue::Table(table) => self.table_from_lua(table, depth + 1),
            other => Err(MarshalError::unsupported(other.type_name(), Direction::ToHost)),
        }
    }

    fn table_from_lua(&self, table: Table<'lua>, depth: usize) -> Result<Value, MarshalError> {
        if depth > MAX_DEPTH {
            return Err(MarshalError::unsupported(
                format!("table nested deeper than {MAX_DEPTH} levels"),
                Direction::ToHost,
            ));
        }

        let marked = table
            .get_metatable()
            .is_some_and(|mt| mt.to_pointer() == self.array_mt.to_pointer());
        if marked {
            return self.sequence_from_lua(&table, depth);
        }

        let mut entries = Vec::new();
        for pair in table.clone().pairs::<LuaValue, LuaValue>() {
            entries.push(pair.map_err(MarshalError::backend)?);
        }

        let is_sequence = !entries.is_empty()
            && entries.len() == table.raw_len()
            && entries
                .iter()
                .all(|(key, _)| matches!(key, LuaValue::Integer(_)));
        if is_sequence {
            return self.sequence_from_lua(&table, depth);
        }

        let mut map = Map::with_capacity(entries.len());
        for (key, value) in entries {
            let key = match key {
                LuaValue::String(key) => key,
                other => {
                    return Err(MarshalError::NonStringKey {
                        shape: other.type_name().to_string(),
                    })
                }
            };
            let key = key
                .to_str()
                .map_err(|_| MarshalError::unsupported("non-UTF-8 string", Direction::ToHost))?
                .to_string();
            map.insert(key, self.from_lua_at(value, depth)?);
        }
        Ok(Value::Map(map))
    }

    fn sequence_from_lua(&self, table: &Table<'lua>, depth: usize) -> Result<Value, MarshalError> {
        let len = table.raw_len();
        let mut items = Vec::with_capacity(len);
        for i in 1..=len {
            let item: LuaValue = table.raw_get(i).map_err(MarshalError::backend)?;
            items.push(self.from_lua_at(item, depth)?);
        }
        Ok(Value::Array(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_marshaler(f: impl FnOnce(&Lua, &LuaMarshaler<'_>)) {
        let lua = Lua::new();
        let mt = lua.create_table().unwrap();
        let marshaler = LuaMarshaler::new(&lua, mt);
        f(&lua, &marshaler);
    }

    fn sample() -> Value {
        let mut inner = Map::new();
        inner.insert("empty".to_string(), Value::Array(vec![]));
        inner.insert("list".to_string(), Value::Array(vec![
            Value::Int(1),
            Value::Null,
            Value::Float(0.5),
        ]));
        let mut map = Map::new();
        map.insert("name".to_string(), Value::from("x"));
        map.insert("missing".to_string(), Value::Null);
        map.insert("nested".to_string(), Value::Map(inner));
        Value::Map(map)
    }

    #[test]
    fn test_roundtrip_nested() {
        with_marshaler(|_, m| {
            let value = sample();
            let back = m.from_lua(m.to_lua(&value).unwrap()).unwrap();
            // Lua tables are unordered; compare as sets of entries.
            let (Value::Map(expected), Value::Map(actual)) = (&value, &back) else {
                panic!("expected maps");
            };
            assert_eq!(expected.len(), actual.len());
            for (k, v) in expected {
                let got = actual.get(k).unwrap();
                match (v, got) {
                    (Value::Map(a), Value::Map(b)) => {
                        assert_eq!(a.len(), b.len());
                        for (k2, v2) in a {
                            assert_eq!(b.get(k2), Some(v2));
                        }
                    }
                    _ => assert_eq!(got, v),
                }
            }
        });
    }

    #[test]
    fn test_integer_and_float_are_distinct() {
        with_marshaler(|_, m| {
            let int = m.from_lua(m.to_lua(&Value::Int(3)).unwrap()).unwrap();
            let float = m.from_lua(m.to_lua(&Value::Float(3.0)).unwrap()).unwrap();
            assert_eq!(int, Value::Int(3));
            assert_eq!(float, Value::Float(3.0));
        });
    }

    #[test]
    fn test_script_built_sequence() {
        with_marshaler(|lua, m| {
            let value: LuaValue = lua.load("return {1, 2, 3}").eval().unwrap();
            assert_eq!(
                m.from_lua(value).unwrap(),
                Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
            );
        });
    }

    #[test]
    fn test_non_string_key_rejected() {
        with_marshaler(|lua, m| {
            let value: LuaValue = lua.load("return {a = 1, [true] = 2}").eval().unwrap();
            assert!(matches!(
                m.from_lua(value),
                Err(MarshalError::NonStringKey { .. })
            ));
        });
    }

    #[test]
    fn test_function_rejected() {
        with_marshaler(|lua, m| {
            let value: LuaValue = lua.load("return function() end").eval().unwrap();
            let err = m.from_lua(value).unwrap_err();
            assert!(err.to_string().contains("function"));
        });
    }

    #[test]
    fn test_cycle_rejected() {
        with_marshaler(|lua, m| {
            let value: LuaValue = lua.load("local t = {}; t.self = t; return t").eval().unwrap();
            assert!(m.from_lua(value).is_err());
        });
    }
}
