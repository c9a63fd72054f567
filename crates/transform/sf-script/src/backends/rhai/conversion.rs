//! Conversion between host values and Rhai `Dynamic`.

use rhai::{Array, Dynamic};
use sf_error::{Direction, MarshalError};
use sf_types::{Map, Value};

/// Converts a borrowed host value into a Rhai value.
pub(crate) fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from_bool(*b),
        Value::Int(i) => Dynamic::from_int(*i),
        Value::Float(f) => Dynamic::from_float(*f),
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => Dynamic::from_array(items.iter().map(to_dynamic).collect()),
        Value::Map(map) => Dynamic::from_map(map_to_rhai(map)),
    }
}

/// Converts an owned host value, moving strings instead of copying them.
pub(crate) fn into_dynamic(value: Value) -> Dynamic {
    match value {
        Value::String(s) => Dynamic::from(s),
        Value::Array(items) => Dynamic::from_array(items.into_iter().map(into_dynamic).collect()),
        Value::Map(map) => Dynamic::from_map(
            map.into_iter()
                .map(|(k, v)| (k.into(), into_dynamic(v)))
                .collect(),
        ),
        scalar => to_dynamic(&scalar),
    }
}

pub(crate) fn map_to_rhai(map: &Map) -> rhai::Map {
    map.iter()
        .map(|(k, v)| (k.as_str().into(), to_dynamic(v)))
        .collect()
}

/// Converts a Rhai value back into a host value.
///
/// Characters become one-character strings. Blobs, timestamps, function
/// pointers and custom types are rejected.
pub(crate) fn from_dynamic(value: Dynamic) -> Result<Value, MarshalError> {
    if value.is_unit() {
        return Ok(Value::Null);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Ok(i) = value.as_int() {
        return Ok(Value::Int(i));
    }
    if let Ok(f) = value.as_float() {
        return Ok(Value::Float(f));
    }
    if let Ok(c) = value.as_char() {
        return Ok(Value::String(c.to_string()));
    }
    if value.is_string() {
        return value
            .into_immutable_string()
            .map(|s| Value::String(s.to_string()))
            .map_err(|shape| MarshalError::unsupported(shape, Direction::ToHost));
    }
    if value.is_array() {
        let items: Array = value
            .into_array()
            .map_err(|shape| MarshalError::unsupported(shape, Direction::ToHost))?;
        return items
            .into_iter()
            .map(from_dynamic)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    if value.is_map() {
        return map_from_dynamic(value).map(Value::Map);
    }
    Err(MarshalError::unsupported(value.type_name(), Direction::ToHost))
}

/// Converts a Rhai object map into a host mapping.
pub(crate) fn map_from_dynamic(value: Dynamic) -> Result<Map, MarshalError> {
    let shape = value.type_name();
    let map = value
        .try_cast::<rhai::Map>()
        .ok_or_else(|| MarshalError::ExpectedMapping {
            shape: shape.to_string(),
            direction: Direction::ToHost,
        })?;

    map.into_iter()
        .map(|(k, v)| Ok((k.to_string(), from_dynamic(v)?)))
        .collect()
}
