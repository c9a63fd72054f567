//! Conversion between host values and Starlark values.

use starlark::values::dict::{AllocDict, DictRef};
use starlark::values::float::StarlarkFloat;
use starlark::values::list::{AllocList, ListRef};
use starlark::values::tuple::TupleRef;
use starlark::values::{Heap, UnpackValue, Value as StarlarkValue, ValueLike};
use sf_error::{Direction, MarshalError};
use sf_types::{Map, Value};

/// Containers nested deeper than this are rejected; this also stops cycles.
const MAX_DEPTH: usize = 128;

pub(crate) fn to_starlark<'v>(value: &Value, heap: &'v Heap) -> StarlarkValue<'v> {
    match value {
        Value::Null => StarlarkValue::new_none(),
        Value::Bool(b) => heap.alloc(*b),
        Value::Int(i) => heap.alloc(*i),
        Value::Float(f) => heap.alloc(*f),
        Value::String(s) => heap.alloc(s.as_str()),
        Value::Array(items) => {
            let items: Vec<StarlarkValue<'v>> =
                items.iter().map(|item| to_starlark(item, heap)).collect();
            heap.alloc(AllocList(items))
        }
        Value::Map(map) => map_to_starlark(map, heap),
    }
}

pub(crate) fn map_to_starlark<'v>(map: &Map, heap: &'v Heap) -> StarlarkValue<'v> {
    let entries: Vec<(&str, StarlarkValue<'v>)> = map
        .iter()
        .map(|(key, value)| (key.as_str(), to_starlark(value, heap)))
        .collect();
    heap.alloc(AllocDict(entries))
}

/// Converts a Starlark value back into a host value.
///
/// Tuples come back as arrays. Dictionary keys must be strings.
pub(crate) fn from_starlark(value: StarlarkValue<'_>) -> Result<Value, MarshalError> {
    from_starlark_at(value, 0)
}

pub(crate) fn map_from_starlark(value: StarlarkValue<'_>) -> Result<Map, MarshalError> {
    match from_starlark(value)? {
        Value::Map(map) => Ok(map),
        other => Err(MarshalError::ExpectedMapping {
            shape: other.shape().to_string(),
            direction: Direction::ToHost,
        }),
    }
}

fn from_starlark_at(value: StarlarkValue<'_>, depth: usize) -> Result<Value, MarshalError> {
    if depth > MAX_DEPTH {
        return Err(MarshalError::unsupported(
            format!("value nested deeper than {MAX_DEPTH} levels"),
            Direction::ToHost,
        ));
    }

    if value.is_none() {
        return Ok(Value::Null);
    }
    if let Some(b) = value.unpack_bool() {
        return Ok(Value::Bool(b));
    }
    match i64::unpack_value(value) {
        Ok(Some(i)) => return Ok(Value::Int(i)),
        Ok(None) => {}
        Err(_) => {
            return Err(MarshalError::IntegerOverflow {
                value: value.to_repr(),
            })
        }
    }
    if let Some(f) = value.downcast_ref::<StarlarkFloat>() {
        return Ok(Value::Float(f.0));
    }
    if let Some(s) = value.unpack_str() {
        return Ok(Value::String(s.to_string()));
    }
    if let Some(list) = ListRef::from_value(value) {
        return sequence_from_starlark(list.iter(), depth);
    }
    if let Some(tuple) = TupleRef::from_value(value) {
        return sequence_from_starlark(tuple.iter(), depth);
    }
    if let Some(dict) = DictRef::from_value(value) {
        let entries: Vec<_> = dict.iter().collect();
        let mut map = Map::with_capacity(entries.len());
        for (key, item) in entries {
            let Some(key) = key.unpack_str() else {
                return Err(MarshalError::NonStringKey {
                    shape: key.get_type().to_string(),
                });
            };
            map.insert(key.to_string(), from_starlark_at(item, depth + 1)?);
        }
        return Ok(Value::Map(map));
    }

    Err(MarshalError::unsupported(value.get_type(), Direction::ToHost))
}

fn sequence_from_starlark<'v>(
    items: impl Iterator<Item = StarlarkValue<'v>>,
    depth: usize,
) -> Result<Value, MarshalError> {
    items
        .map(|item| from_starlark_at(item, depth + 1))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}
