//! Conversion between host values and Python objects.

use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple};
use sf_error::{Direction, MarshalError};
use sf_types::{Map, Value};

/// Containers nested deeper than this are rejected; this also stops cycles.
const MAX_DEPTH: usize = 128;

pub(crate) fn to_py<'py>(py: Python<'py>, value: &Value) -> PyResult<Bound<'py, PyAny>> {
    Ok(match value {
        Value::Null => py.None().into_bound(py),
        Value::Bool(b) => b.into_py(py).into_bound(py),
        Value::Int(i) => i.into_py(py).into_bound(py),
        Value::Float(f) => f.into_py(py).into_bound(py),
        Value::String(s) => PyString::new_bound(py, s).into_any(),
        Value::Array(items) => {
            let list = PyList::empty_bound(py);
            for item in items {
                list.append(to_py(py, item)?)?;
            }
            list.into_any()
        }
        Value::Map(map) => map_to_py(py, map)?.into_any(),
    })
}

pub(crate) fn map_to_py<'py>(py: Python<'py>, map: &Map) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    for (key, value) in map {
        dict.set_item(key, to_py(py, value)?)?;
    }
    Ok(dict)
}

pub(crate) fn from_py(object: &Bound<'_, PyAny>) -> Result<Value, MarshalError> {
    from_py_at(object, 0)
}

pub(crate) fn map_from_py(object: &Bound<'_, PyAny>) -> Result<Map, MarshalError> {
    match from_py(object)? {
        Value::Map(map) => Ok(map),
        other => Err(MarshalError::ExpectedMapping {
            shape: other.shape().to_string(),
            direction: Direction::ToHost,
        }),
    }
}

fn from_py_at(object: &Bound<'_, PyAny>, depth: usize) -> Result<Value, MarshalError> {
    if depth > MAX_DEPTH {
        return Err(MarshalError::unsupported(
            format!("object nested deeper than {MAX_DEPTH} levels"),
            Direction::ToHost,
        ));
    }

    if object.is_none() {
        return Ok(Value::Null);
    }
    // bool is a subclass of int
    if let Ok(b) = object.downcast::<PyBool>() {
        return Ok(Value::Bool(b.is_true()));
    }
    if object.is_instance_of::<PyInt>() {
        return object.extract::<i64>().map(Value::Int).map_err(|_| {
            MarshalError::IntegerOverflow {
                value: object.str().map(|s| s.to_string()).unwrap_or_default(),
            }
        });
    }
    if let Ok(f) = object.downcast::<PyFloat>() {
        return Ok(Value::Float(f.value()));
    }
    if let Ok(s) = object.downcast::<PyString>() {
        return s
            .to_str()
            .map(|s| Value::String(s.to_string()))
            .map_err(MarshalError::backend);
    }
    if let Ok(list) = object.downcast::<PyList>() {
        return list
            .iter()
            .map(|item| from_py_at(&item, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    if let Ok(tuple) = object.downcast::<PyTuple>() {
        return tuple
            .iter()
            .map(|item| from_py_at(&item, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    if let Ok(dict) = object.downcast::<PyDict>() {
        let mut map = Map::with_capacity(dict.len());
        for (key, item) in dict.iter() {
            let key = match key.downcast::<PyString>() {
                Ok(key) => key.to_str().map_err(MarshalError::backend)?.to_string(),
                Err(_) => {
                    return Err(MarshalError::NonStringKey {
                        shape: type_name(&key),
                    })
                }
            };
            map.insert(key, from_py_at(&item, depth + 1)?);
        }
        return Ok(Value::Map(map));
    }

    Err(MarshalError::unsupported(type_name(object), Direction::ToHost))
}

fn type_name(object: &Bound<'_, PyAny>) -> String {
    object
        .get_type()
        .name()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| "object".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_preserves_order() {
        let mut map = Map::new();
        map.insert("z".to_string(), Value::Int(i64::MAX));
        map.insert("a".to_string(), Value::Array(vec![Value::Bool(true), Value::Null]));
        map.insert("f".to_string(), Value::Float(2.0));
        let value = Value::Map(map);

        Python::with_gil(|py| {
            let object = to_py(py, &value).unwrap();
            assert_eq!(from_py(&object).unwrap(), value);
        });
    }

    #[test]
    fn test_big_int_overflows() {
        Python::with_gil(|py| {
            let object = py.eval_bound("2 ** 70", None, None).unwrap();
            assert!(matches!(
                from_py(&object),
                Err(MarshalError::IntegerOverflow { .. })
            ));
        });
    }

    #[test]
    fn test_non_string_key_rejected() {
        Python::with_gil(|py| {
            let object = py.eval_bound("{1: 'a'}", None, None).unwrap();
            assert!(matches!(
                from_py(&object),
                Err(MarshalError::NonStringKey { .. })
            ));
        });
    }
}
