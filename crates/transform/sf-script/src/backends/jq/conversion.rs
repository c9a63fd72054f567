//! Conversion between host values and jq values.
//!
//! jq values are immutable reference-counted trees, so there is no depth
//! guard here. Integers that do not fit a machine word travel as decimal
//! number literals.

use jaq_json::Val;
use sf_error::{Direction, MarshalError};
use sf_types::{Map, Value};
use std::rc::Rc;

pub(crate) fn to_val(value: &Value) -> Val {
    match value {
        Value::Null => Val::Null,
        Value::Bool(b) => Val::Bool(*b),
        Value::Int(i) => match isize::try_from(*i) {
            Ok(i) => Val::Int(i),
            Err(_) => Val::Num(Rc::new(i.to_string())),
        },
        Value::Float(f) => Val::Float(*f),
        Value::String(s) => Val::from(s.clone()),
        Value::Array(items) => items.iter().map(to_val).collect(),
        Value::Map(map) => map_to_val(map),
    }
}

pub(crate) fn map_to_val(map: &Map) -> Val {
    Val::obj(
        map.iter()
            .map(|(key, value)| (Rc::new(key.clone()), to_val(value)))
            .collect(),
    )
}

pub(crate) fn from_val(value: Val) -> Result<Value, MarshalError> {
    Ok(match value {
        Val::Null => Value::Null,
        Val::Bool(b) => Value::Bool(b),
        Val::Int(i) => Value::Int(i64::try_from(i).map_err(|_| MarshalError::IntegerOverflow {
            value: i.to_string(),
        })?),
        Val::Float(f) => Value::Float(f),
        Val::Num(n) => number_from_literal(&n)?,
        Val::Str(s) => Value::String(Rc::unwrap_or_clone(s)),
        Val::Arr(items) => Value::Array(
            Rc::unwrap_or_clone(items)
                .into_iter()
                .map(from_val)
                .collect::<Result<_, _>>()?,
        ),
        Val::Obj(entries) => {
            let entries = Rc::unwrap_or_clone(entries);
            let mut map = Map::with_capacity(entries.len());
            for (key, item) in entries {
                map.insert(Rc::unwrap_or_clone(key), from_val(item)?);
            }
            Value::Map(map)
        }
    })
}

pub(crate) fn map_from_val(value: Val) -> Result<Map, MarshalError> {
    match from_val(value)? {
        Value::Map(map) => Ok(map),
        other => Err(MarshalError::ExpectedMapping {
            shape: other.shape().to_string(),
            direction: Direction::ToHost,
        }),
    }
}

fn number_from_literal(literal: &str) -> Result<Value, MarshalError> {
    if let Ok(i) = literal.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    let digits = literal.strip_prefix('-').unwrap_or(literal);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MarshalError::IntegerOverflow {
            value: literal.to_string(),
        });
    }
    literal
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| MarshalError::backend(format!("invalid number literal '{literal}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_preserves_order() {
        let mut map = Map::new();
        map.insert("z".to_string(), Value::Int(-3));
        map.insert("a".to_string(), Value::Array(vec![Value::Null, Value::Float(0.25)]));
        map.insert("m".to_string(), Value::from("text"));
        let value = Value::Map(map);

        assert_eq!(from_val(to_val(&value)).unwrap(), value);
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(number_from_literal("42").unwrap(), Value::Int(42));
        assert_eq!(number_from_literal("1.5e3").unwrap(), Value::Float(1500.0));
        assert!(matches!(
            number_from_literal("123456789012345678901234567890"),
            Err(MarshalError::IntegerOverflow { .. })
        ));
    }

    #[test]
    fn test_non_object_is_not_a_mapping() {
        let err = map_from_val(Val::from(true)).unwrap_err();
        assert!(matches!(err, MarshalError::ExpectedMapping { .. }));
    }
}
