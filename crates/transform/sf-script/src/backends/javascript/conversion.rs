//! Conversion between host values and JavaScript values.
//!
//! JavaScript has a single number type, so host integers and floats are
//! kept apart by representation rather than by value:
//!
//! - host integers in the `i32` range become numbers boa stores as `i32`;
//!   every other host integer becomes a `BigInt`
//! - host floats become doubles, whole or not
//! - on the way back, `BigInt`s and `i32` numbers are integers and every
//!   other number is a float
//!
//! A number a script computes outside the `i32` range (`2147483647 + 1`, or
//! a `5000000000` literal) therefore comes back as a float. Scripts that
//! need exact large integers use `BigInt`, e.g. `v.bytes + 1n`.

use boa_engine::object::builtins::JsArray;
use boa_engine::{Context, JsBigInt, JsObject, JsString, JsValue};
use sf_error::{Direction, MarshalError};
use sf_types::{Map, Value};

/// Objects nested deeper than this are rejected; this also stops cycles.
const MAX_DEPTH: usize = 128;

/// Marshals values for one context.
pub(crate) struct JsMarshaler<'a> {
    /// `Object.keys`
    object_keys: &'a JsObject,

    /// `Object.prototype`, used to recognise plain objects
    object_prototype: &'a JsObject,
}

impl<'a> JsMarshaler<'a> {
    pub(crate) fn new(object_keys: &'a JsObject, object_prototype: &'a JsObject) -> Self {
        Self {
            object_keys,
            object_prototype,
        }
    }

    pub(crate) fn to_js(&self, value: &Value, context: &mut Context) -> Result<JsValue, MarshalError> {
        Ok(match value {
            Value::Null => JsValue::Null,
            Value::Bool(b) => JsValue::Boolean(*b),
            Value::Int(i) => int_to_js(*i),
            Value::Float(f) => JsValue::Rational(*f),
            Value::String(s) => JsValue::String(JsString::from(s.as_str())),
            Value::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.to_js(item, context))
                    .collect::<Result<Vec<_>, _>>()?;
                JsArray::from_iter(items, context).into()
            }
            Value::Map(map) => JsValue::Object(self.map_to_js(map, context)?),
        })
    }

    pub(crate) fn map_to_js(&self, map: &Map, context: &mut Context) -> Result<JsObject, MarshalError> {
        let object = JsObject::with_object_proto(context.intrinsics());
        for (key, value) in map {
            let value = self.to_js(value, context)?;
            object
                .create_data_property_or_throw(JsString::from(key.as_str()), value, context)
                .map_err(MarshalError::backend)?;
        }
        Ok(object)
    }

    /// Converts a JavaScript value back into a host value.
    ///
    /// `undefined` becomes null. Functions, symbols and objects with a
    /// prototype other than `Object.prototype` are rejected.
    pub(crate) fn from_js(&self, value: &JsValue, context: &mut Context) -> Result<Value, MarshalError> {
        self.from_js_at(value, context, 0)
    }

    pub(crate) fn map_from_js(&self, value: &JsValue, context: &mut Context) -> Result<Map, MarshalError> {
        match self.from_js(value, context)? {
            Value::Map(map) => Ok(map),
            other => Err(MarshalError::ExpectedMapping {
                shape: other.shape().to_string(),
                direction: Direction::ToHost,
            }),
        }
    }

    fn from_js_at(
        &self,
        value: &JsValue,
        context: &mut Context,
        depth: usize,
    ) -> Result<Value, MarshalError> {
        match value {
            JsValue::Null | JsValue::Undefined => Ok(Value::Null),
            JsValue::Boolean(b) => Ok(Value::Bool(*b)),
            JsValue::Integer(i) => Ok(Value::Int(i64::from(*i))),
            JsValue::Rational(f) => Ok(Value::Float(*f)),
            JsValue::String(s) => s.to_std_string().map(Value::String).map_err(|_| {
                MarshalError::unsupported("string with unpaired surrogate", Direction::ToHost)
            }),
            JsValue::BigInt(b) => bigint_to_host(b),
            JsValue::Symbol(_) => Err(MarshalError::unsupported("symbol", Direction::ToHost)),
            JsValue::Object(object) => self.object_from_js(object, context, depth + 1),
        }
    }

    fn object_from_js(
        &self,
        object: &JsObject,
        context: &mut Context,
        depth: usize,
    ) -> Result<Value, MarshalError> {
        if depth > MAX_DEPTH {
            return Err(MarshalError::unsupported(
                format!("object nested deeper than {MAX_DEPTH} levels"),
                Direction::ToHost,
            ));
        }
        if object.is_callable() {
            return Err(MarshalError::unsupported("function", Direction::ToHost));
        }

        if object.is_array() {
            let array = JsArray::from_object(object.clone()).map_err(MarshalError::backend)?;
            let len = array.length(context).map_err(MarshalError::backend)?;
            let mut items = Vec::with_capacity(len as usize);
            for i in 0..len as usize {
                let item = object.get(i, context).map_err(MarshalError::backend)?;
                items.push(self.from_js_at(&item, context, depth)?);
            }
            return Ok(Value::Array(items));
        }

        let plain = match object.prototype() {
            None => true,
            Some(proto) => JsObject::equals(&proto, self.object_prototype),
        };
        if !plain {
            return Err(MarshalError::unsupported("non-plain object", Direction::ToHost));
        }

        let keys = self
            .object_keys
            .call(&JsValue::undefined(), &[JsValue::Object(object.clone())], context)
            .map_err(MarshalError::backend)?;
        let keys = keys
            .as_object()
            .cloned()
            .ok_or_else(|| MarshalError::backend("Object.keys did not return an array"))?;
        let keys = JsArray::from_object(keys).map_err(MarshalError::backend)?;
        let len = keys.length(context).map_err(MarshalError::backend)?;

        let mut map = Map::with_capacity(len as usize);
        for i in 0..len as usize {
            let key = keys.get(i, context).map_err(MarshalError::backend)?;
            let key = match key {
                JsValue::String(key) => key,
                other => {
                    return Err(MarshalError::NonStringKey {
                        shape: other.type_of().to_string(),
                    })
                }
            };
            let item = object.get(key.clone(), context).map_err(MarshalError::backend)?;
            let key = key.to_std_string().map_err(|_| {
                MarshalError::unsupported("string with unpaired surrogate", Direction::ToHost)
            })?;
            map.insert(key, self.from_js_at(&item, context, depth)?);
        }
        Ok(Value::Map(map))
    }
}

fn int_to_js(i: i64) -> JsValue {
    match i32::try_from(i) {
        Ok(small) => JsValue::Integer(small),
        Err(_) => JsValue::BigInt(JsBigInt::from(i)),
    }
}

fn bigint_to_host(b: &JsBigInt) -> Result<Value, MarshalError> {
    let digits = b.to_string_radix(10);
    digits
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|_| MarshalError::IntegerOverflow { value: digits })
}
