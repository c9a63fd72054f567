//! Native baseline transform.
//!
//! Performs the same work as the reference scripts (append `"123"` to the
//! key, set `qweqweq` on the value) in plain Rust. Used as the comparison
//! point in benchmarks and as a drop-in [`Transform`] in tests.

use sf_error::{
    Direction, MarshalError, Result, ScriptFailure, SfError, TransformExecutionError,
};
use sf_traits::Transform;
use sf_types::{FunctionKind, Record, RecordId, Value};

const KEY_SUFFIX: &str = "123";
const VALUE_FIELD: &str = "qweqweq";
const VALUE_FIELD_CONTENT: i64 = 12312312;

/// Fixed, non-scripted transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeTransformer;

impl NativeTransformer {
    pub fn new() -> Self {
        Self
    }

    fn transform_key(key: Value, record: &RecordId) -> Result<Value> {
        match key {
            Value::String(mut key) => {
                key.push_str(KEY_SUFFIX);
                Ok(Value::String(key))
            }
            other => Err(SfError::Execution(TransformExecutionError {
                engine: "native".to_string(),
                function: FunctionKind::Key,
                record: record.clone(),
                source: ScriptFailure::new(format!("cannot append to {}", other.shape())),
            })),
        }
    }

    fn transform_value(value: Value, record: &RecordId) -> Result<Value> {
        match value.into_map() {
            Ok(mut map) => {
                map.insert(VALUE_FIELD.to_string(), Value::Int(VALUE_FIELD_CONTENT));
                Ok(Value::Map(map))
            }
            Err(other) => Err(SfError::Marshal {
                record: record.clone(),
                source: MarshalError::ExpectedMapping {
                    shape: other.shape().to_string(),
                    direction: Direction::ToScript,
                },
            }),
        }
    }
}

impl Transform for NativeTransformer {
    fn apply(&self, record: &Record) -> Result<Record> {
        self.apply_owned(record.clone())
    }

    fn apply_owned(&self, record: Record) -> Result<Record> {
        let (id, key, value) = record.into_parts();
        let key = Self::transform_key(key, &id)?;
        let value = Self::transform_value(value, &id)?;
        Ok(Record::from_parts(id, key, value))
    }

    fn name(&self) -> &str {
        "native"
    }
}
