//! Record envelope.

use crate::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity fields of a record.
///
/// These are never rewritten by a transform; they are copied from the input
/// record into the output record and attached to per-record errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Topic the record was read from
    pub topic: String,

    /// Partition within the topic, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<i32>,

    /// Offset within the partition, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,

    /// Record timestamp in milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl RecordId {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            offset: None,
            timestamp: None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.topic)?;
        if let Some(partition) = self.partition {
            write!(f, "[{partition}]")?;
        }
        if let Some(offset) = self.offset {
            write!(f, "@{offset}")?;
        }
        if let Some(timestamp) = self.timestamp {
            write!(f, " (ts={timestamp})")?;
        }
        Ok(())
    }
}

/// A record flowing through the pipeline.
///
/// Records are immutable: transforms read the key and value and build a new
/// record with [`Record::new_record`], which keeps the identity fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    id: RecordId,

    #[serde(default)]
    key: Value,

    #[serde(default)]
    value: Value,
}

impl Record {
    /// Creates a record on `topic` with no partition, offset or timestamp.
    pub fn new(topic: impl Into<String>, key: Value, value: Value) -> Self {
        Self {
            id: RecordId::new(topic),
            key,
            value,
        }
    }

    /// Reassembles a record from its parts.
    pub fn from_parts(id: RecordId, key: Value, value: Value) -> Self {
        Self { id, key, value }
    }

    /// Sets the partition.
    pub fn with_partition(mut self, partition: i32) -> Self {
        self.id.partition = Some(partition);
        self
    }

    /// Sets the offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.id.offset = Some(offset);
        self
    }

    /// Sets the timestamp (milliseconds since the Unix epoch).
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.id.timestamp = Some(timestamp);
        self
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.id.topic
    }

    pub fn partition(&self) -> Option<i32> {
        self.id.partition
    }

    pub fn offset(&self) -> Option<i64> {
        self.id.offset
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.id.timestamp
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Builds a new record with the same identity and the given key and value.
    pub fn new_record(&self, key: Value, value: Value) -> Self {
        Self {
            id: self.id.clone(),
            key,
            value,
        }
    }

    /// Splits the record into identity, key and value.
    pub fn into_parts(self) -> (RecordId, Value, Value) {
        (self.id, self.key, self.value)
    }
}
