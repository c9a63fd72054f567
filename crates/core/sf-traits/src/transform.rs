//! Transform trait for record processing.

use sf_error::Result;
use sf_types::Record;

/// Trait for record transformations.
///
/// A transform maps one input record to one output record with the same
/// identity fields. Implementations must not mutate the input.
///
/// # Thread Safety
///
/// Transforms must be `Send + Sync`: a pipeline stage shares one configured
/// transform across all of its worker threads.
pub trait Transform: Send + Sync {
    /// Applies the transform to a record.
    ///
    /// # Arguments
    ///
    /// * `record` - Input record; left untouched
    ///
    /// # Returns
    ///
    /// A new record with the same topic, partition, offset and timestamp
    fn apply(&self, record: &Record) -> Result<Record>;

    /// Applies the transform to a record the caller no longer needs.
    ///
    /// Implementations may reuse the record's allocations. The default
    /// delegates to [`Transform::apply`].
    fn apply_owned(&self, record: Record) -> Result<Record> {
        self.apply(&record)
    }

    /// Returns the name of this transform for logging.
    fn name(&self) -> &str {
        "transform"
    }
}

/// A chain of transforms applied in sequence.
pub struct TransformChain {
    transforms: Vec<Box<dyn Transform>>,
    name: String,
}

impl TransformChain {
    /// Creates a new empty transform chain.
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
            name: "chain".to_string(),
        }
    }

    /// Adds a transform to the chain.
    pub fn push(mut self, transform: Box<dyn Transform>) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Sets the name of this chain.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }
}

impl Default for TransformChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for TransformChain {
    fn apply(&self, record: &Record) -> Result<Record> {
        let mut transforms = self.transforms.iter();
        let Some(first) = transforms.next() else {
            return Ok(record.clone());
        };
        // Intermediate records are private to the chain, so later steps may consume them.
        transforms.try_fold(first.apply(record)?, |record, transform| {
            transform.apply_owned(record)
        })
    }

    fn apply_owned(&self, record: Record) -> Result<Record> {
        self.transforms
            .iter()
            .try_fold(record, |record, transform| transform.apply_owned(record))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// An identity transform that passes records through unchanged.
///
/// Useful as a default or placeholder.
pub struct IdentityTransform;

impl Transform for IdentityTransform {
    fn apply(&self, record: &Record) -> Result<Record> {
        Ok(record.clone())
    }

    fn apply_owned(&self, record: Record) -> Result<Record> {
        Ok(record)
    }

    fn name(&self) -> &str {
        "identity"
    }
}
