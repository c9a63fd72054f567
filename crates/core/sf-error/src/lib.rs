//! Error types and classification for scriptflow.
//!
//! This crate provides:
//! - [`SfError`] - Top-level error enum for configuring and applying transforms
//! - Domain-specific errors ([`ConfigError`], [`CompilationError`], [`MarshalError`],
//!   [`TransformExecutionError`])
//! - [`InvokeError`] - What a script runtime reports for a single invocation
//! - [`ErrorScope`] for deciding whether a failure poisons the transformer or
//!   only the record being processed

use sf_types::{FunctionKind, RecordId};
use std::fmt;
use thiserror::Error;

/// Top-level error type for scriptflow.
#[derive(Error, Debug)]
pub enum SfError {
    /// Invalid or incomplete transformer configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Script text did not compile into the required function
    #[error("Compilation error: {0}")]
    Compilation(#[from] CompilationError),

    /// A value could not be moved between the host and a script runtime
    #[error("Marshal error for record {record}: {source}")]
    Marshal {
        record: RecordId,
        #[source]
        source: MarshalError,
    },

    /// A compiled function raised an error while running
    #[error("Transform execution error: {0}")]
    Execution(#[from] TransformExecutionError),

    /// Operation not allowed in the transformer's current state
    #[error("Illegal state: {0}")]
    IllegalState(String),
}

impl SfError {
    /// Returns the identity of the record that caused this error, if any.
    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            Self::Marshal { record, .. } => Some(record),
            Self::Execution(e) => Some(&e.record),
            _ => None,
        }
    }

    /// Returns true if only the current record is affected.
    pub fn is_record_scoped(&self) -> bool {
        classify_error(self) == ErrorScope::Record
    }
}

/// Configuration errors, raised by `configure`.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `engine-name` does not match a registered engine
    #[error("Unknown engine '{name}' (available: {available})")]
    UnknownEngine { name: String, available: String },

    /// A required option was not supplied
    #[error("Missing required option '{0}'")]
    MissingOption(&'static str),
}

/// Compilation errors, raised by `configure` (and by the first `apply` on a
/// new thread if the runtime cannot be rebuilt there).
#[derive(Error, Debug)]
pub enum CompilationError {
    /// Script text failed to parse or evaluate
    #[error("{engine}: failed to compile {function} script: {message}")]
    Syntax {
        engine: String,
        function: FunctionKind,
        message: String,
    },

    /// Script does not define the required top-level function
    #[error("{engine}: script does not define function '{function}'")]
    MissingFunction {
        engine: String,
        function: FunctionKind,
    },

    /// Function exists but cannot be bound to a single argument
    #[error("{engine}: '{function}' cannot be called with one argument: {detail}")]
    Arity {
        engine: String,
        function: FunctionKind,
        detail: String,
    },

    /// The interpreter itself could not be created
    #[error("{engine}: failed to initialize runtime: {message}")]
    Runtime { engine: String, message: String },
}

impl CompilationError {
    pub fn syntax(engine: &str, function: FunctionKind, message: impl fmt::Display) -> Self {
        Self::Syntax {
            engine: engine.to_string(),
            function,
            message: message.to_string(),
        }
    }

    pub fn missing_function(engine: &str, function: FunctionKind) -> Self {
        Self::MissingFunction {
            engine: engine.to_string(),
            function,
        }
    }

    pub fn arity(engine: &str, function: FunctionKind, detail: impl fmt::Display) -> Self {
        Self::Arity {
            engine: engine.to_string(),
            function,
            detail: detail.to_string(),
        }
    }

    pub fn runtime(engine: &str, message: impl fmt::Display) -> Self {
        Self::Runtime {
            engine: engine.to_string(),
            message: message.to_string(),
        }
    }
}

/// Which way a value was travelling when marshaling failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host value into the script runtime
    ToScript,

    /// Script result back into a host value
    ToHost,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToScript => write!(f, "into script"),
            Self::ToHost => write!(f, "out of script"),
        }
    }
}

/// Marshaling errors, scoped to a single record.
#[derive(Error, Debug)]
pub enum MarshalError {
    /// The value has no representation on the other side
    #[error("Cannot marshal {shape} {direction}")]
    UnsupportedShape { shape: String, direction: Direction },

    /// A mapping key is something other than a string
    #[error("Mapping key must be a string, found {shape}")]
    NonStringKey { shape: String },

    /// An integer does not fit in a signed 64-bit host integer
    #[error("Integer {value} does not fit in 64 bits")]
    IntegerOverflow { value: String },

    /// A mapping was required
    #[error("Expected a mapping {direction}, found {shape}")]
    ExpectedMapping { shape: String, direction: Direction },

    /// The script produced no value at all
    #[error("Script produced no result")]
    NoResult,

    /// The runtime failed while building or reading a value
    #[error("Runtime failure while marshaling: {0}")]
    Backend(String),
}

impl MarshalError {
    pub fn unsupported(shape: impl Into<String>, direction: Direction) -> Self {
        Self::UnsupportedShape {
            shape: shape.into(),
            direction,
        }
    }

    pub fn backend(message: impl fmt::Display) -> Self {
        Self::Backend(message.to_string())
    }
}

/// An error raised by script code while it ran.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ScriptFailure {
    pub message: String,
}

impl ScriptFailure {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Failure of a single function invocation inside a script runtime.
///
/// Runtimes do not know which record they are processing; the transformer
/// converts this into an [`SfError`] carrying the record identity.
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Script(#[from] ScriptFailure),
}

impl InvokeError {
    /// Attaches record identity and function context.
    pub fn into_sf_error(self, engine: &str, function: FunctionKind, record: &RecordId) -> SfError {
        match self {
            Self::Marshal(source) => SfError::Marshal {
                record: record.clone(),
                source,
            },
            Self::Script(source) => SfError::Execution(TransformExecutionError {
                engine: engine.to_string(),
                function,
                record: record.clone(),
                source,
            }),
        }
    }
}

/// A compiled function failed while transforming a record.
#[derive(Error, Debug)]
#[error("{engine} '{function}' failed for record {record}: {source}")]
pub struct TransformExecutionError {
    /// Engine that ran the function
    pub engine: String,

    /// Function that failed
    pub function: FunctionKind,

    /// Identity of the record being transformed
    pub record: RecordId,

    /// Error raised by the script
    #[source]
    pub source: ScriptFailure,
}

/// How far the damage of an error reaches.
///
/// Used by callers to decide between aborting and dropping, dead-lettering
/// or passing through the offending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// The transformer instance is unusable (configuration, compilation, state errors)
    Instance,

    /// Only the current record failed; the transformer remains usable
    Record,
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance => write!(f, "Instance"),
            Self::Record => write!(f, "Record"),
        }
    }
}

/// Classifies an error by the scope it affects.
///
/// # Arguments
///
/// * `error` - The error to classify
///
/// # Returns
///
/// [`ErrorScope::Record`] for marshaling and execution errors, otherwise
/// [`ErrorScope::Instance`]
pub fn classify_error(error: &SfError) -> ErrorScope {
    match error {
        SfError::Config(_) => ErrorScope::Instance,
        SfError::Compilation(_) => ErrorScope::Instance,
        SfError::Marshal { .. } => ErrorScope::Record,
        SfError::Execution(_) => ErrorScope::Record,
        SfError::IllegalState(_) => ErrorScope::Instance,
    }
}

/// Result type alias using SfError.
pub type Result<T> = std::result::Result<T, SfError>;
