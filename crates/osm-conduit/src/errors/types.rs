//! Error type definitions for the conduit pipeline

use spill_file_manager::SpillFileError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level pipeline error type
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No factory is registered under the requested task type
    #[error("Unknown task type: {name}")]
    UnknownTaskType { name: String },

    /// A factory is already registered under this task type
    #[error("Task type \"{name}\" already exists")]
    DuplicateTaskType { name: String },

    /// Two task specifications share an id
    #[error("Duplicate task id: {task_id}")]
    DuplicateTaskId { task_id: String },

    /// No ordering is registered under the requested name
    #[error("Ordering type {name} doesn't exist")]
    UnknownOrdering { name: String },

    /// An ordering is already registered under this name
    #[error("Ordering type \"{name}\" already exists")]
    DuplicateOrdering { name: String },

    /// No ordering was named and none is registered as the default
    #[error("No ordering specified and no default ordering registered")]
    NoDefaultOrdering,

    /// A task argument is missing or has the wrong type
    #[error("Invalid argument '{argument}' for task {task_id}: {message}")]
    InvalidArgument {
        task_id: String,
        argument: String,
        message: String,
    },

    /// Pipe wiring could not be resolved
    #[error("Pipe binding error: {message}")]
    PipeBinding { message: String },

    /// Writer and reader of a pipe disagree on the record type
    #[error("Pipe '{pipe}' type mismatch: writer produces {writer}, reader expects {reader}")]
    PipeTypeMismatch {
        pipe: String,
        writer: &'static str,
        reader: &'static str,
    },

    /// The task graph has a data dependency cycle
    #[error("Task graph contains a cycle between tasks: {}", tasks.join(", "))]
    CyclicGraph { tasks: Vec<String> },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Spill storage errors
    #[error("Spill error: {0}")]
    Spill(#[from] SpillFileError),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The writer of a pipe went away without sending end-of-stream
    #[error("Upstream of pipe '{pipe}' terminated without end-of-stream")]
    UpstreamFailed { pipe: String },

    /// The pipeline was cancelled
    #[error("Pipeline cancelled")]
    Cancelled,

    /// A task returned an error
    #[error("Task '{task_id}' failed: {source}")]
    TaskFailed {
        task_id: String,
        #[source]
        source: Box<PipelineError>,
    },

    /// A task panicked
    #[error("Task '{task_id}' panicked: {message}")]
    TaskPanicked { task_id: String, message: String },

    /// A dataset lock could not be acquired
    #[error("Lock error on {path:?}: {message}")]
    Lock { path: PathBuf, message: String },

    /// Calling code broke an API contract
    #[error("Contract violation: {message}")]
    ContractViolation { message: String },
}

impl PipelineError {
    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        PipelineError::Configuration {
            message: message.into(),
        }
    }

    /// Create a pipe binding error
    pub fn binding_error(message: impl Into<String>) -> Self {
        PipelineError::PipeBinding {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(
        task_id: impl Into<String>,
        argument: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        PipelineError::InvalidArgument {
            task_id: task_id.into(),
            argument: argument.into(),
            message: message.into(),
        }
    }

    /// Create a contract violation error
    pub fn contract_violation(message: impl Into<String>) -> Self {
        PipelineError::ContractViolation {
            message: message.into(),
        }
    }

    /// Whether this error was raised while building a pipeline.
    pub fn is_configuration(&self) -> bool {
        match self {
            PipelineError::UnknownTaskType { .. }
            | PipelineError::DuplicateTaskType { .. }
            | PipelineError::DuplicateTaskId { .. }
            | PipelineError::UnknownOrdering { .. }
            | PipelineError::DuplicateOrdering { .. }
            | PipelineError::NoDefaultOrdering
            | PipelineError::InvalidArgument { .. }
            | PipelineError::PipeBinding { .. }
            | PipelineError::PipeTypeMismatch { .. }
            | PipelineError::CyclicGraph { .. }
            | PipelineError::Configuration { .. } => true,
            PipelineError::TaskFailed { source, .. } => source.is_configuration(),
            _ => false,
        }
    }

    /// Whether this error is a consequence of cancellation rather than a
    /// failure of its own.
    pub fn is_cancellation(&self) -> bool {
        match self {
            PipelineError::Cancelled => true,
            PipelineError::TaskFailed { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }

    /// Whether this error only reports that a different task failed first.
    pub fn is_secondary(&self) -> bool {
        match self {
            PipelineError::Cancelled | PipelineError::UpstreamFailed { .. } => true,
            PipelineError::TaskFailed { source, .. } => source.is_secondary(),
            _ => false,
        }
    }

    /// Wrap this error with the id of the task that returned it.
    pub fn in_task(self, task_id: impl Into<String>) -> Self {
        PipelineError::TaskFailed {
            task_id: task_id.into(),
            source: Box::new(self),
        }
    }
}
