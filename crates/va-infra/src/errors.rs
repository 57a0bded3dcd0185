//! Error types shared by the ambient plumbing (config, context, events).

use thiserror::Error;

/// Errors raised while building or validating shared infrastructure.
#[derive(Debug, Error)]
pub enum InfraError {
    /// A configuration field failed validation.
    #[error("invalid configuration field '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// A context provider failed to produce its state in time.
    #[error("context provider '{namespace}' timed out")]
    ContextTimeout { namespace: String },

    /// A context provider returned state that could not be serialized.
    #[error("context provider '{namespace}' produced invalid state: {reason}")]
    ContextInvalid { namespace: String, reason: String },

    /// The guaranteed-delivery sender's queue is full.
    #[error("guaranteed sender queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },
}

pub type InfraResult<T> = Result<T, InfraError>;
