//! Error types for va-directive.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectiveError {
    /// The directive's envelope is missing a required field (`namespace`,
    /// `name`, or `messageId`).
    #[error("malformed directive envelope: missing {field}")]
    MalformedEnvelope { field: &'static str },

    /// The sequencer has been shut down and no longer accepts directives.
    #[error("directive sequencer is shut down")]
    ShutDown,

    /// `addDirectiveHandler` failed because one or more of the handler's
    /// keys are already claimed by another handler.
    #[error("handler registration rejected: key ({namespace}, {name}) already claimed")]
    KeyAlreadyClaimed { namespace: String, name: String },

    /// `removeDirectiveHandler` was called with a handler that does not
    /// own (all of) the keys it currently claims.
    #[error("handler deregistration rejected: not the owner of ({namespace}, {name})")]
    NotOwner { namespace: String, name: String },
}

pub type DirectiveResult<T> = Result<T, DirectiveError>;
