//! Error types for va-aip.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AipError {
    /// `recognize()` was rejected because the incoming provider could not
    /// override the one already active.
    #[error("recognize() refused: active audio provider cannot be overridden")]
    ProviderCannotOverride,

    /// `recognize()` was called from a state that does not permit it
    /// (only IDLE and EXPECTING_SPEECH do).
    #[error("recognize() invalid from state {from:?}")]
    InvalidStateForRecognize { from: &'static str },

    /// An ExpectSpeech directive arrived while the current dialog id did
    /// not match the one the directive named.
    #[error("ExpectSpeech directive rejected: stale dialog request id")]
    StaleDialogRequestId,

    /// The processor has been shut down.
    #[error("audio input processor is shut down")]
    ShutDown,
}

pub type AipResult<T> = Result<T, AipError>;
