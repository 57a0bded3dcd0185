//! Error types for va-emp.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmpError {
    /// A directive named a `playerId` that is not (or no longer)
    /// authorized.
    #[error("player {player_id} is not authorized")]
    UnauthorizedPlayer { player_id: String },

    /// A seek delta fell outside the permitted ±12 hour range.
    #[error("seek delta {delta_ms}ms exceeds the ±12h range")]
    SeekDeltaOutOfRange { delta_ms: i64 },

    /// A directive payload was missing a field this handler requires.
    #[error("missing required field {field}")]
    MissingField { field: &'static str },

    #[error("external media player is shut down")]
    ShutDown,
}

pub type EmpResult<T> = Result<T, EmpError>;
