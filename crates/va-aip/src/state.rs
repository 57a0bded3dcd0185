//! The AIP finite state machine (§4.2, §8 Testable Property 8).

/// `IDLE` is both the initial and terminal state — every transition from
/// a non-IDLE state ultimately reaches it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AipState {
    Idle,
    Recognizing,
    Busy,
    ExpectingSpeech,
}

impl Default for AipState {
    fn default() -> Self {
        AipState::Idle
    }
}

impl AipState {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            AipState::Idle => "IDLE",
            AipState::Recognizing => "RECOGNIZING",
            AipState::Busy => "BUSY",
            AipState::ExpectingSpeech => "EXPECTING_SPEECH",
        }
    }
}
