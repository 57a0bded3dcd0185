//! Observers external collaborators register with the processor.

use async_trait::async_trait;

use crate::state::AipState;

/// Notified on every AIP state transition and on capture-stream overrun.
#[async_trait]
pub trait AipStateObserver: Send + Sync {
    async fn on_state_changed(&self, state: AipState);

    /// Fired when a capture reader overran and was repositioned (§4.2).
    async fn on_overrun(&self);
}

/// A separate collaborator (§4.2 "User inactivity") that resets its own
/// timer whenever the user starts a new interaction. AIP notifies it on
/// every transition into RECOGNIZING; it does not otherwise participate
/// in the FSM.
#[async_trait]
pub trait UserInactivityNotifier: Send + Sync {
    async fn on_user_active(&self);
}
