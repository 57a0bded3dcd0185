//! Focus Manager contract (§2, §4.2): a channel-priority arbiter. Core
//! components request/release named channels and receive state callbacks.

use std::sync::Arc;

use async_trait::async_trait;

/// The state a channel observer can be put in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    /// This observer holds the channel and may act.
    Foreground,
    /// Another, higher-priority activity holds the channel; this observer
    /// may continue quietly (e.g. AIP keeps streaming while backgrounded).
    Background,
    /// The channel has been released entirely.
    None,
}

/// Well-known focus channel names used by the core (§2 glossary).
pub mod channel {
    pub const DIALOG: &str = "Dialog";
    pub const CONTENT: &str = "Content";
    pub const ALERTS: &str = "Alerts";
}

/// Notified when a previously acquired channel's focus state changes.
#[async_trait]
pub trait FocusObserver: Send + Sync {
    async fn on_focus_changed(&self, state: FocusState);
}

/// Channel-priority arbiter (external collaborator, §2).
#[async_trait]
pub trait FocusManager: Send + Sync {
    /// Request `channel` on behalf of `activity_id`, registering `observer`
    /// for subsequent state callbacks. Returns `true` if the request was
    /// accepted (the observer will receive at least one `on_focus_changed`
    /// call).
    async fn acquire_channel(
        &self,
        channel: &str,
        observer: Arc<dyn FocusObserver>,
        activity_id: String,
    ) -> bool;

    /// Release `channel` on behalf of `activity_id`.
    async fn release_channel(&self, channel: &str, activity_id: &str) -> bool;
}
