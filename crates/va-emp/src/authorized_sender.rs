//! The authorized-sender gate (§4.3, §10.3): drops outbound adapter
//! events whose `payload.playerId` is not currently authorized.
//!
//! This is an outbound-path shim, not a directive-handling failure path —
//! a drop here reports `SendStatus::BadRequest` to the caller, never an
//! `ExceptionEncountered` event to the cloud (the cloud never asked for
//! the dropped event in the first place).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use va_infra::events::{MessageSender, OutboundEvent, SendStatus};

/// Read path runs on whatever thread calls `send_event` (an adapter's own
/// sender, distinct from the EMP's executor — §5 "Shared-resource
/// policy"), so the allow-list is a plain mutex, not actor-owned state.
#[derive(Clone)]
pub struct AuthorizedSender {
    allowed: Arc<Mutex<HashSet<String>>>,
    inner: Arc<dyn MessageSender>,
}

impl AuthorizedSender {
    pub fn new(inner: Arc<dyn MessageSender>) -> Self {
        AuthorizedSender {
            allowed: Arc::new(Mutex::new(HashSet::new())),
            inner,
        }
    }

    /// Replaces the allow-list wholesale. Called by the EMP whenever
    /// `AuthorizeDiscoveredPlayers` changes who's authorized.
    pub fn set_allowed_players(&self, player_ids: impl IntoIterator<Item = String>) {
        let mut allowed = self.allowed.lock();
        allowed.clear();
        allowed.extend(player_ids);
    }
}

#[async_trait]
impl MessageSender for AuthorizedSender {
    async fn send_event(&self, event: OutboundEvent) -> SendStatus {
        let player_id = event.payload_player_id().map(str::to_string);
        let authorized = match &player_id {
            Some(id) => self.allowed.lock().contains(id),
            // Events with no playerId field at all aren't subject to this
            // gate (it only polices per-player adapter events).
            None => true,
        };

        if !authorized {
            debug!(player_id = player_id.as_deref().unwrap_or(""), "dropping event from deauthorized player");
            return SendStatus::BadRequest;
        }

        self.inner.send_event(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSender {
        events: StdMutex<Vec<OutboundEvent>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send_event(&self, event: OutboundEvent) -> SendStatus {
            self.events.lock().unwrap().push(event);
            SendStatus::Success
        }
    }

    #[tokio::test]
    async fn drops_event_from_unauthorized_player() {
        let inner = Arc::new(RecordingSender::default());
        let gate = AuthorizedSender::new(inner.clone());

        let event = OutboundEvent::new(
            "ExternalMediaPlayer",
            "PlaybackSessionStarted",
            serde_json::json!({"playerId": "P1"}),
        );
        let status = gate.send_event(event).await;
        assert_eq!(status, SendStatus::BadRequest);
        assert!(inner.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn allows_event_after_authorization() {
        let inner = Arc::new(RecordingSender::default());
        let gate = AuthorizedSender::new(inner.clone());
        gate.set_allowed_players(["P1".to_string()]);

        let event = OutboundEvent::new(
            "ExternalMediaPlayer",
            "PlaybackSessionStarted",
            serde_json::json!({"playerId": "P1"}),
        );
        let status = gate.send_event(event).await;
        assert_eq!(status, SendStatus::Success);
        assert_eq!(inner.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn event_without_player_id_passes_through() {
        let inner = Arc::new(RecordingSender::default());
        let gate = AuthorizedSender::new(inner.clone());

        let event = OutboundEvent::new("ExternalMediaPlayer", "ReportDiscoveredPlayers", serde_json::json!({}));
        let status = gate.send_event(event).await;
        assert_eq!(status, SendStatus::Success);
    }
}
