//! Outbound event envelope and the Message Sender / Guaranteed Sender
//! contracts.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// A streamed binary payload carried alongside an outbound event (§4.2
/// "Attachment streaming") — e.g. the captured audio bound to a
/// `Recognize` event. Out-of-band: never part of the JSON envelope
/// itself, so `OutboundEvent` skips it when serializing.
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    /// Returns the next chunk of bytes, or `None` once the stream has
    /// ended (capture stopped, or the source closed).
    async fn next_chunk(&self) -> Option<Bytes>;
}

/// Header of an outbound event, mirroring the wire envelope's `header`
/// object (§6).
#[derive(Debug, Clone, Serialize)]
pub struct EventHeader {
    pub namespace: String,
    pub name: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialog_request_id: Option<String>,
}

/// A fully-built outbound event, ready to hand to a [`MessageSender`].
#[derive(Clone, Serialize)]
pub struct OutboundEvent {
    pub header: EventHeader,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Present only for events bound to a capture stream (§4.2). Never
    /// serialized — a `MessageSender` that cares reads it out-of-band
    /// before/while sending the envelope.
    #[serde(skip)]
    pub attachment: Option<Arc<dyn AttachmentSource>>,
}

impl std::fmt::Debug for OutboundEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundEvent")
            .field("header", &self.header)
            .field("payload", &self.payload)
            .field("context", &self.context)
            .field("attachment", &self.attachment.is_some())
            .finish()
    }
}

impl OutboundEvent {
    /// Build a new event with a freshly generated `messageId`.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, payload: Value) -> Self {
        OutboundEvent {
            header: EventHeader {
                namespace: namespace.into(),
                name: name.into(),
                message_id: Uuid::new_v4().to_string(),
                dialog_request_id: None,
            },
            payload,
            context: None,
            attachment: None,
        }
    }

    pub fn with_dialog_request_id(mut self, dialog_request_id: impl Into<String>) -> Self {
        self.header.dialog_request_id = Some(dialog_request_id.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_attachment(mut self, attachment: Arc<dyn AttachmentSource>) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Read `payload.playerId` back out, if present and a string. Used by
    /// the EMP's authorized-sender gate (§4.3, §10.3).
    pub fn payload_player_id(&self) -> Option<&str> {
        self.payload.get("playerId").and_then(Value::as_str)
    }
}

/// Outcome of handing an event to a sender, mirroring the original SDK's
/// `MessageRequestObserverInterface::Status` (§10.3). This is a transport
/// send outcome, distinct from [`crate::exception::ExceptionErrorKind`]
/// which describes a directive-handling failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Success,
    BadRequest,
    ServerError,
    Throttled,
    Canceled,
}

/// Best-effort outbound event sender (no persistence across reconnects).
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_event(&self, event: OutboundEvent) -> SendStatus;
}

/// Outbound event sender backed by a durable, acknowledgement-tracked
/// queue (§6 "Persisted state"). Used for events — like
/// `ReportDiscoveredPlayers` — that must survive a transient disconnect.
#[async_trait]
pub trait GuaranteedMessageSender: Send + Sync {
    async fn send_guaranteed(&self, event: OutboundEvent) -> SendStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_player_id_reads_string_field() {
        let event = OutboundEvent::new(
            "ExternalMediaPlayer",
            "SomeEvent",
            serde_json::json!({"playerId": "P1"}),
        );
        assert_eq!(event.payload_player_id(), Some("P1"));
    }

    #[test]
    fn payload_player_id_absent_is_none() {
        let event = OutboundEvent::new("ExternalMediaPlayer", "SomeEvent", serde_json::json!({}));
        assert_eq!(event.payload_player_id(), None);
    }
}
