//! Exception reporting (§7): every error kind the core can hit is surfaced
//! to the cloud as a structured `ExceptionEncountered` event.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::events::{MessageSender, OutboundEvent};

const NAMESPACE_SYSTEM: &str = "System";
const NAME_EXCEPTION_ENCOUNTERED: &str = "ExceptionEncountered";

/// The three ways a directive can fail to route or be handled (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionErrorKind {
    /// Malformed payload, missing required field, out-of-range value.
    UnexpectedInformationReceived,
    /// No handler registered for the directive's (namespace, name).
    UnsupportedOperation,
    /// Handler refused or crashed.
    InternalError,
}

impl ExceptionErrorKind {
    /// Wire string, matching the AVS `ExceptionErrorType` enum names.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            ExceptionErrorKind::UnexpectedInformationReceived => "UNEXPECTED_INFORMATION_RECEIVED",
            ExceptionErrorKind::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            ExceptionErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Sends a structured failure event to the cloud (§6, §7).
#[async_trait]
pub trait ExceptionSender: Send + Sync {
    async fn send_exception_encountered(
        &self,
        unparsed_directive: String,
        kind: ExceptionErrorKind,
        error_description: String,
    );
}

/// Default [`ExceptionSender`] that builds the `System.ExceptionEncountered`
/// event and hands it to a [`MessageSender`].
pub struct DefaultExceptionSender {
    sender: Arc<dyn MessageSender>,
}

impl DefaultExceptionSender {
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ExceptionSender for DefaultExceptionSender {
    async fn send_exception_encountered(
        &self,
        unparsed_directive: String,
        kind: ExceptionErrorKind,
        error_description: String,
    ) {
        let event = OutboundEvent::new(
            NAMESPACE_SYSTEM,
            NAME_EXCEPTION_ENCOUNTERED,
            json!({
                "unparsedDirective": unparsed_directive,
                "error": {
                    "type": kind.as_wire_str(),
                    "message": error_description,
                },
            }),
        );
        self.sender.send_event(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SendStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        events: Mutex<Vec<OutboundEvent>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send_event(&self, event: OutboundEvent) -> SendStatus {
            self.events.lock().unwrap().push(event);
            SendStatus::Success
        }
    }

    #[tokio::test]
    async fn builds_exception_encountered_event() {
        let sender = Arc::new(RecordingSender::default());
        let exception_sender = DefaultExceptionSender::new(sender.clone());

        exception_sender
            .send_exception_encountered(
                "{\"namespace\":\"Bogus\"}".to_string(),
                ExceptionErrorKind::UnsupportedOperation,
                "no handler registered".to_string(),
            )
            .await;

        let events = sender.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].header.namespace, NAMESPACE_SYSTEM);
        assert_eq!(events[0].header.name, NAME_EXCEPTION_ENCOUNTERED);
        assert_eq!(events[0].payload["error"]["type"], "UNSUPPORTED_OPERATION");
    }
}
