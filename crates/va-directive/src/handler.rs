//! The `DirectiveHandler` contract and the exactly-once completion
//! callback handed to handlers via `preHandle`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::directive::{Directive, NamespaceAndName};
use crate::policy::BlockingPolicy;

/// `(namespace, name) -> BlockingPolicy` returned by a handler's
/// `configuration()`. A plain `HashMap` is sufficient here — it's read
/// once at registration time, never mutated concurrently.
pub type HandlerConfiguration = HashMap<NamespaceAndName, BlockingPolicy>;

/// What a handler did with the outcome of a dispatch. Used internally by
/// the sequencer's dispatch loop to decide whether to advance or cancel
/// the rest of a dialog group; not exposed to handler authors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Completed,
    Failed,
}

/// Handed to a handler's `preHandle` so it can report exactly one outcome
/// for the directive once `handle` finishes (or fails before it ever
/// gets there). Calling either method more than once is a logic error in
/// the handler — the second call is ignored and a warning is logged,
/// rather than panicking, since the cost of double-completion reaching a
/// handler bug should fall on observability, not on crashing the
/// sequencer.
#[async_trait]
pub trait DirectiveHandlerResult: Send + Sync {
    async fn set_completed(&self);
    async fn set_failed(&self, reason: String);
}

/// A registered handler for one or more (namespace, name) directive keys.
///
/// Mirrors the two-phase dispatch contract (§4.1): the sequencer always
/// calls `pre_handle` before `handle` for a given directive, and calls
/// `cancel` instead of `handle` if the directive's dialog group was
/// cancelled, the envelope was malformed, or `pre_handle` itself failed.
#[async_trait]
pub trait DirectiveHandler: Send + Sync {
    /// Declares the blocking policy this handler wants for each
    /// (namespace, name) key it owns. Consulted once at registration.
    fn configuration(&self) -> HandlerConfiguration;

    /// Out-of-dialog directives (`dialogRequestId` empty) skip queueing
    /// entirely and are delivered here instead of through
    /// `pre_handle`/`handle`.
    async fn handle_immediately(&self, directive: Directive);

    /// First phase of in-dialog dispatch: parse/validate `directive` and
    /// stash whatever the eventual `handle` call will need. `result` is
    /// the handler's exactly-once completion channel for this directive.
    async fn pre_handle(&self, directive: Directive, result: Arc<dyn DirectiveHandlerResult>);

    /// Second phase: perform the directive's effect. Must return
    /// synchronously true/false — `false` is treated by the sequencer as
    /// an immediate failure distinct from an eventual `set_failed` call
    /// (see §4.1 "handle must return true synchronously").
    async fn handle(&self, message_id: &str) -> bool;

    /// Invoked instead of `handle` when the directive's dialog group is
    /// cancelled, its envelope was malformed, or `pre_handle` failed.
    async fn cancel(&self, message_id: &str);

    /// Called once when this handler is removed from the sequencer
    /// (`removeDirectiveHandler` succeeding, or shutdown).
    async fn on_deregistered(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Medium;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        handled: AtomicUsize,
        cancelled: AtomicUsize,
    }

    #[async_trait]
    impl DirectiveHandler for CountingHandler {
        fn configuration(&self) -> HandlerConfiguration {
            let mut config = HandlerConfiguration::new();
            config.insert(
                NamespaceAndName::new("Speaker", "SetVolume"),
                BlockingPolicy::new(Medium::Audio, true),
            );
            config
        }

        async fn handle_immediately(&self, _directive: Directive) {}

        async fn pre_handle(
            &self,
            _directive: Directive,
            _result: Arc<dyn DirectiveHandlerResult>,
        ) {
        }

        async fn handle(&self, _message_id: &str) -> bool {
            self.handled.fetch_add(1, Ordering::SeqCst);
            true
        }

        async fn cancel(&self, _message_id: &str) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_deregistered(&self) {}
    }

    #[tokio::test]
    async fn configuration_declares_its_keys() {
        let handler = CountingHandler {
            handled: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        };
        let config = handler.configuration();
        let policy = config
            .get(&NamespaceAndName::new("Speaker", "SetVolume"))
            .unwrap();
        assert_eq!(policy.medium, Medium::Audio);
        assert!(policy.is_blocking);
    }

    #[tokio::test]
    async fn handle_and_cancel_are_independently_counted() {
        let handler = CountingHandler {
            handled: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        };
        assert!(handler.handle("msg-1").await);
        handler.cancel("msg-2").await;
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
        assert_eq!(handler.cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handle_immediately_accepts_out_of_dialog_directive() {
        let handler = CountingHandler {
            handled: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        };
        let directive = Directive::new("Speaker", "SetVolume", "msg-3", "", json!({"volume": 5}));
        handler.handle_immediately(directive).await;
    }
}
