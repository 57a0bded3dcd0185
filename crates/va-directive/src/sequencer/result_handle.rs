//! The concrete [`DirectiveHandlerResult`] handed to a handler's
//! `pre_handle`. Reports completion back to the dispatch loop over an
//! internal channel and enforces exactly-once semantics.

use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::handler::{DirectiveHandlerResult, HandleOutcome};

const NOT_REPORTED: u8 = 0;
const REPORTED_COMPLETED: u8 = 1;
const REPORTED_FAILED: u8 = 2;

pub struct DispatchResultHandle {
    message_id: String,
    reported: AtomicU8,
    completions: UnboundedSender<(String, HandleOutcome, Option<String>)>,
}

impl DispatchResultHandle {
    pub fn new(
        message_id: String,
        completions: UnboundedSender<(String, HandleOutcome, Option<String>)>,
    ) -> Self {
        DispatchResultHandle {
            message_id,
            reported: AtomicU8::new(NOT_REPORTED),
            completions,
        }
    }

    /// Whether `set_failed` already ran before `pre_handle` returned.
    /// Checked by the dispatch loop right after `pre_handle` returns so it
    /// can skip calling `handle` and call `cancel` instead (§4.1 "If
    /// preHandle throws/fails the Sequencer calls cancel(messageId)").
    /// Deliberately not triggered by an early `set_completed` — a handler
    /// reporting success from inside `pre_handle` is just an early
    /// completion, not the "preHandle failed" case this guards.
    pub fn failed_early(&self) -> bool {
        self.reported.load(Ordering::SeqCst) == REPORTED_FAILED
    }

    fn report(&self, outcome: HandleOutcome, reason: Option<String>) {
        let marker = match outcome {
            HandleOutcome::Completed => REPORTED_COMPLETED,
            HandleOutcome::Failed => REPORTED_FAILED,
        };
        if self
            .reported
            .compare_exchange(NOT_REPORTED, marker, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(
                message_id = %self.message_id,
                "directive result reported more than once; ignoring the second report"
            );
            return;
        }
        let _ = self
            .completions
            .send((self.message_id.clone(), outcome, reason));
    }
}

#[async_trait]
impl DirectiveHandlerResult for DispatchResultHandle {
    async fn set_completed(&self) {
        self.report(HandleOutcome::Completed, None);
    }

    async fn set_failed(&self, reason: String) {
        self.report(HandleOutcome::Failed, Some(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_report_is_ignored() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = DispatchResultHandle::new("msg-1".to_string(), tx);

        handle.set_completed().await;
        handle.set_failed("too late".to_string()).await;

        let (message_id, outcome, reason) = rx.recv().await.unwrap();
        assert_eq!(message_id, "msg-1");
        assert_eq!(outcome, HandleOutcome::Completed);
        assert_eq!(reason, None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_early_is_false_until_set_failed_runs() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = DispatchResultHandle::new("msg-1".to_string(), tx);
        assert!(!handle.failed_early());

        handle.set_failed("bad payload".to_string()).await;
        assert!(handle.failed_early());
    }

    #[tokio::test]
    async fn failed_early_stays_false_after_an_early_completion() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = DispatchResultHandle::new("msg-1".to_string(), tx);

        handle.set_completed().await;
        assert!(!handle.failed_early());
    }
}
