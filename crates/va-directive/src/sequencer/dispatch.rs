//! The dispatch loop: the Sequencer's single serial executor (§5).
//!
//! Everything that touches dialog-group ordering, blocking, or
//! cancellation happens inside `DispatchLoop::run`, processing one
//! [`Command`] at a time. External callers never mutate this state
//! directly — they send a `Command` and, where the public API is
//! request/response, await a oneshot reply.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use va_infra::exception::{ExceptionErrorKind, ExceptionSender};

use crate::directive::Directive;
use crate::handler::{DirectiveHandler, HandleOutcome};
use crate::policy::{BlockingPolicy, Medium};
use crate::sequencer::registry::HandlerRegistry;
use crate::sequencer::result_handle::DispatchResultHandle;

pub enum Command {
    OnDirective {
        directive: Directive,
        reply: oneshot::Sender<bool>,
    },
    SetDialogRequestId {
        id: String,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Internal completion signal, fed either by a handler's
/// [`DispatchResultHandle`] or by a spawned `handle()` call that returned
/// `false` synchronously.
type Completion = (String, HandleOutcome, Option<String>);

struct QueuedDirective {
    directive: Directive,
    handler: Arc<dyn DirectiveHandler>,
    policy: BlockingPolicy,
}

/// A directive that has had `pre_handle` called and is waiting its turn
/// to call `handle` because another directive currently holds its medium.
struct PendingHandle {
    message_id: String,
    handler: Arc<dyn DirectiveHandler>,
}

pub struct DispatchLoop {
    registry: Arc<HandlerRegistry>,
    exception_sender: Arc<dyn ExceptionSender>,
    commands: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,

    current_dialog_id: String,
    /// Directives of the current dialog group waiting for `pre_handle`.
    queue: VecDeque<QueuedDirective>,
    /// Which message id currently holds each blocking medium's lock.
    medium_holder: HashMap<Medium, String>,
    /// Directives queued behind a medium's current holder.
    pending_by_medium: HashMap<Medium, VecDeque<PendingHandle>>,
    /// Handler owning each in-flight message id, kept so cancellation can
    /// find who to notify.
    in_flight_handlers: HashMap<String, Arc<dyn DirectiveHandler>>,
    /// Enqueue order of `in_flight_handlers`' keys, since a `HashMap`'s own
    /// iteration order is unspecified and `cancel_current_group` must
    /// cancel in the order directives were enqueued (§4.1).
    in_flight_order: VecDeque<String>,
    shut_down: bool,
}

impl DispatchLoop {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        exception_sender: Arc<dyn ExceptionSender>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        DispatchLoop {
            registry,
            exception_sender,
            commands,
            completions_tx,
            completions_rx,
            current_dialog_id: String::new(),
            queue: VecDeque::new(),
            medium_holder: HashMap::new(),
            pending_by_medium: HashMap::new(),
            in_flight_handlers: HashMap::new(),
            in_flight_order: VecDeque::new(),
            shut_down: false,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => {
                            if self.handle_command(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                Some((message_id, outcome, reason)) = self.completions_rx.recv() => {
                    self.handle_completion(message_id, outcome, reason).await;
                }
            }
        }
        info!("directive sequencer dispatch loop exiting");
    }

    /// Returns true if the loop should terminate.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::OnDirective { directive, reply } => {
                let accepted = self.on_directive(directive).await;
                let _ = reply.send(accepted);
                false
            }
            Command::SetDialogRequestId { id } => {
                self.set_dialog_request_id(id).await;
                false
            }
            Command::Shutdown { reply } => {
                self.do_shutdown().await;
                let _ = reply.send(());
                true
            }
        }
    }

    async fn on_directive(&mut self, directive: Directive) -> bool {
        if self.shut_down {
            return false;
        }
        if directive.validate_envelope().is_err() {
            return false;
        }

        if !directive.is_in_dialog() {
            self.dispatch_out_of_dialog(directive).await;
            return true;
        }

        if directive.dialog_request_id() != self.current_dialog_id {
            debug!(
                message_id = directive.message_id(),
                dialog_request_id = directive.dialog_request_id(),
                current = self.current_dialog_id.as_str(),
                "dropping directive for a dialog group that is not current"
            );
            return true;
        }

        match self.registry.lookup(&directive.key()) {
            Some(handler) => {
                let policy = handler
                    .configuration()
                    .get(&directive.key())
                    .copied()
                    .unwrap_or_default();
                self.queue.push_back(QueuedDirective {
                    directive,
                    handler,
                    policy,
                });
                self.drain_queue().await;
            }
            None => {
                self.report_missing_handler(&directive).await;
            }
        }
        true
    }

    async fn dispatch_out_of_dialog(&self, directive: Directive) {
        match self.registry.lookup(&directive.key()) {
            Some(handler) => {
                tokio::spawn(async move {
                    handler.handle_immediately(directive).await;
                });
            }
            None => self.report_missing_handler(&directive).await,
        }
    }

    async fn report_missing_handler(&self, directive: &Directive) {
        warn!(
            namespace = directive.namespace(),
            name = directive.name(),
            message_id = directive.message_id(),
            "no handler registered for directive"
        );
        self.exception_sender
            .send_exception_encountered(
                directive.payload().to_string(),
                ExceptionErrorKind::UnsupportedOperation,
                format!(
                    "no handler registered for ({}, {})",
                    directive.namespace(),
                    directive.name()
                ),
            )
            .await;
    }

    /// Runs `pre_handle` for every directive at the front of the queue,
    /// in order, then either dispatches `handle` immediately (medium
    /// free) or parks it behind the current holder.
    async fn drain_queue(&mut self) {
        while let Some(entry) = self.queue.pop_front() {
            let QueuedDirective {
                directive,
                handler,
                policy,
            } = entry;
            let message_id = directive.message_id().to_string();

            let result_handle = Arc::new(DispatchResultHandle::new(
                message_id.clone(),
                self.completions_tx.clone(),
            ));
            let reported = result_handle.clone();
            handler.pre_handle(directive, result_handle).await;

            if reported.failed_early() {
                // `preHandle` reported failure before returning. `handle`
                // must never be called in that case (§4.1 "If preHandle
                // throws/fails the Sequencer calls cancel(messageId) and
                // proceeds") — cancel instead and move on. The failure
                // completion it already sent still arrives through the
                // usual channel afterward and drives exception
                // reporting/group cancellation as normal.
                handler.cancel(&message_id).await;
                continue;
            }

            // Only directives actually being dispatched to `handle()` (now
            // or once their medium frees up) are tracked as in-flight. A
            // directive parked behind a medium holder lives solely in
            // `pending_by_medium` until `release_medium_if_holder` pulls it
            // out, so it is never double-counted for cancellation (a
            // parked id used to be inserted here unconditionally, which
            // made `cancel_current_group` cancel it once via
            // `in_flight_order` and once via `pending_by_medium`).
            if policy.blocks() {
                let medium = policy.medium;
                if self.medium_holder.contains_key(&medium) {
                    self.pending_by_medium
                        .entry(medium)
                        .or_default()
                        .push_back(PendingHandle {
                            message_id,
                            handler,
                        });
                } else {
                    self.medium_holder.insert(medium, message_id.clone());
                    self.in_flight_handlers
                        .insert(message_id.clone(), handler.clone());
                    self.in_flight_order.push_back(message_id.clone());
                    self.spawn_handle(message_id, handler);
                }
            } else {
                self.in_flight_handlers
                    .insert(message_id.clone(), handler.clone());
                self.in_flight_order.push_back(message_id.clone());
                self.spawn_handle(message_id, handler);
            }
        }
    }

    fn spawn_handle(&self, message_id: String, handler: Arc<dyn DirectiveHandler>) {
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let ok = handler.handle(&message_id).await;
            if !ok {
                let _ = completions.send((
                    message_id,
                    HandleOutcome::Failed,
                    Some("handle() returned false".to_string()),
                ));
            }
        });
    }

    async fn handle_completion(
        &mut self,
        message_id: String,
        outcome: HandleOutcome,
        reason: Option<String>,
    ) {
        self.in_flight_handlers.remove(&message_id);
        self.in_flight_order.retain(|id| id != &message_id);
        self.release_medium_if_holder(&message_id);

        if outcome == HandleOutcome::Failed {
            let description = reason.unwrap_or_default();
            warn!(message_id = message_id.as_str(), reason = description.as_str(), "directive failed");
            self.exception_sender
                .send_exception_encountered(
                    message_id,
                    ExceptionErrorKind::InternalError,
                    description,
                )
                .await;
            self.cancel_rest_of_group().await;
        }
    }

    fn release_medium_if_holder(&mut self, message_id: &str) {
        let freed_medium = self
            .medium_holder
            .iter()
            .find(|(_, holder)| holder.as_str() == message_id)
            .map(|(medium, _)| *medium);

        let Some(medium) = freed_medium else { return };
        self.medium_holder.remove(&medium);

        if let Some(queue) = self.pending_by_medium.get_mut(&medium) {
            if let Some(next) = queue.pop_front() {
                self.medium_holder.insert(medium, next.message_id.clone());
                self.in_flight_handlers
                    .insert(next.message_id.clone(), next.handler.clone());
                self.in_flight_order.push_back(next.message_id.clone());
                self.spawn_handle(next.message_id, next.handler);
            }
        }
    }

    /// `setFailed`/`handle() == false` semantics: cancel everything else
    /// still queued or parked in the current dialog group.
    async fn cancel_rest_of_group(&mut self) {
        while let Some(entry) = self.queue.pop_front() {
            entry.handler.cancel(entry.directive.message_id()).await;
        }
        for (_, mut parked) in self.pending_by_medium.drain() {
            while let Some(pending) = parked.pop_front() {
                pending.handler.cancel(&pending.message_id).await;
            }
        }
    }

    async fn set_dialog_request_id(&mut self, new_id: String) {
        if new_id == self.current_dialog_id {
            return;
        }
        self.cancel_current_group().await;
        self.current_dialog_id = new_id;
    }

    async fn cancel_current_group(&mut self) {
        // Enqueue order: a directive's `handle()` only starts once it has
        // claimed its medium, so the current medium holder(s) were
        // enqueued before anything still parked behind them or still
        // waiting on `pre_handle` — cancel in that order (§4.1 "Dialog
        // group cancellation", §8 Scenario S2: the in-flight blocking
        // holder itself, e.g. `Speak`, must receive `cancel`, not just
        // directives that never got to call `handle`). `in_flight_order`
        // tracks that order explicitly since `HashMap` iteration doesn't.
        for message_id in self.in_flight_order.drain(..) {
            if let Some(handler) = self.in_flight_handlers.remove(&message_id) {
                handler.cancel(&message_id).await;
            }
        }
        self.in_flight_handlers.clear();
        self.medium_holder.clear();
        for (_, mut parked) in self.pending_by_medium.drain() {
            while let Some(pending) = parked.pop_front() {
                pending.handler.cancel(&pending.message_id).await;
            }
        }
        while let Some(entry) = self.queue.pop_front() {
            entry.handler.cancel(entry.directive.message_id()).await;
        }
        // The spawned `handle()` task for a just-cancelled in-flight
        // holder keeps running to completion; its eventual completion
        // lands harmlessly since `release_medium_if_holder` no-ops once
        // the medium is no longer held under that message id's entry.
    }

    async fn do_shutdown(&mut self) {
        self.cancel_current_group().await;
        for handler in self.registry.all_distinct() {
            handler.on_deregistered().await;
        }
        self.registry.clear();
        self.shut_down = true;
    }
}
