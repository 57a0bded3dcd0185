//! The Directive Sequencer (§4.1): public façade over the dispatch loop.

mod dispatch;
mod registry;
mod result_handle;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use va_infra::config::VoiceAssistantConfig;
use va_infra::exception::ExceptionSender;
use va_infra::lifecycle::{Component, ComponentState};

use crate::directive::Directive;
use crate::errors::{DirectiveError, DirectiveResult};
use crate::handler::DirectiveHandler;

use dispatch::{Command, DispatchLoop};
use registry::HandlerRegistry;

/// Accepts directives, routes them to registered handlers under their
/// declared blocking policy, and tracks the current dialog group.
///
/// Internally this is a thin handle: all state lives in a [`DispatchLoop`]
/// running on its own spawned task, reachable only through an unbounded
/// command channel (§5 "single-threaded cooperative executor"). Cloning a
/// `DirectiveSequencer` is cheap and shares the same loop.
#[derive(Clone)]
pub struct DirectiveSequencer {
    registry: Arc<HandlerRegistry>,
    commands: mpsc::UnboundedSender<Command>,
    config: Arc<VoiceAssistantConfig>,
    lifecycle: Arc<Mutex<ComponentState>>,
}

impl DirectiveSequencer {
    /// Spawns the dispatch loop and returns a handle to it.
    pub fn new(exception_sender: Arc<dyn ExceptionSender>, config: Arc<VoiceAssistantConfig>) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let loop_registry = registry.clone();
        tokio::spawn(async move {
            DispatchLoop::new(loop_registry, exception_sender, commands_rx)
                .run()
                .await;
        });

        DirectiveSequencer {
            registry,
            commands: commands_tx,
            config,
            lifecycle: Arc::new(Mutex::new(ComponentState::Created)),
        }
    }

    /// Registers `handler` under every key in `handler.configuration()`.
    /// All-or-nothing: fails if any key is already claimed, or if any
    /// declared namespace is outside the configured enabled set (§10.4).
    ///
    /// This mutates the registry directly rather than going through the
    /// dispatch loop — the registry's own locking (§ registry.rs) is what
    /// makes this safe to call from any number of callers concurrently,
    /// independent of whatever the loop is doing with an in-flight
    /// directive at the same instant.
    pub fn add_directive_handler(&self, handler: Arc<dyn DirectiveHandler>) -> bool {
        let namespaces_enabled = handler
            .configuration()
            .keys()
            .all(|key| self.config.is_namespace_enabled(&key.namespace));
        if !namespaces_enabled {
            return false;
        }
        self.registry.add(handler)
    }

    /// Deregisters `handler`, calling `on_deregistered()` on success.
    pub fn remove_directive_handler(&self, handler: Arc<dyn DirectiveHandler>) -> bool {
        let removed = self.registry.remove(&handler);
        if removed {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler.on_deregistered().await;
            });
        }
        removed
    }

    /// Submits `directive` for dispatch. Returns `false` only if the
    /// sequencer is shut down or the directive is malformed at the
    /// envelope level.
    pub async fn on_directive(&self, directive: Directive) -> DirectiveResult<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::OnDirective {
                directive,
                reply: reply_tx,
            })
            .is_err()
        {
            return Err(DirectiveError::ShutDown);
        }
        reply_rx.await.map_err(|_| DirectiveError::ShutDown)
    }

    /// Changes the current dialog id, cancelling every directive still
    /// queued under the previous one (§4.1 "Dialog group cancellation").
    /// An empty string is a legal id and simply disables dialog-group
    /// filtering until a non-empty id is set again.
    pub async fn set_dialog_request_id(&self, id: impl Into<String>) -> DirectiveResult<()> {
        self.commands
            .send(Command::SetDialogRequestId { id: id.into() })
            .map_err(|_| DirectiveError::ShutDown)
    }

    /// Drains and cancels everything outstanding, deregisters every
    /// handler, and makes subsequent `on_directive` calls no-ops.
    /// Idempotent — a second call simply finds the loop already gone.
    pub async fn shutdown(&self) {
        *self.lifecycle.lock() = ComponentState::ShuttingDown;
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Shutdown { reply: reply_tx })
            .is_err()
        {
            *self.lifecycle.lock() = ComponentState::ShutDown;
            return;
        }
        if reply_rx.await.is_err() {
            warn!("dispatch loop dropped its shutdown reply channel");
        }
        *self.lifecycle.lock() = ComponentState::ShutDown;
    }
}

#[async_trait]
impl Component for DirectiveSequencer {
    fn name(&self) -> &str {
        "directive-sequencer"
    }

    fn state(&self) -> ComponentState {
        *self.lifecycle.lock()
    }

    async fn start(&self) {
        let mut state = self.lifecycle.lock();
        if *state == ComponentState::Created {
            *state = ComponentState::Running;
        }
    }

    async fn shutdown(&self) {
        DirectiveSequencer::shutdown(self).await;
    }
}
