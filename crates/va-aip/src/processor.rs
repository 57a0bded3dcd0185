//! The Audio Input Processor's dispatch loop and public façade (§4.2, §5).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use va_directive::{
    BlockingPolicy, Directive, DirectiveHandler, DirectiveHandlerResult, HandlerConfiguration,
    Medium, NamespaceAndName,
};
use va_infra::context::ContextManager;
use va_infra::events::{MessageSender, OutboundEvent};
use va_infra::focus::{channel, FocusManager, FocusObserver, FocusState};
use va_infra::lifecycle::{Component, ComponentState};

use crate::attachment::RingAttachmentSource;
use crate::errors::{AipError, AipResult};
use crate::initiator::Initiator;
use crate::observer::{AipStateObserver, UserInactivityNotifier};
use crate::provider::AudioProvider;
use crate::state::AipState;

/// Fans an attachment reader's overrun notification out to every
/// registered state observer, since `RingAttachmentSource` only takes one.
struct OverrunFanout {
    observers: Vec<Arc<dyn AipStateObserver>>,
}

#[async_trait]
impl AipStateObserver for OverrunFanout {
    async fn on_state_changed(&self, _state: AipState) {}

    async fn on_overrun(&self) {
        for observer in &self.observers {
            observer.on_overrun().await;
        }
    }
}

const NAMESPACE_SPEECH_RECOGNIZER: &str = "SpeechRecognizer";
const EVENT_RECOGNIZE: &str = "Recognize";
const EVENT_EXPECT_SPEECH_TIMED_OUT: &str = "ExpectSpeechTimedOut";
const DIRECTIVE_STOP_CAPTURE: &str = "StopCapture";
const DIRECTIVE_EXPECT_SPEECH: &str = "ExpectSpeech";

/// The two directives AIP registers for, parsed out of the generic
/// `Directive` payload once at `pre_handle` time.
enum DirectiveAction {
    StopCapture,
    ExpectSpeech {
        timeout_ms: Option<u64>,
        dialog_request_id: String,
    },
}

fn parse_directive(directive: &Directive) -> Option<DirectiveAction> {
    match directive.name() {
        DIRECTIVE_STOP_CAPTURE => Some(DirectiveAction::StopCapture),
        DIRECTIVE_EXPECT_SPEECH => Some(DirectiveAction::ExpectSpeech {
            timeout_ms: directive.lookup_i64("timeoutInMilliseconds").map(|ms| ms as u64),
            dialog_request_id: directive.dialog_request_id().to_string(),
        }),
        other => {
            warn!(name = other, "AIP received a directive outside its registered configuration");
            None
        }
    }
}

enum Command {
    Recognize {
        provider: AudioProvider,
        initiator: Initiator,
        reply: oneshot::Sender<AipResult<()>>,
    },
    StopCapture {
        reply: oneshot::Sender<()>,
    },
    ServerConfirmed,
    ResetState {
        reply: oneshot::Sender<()>,
    },
    ExpectSpeech {
        timeout_ms: Option<u64>,
        dialog_request_id: String,
        reply: oneshot::Sender<AipResult<()>>,
    },
    SetCurrentDialogRequestId(String),
    FocusChanged(FocusState),
    ExpectSpeechTimeout {
        generation: u64,
    },
    PreHandleDirective {
        directive: Directive,
        result: Arc<dyn DirectiveHandlerResult>,
        reply: oneshot::Sender<()>,
    },
    HandleDirective {
        message_id: String,
        reply: oneshot::Sender<bool>,
    },
    CancelDirective {
        message_id: String,
        reply: oneshot::Sender<()>,
    },
    HandleDirectiveImmediately {
        directive: Directive,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct FocusBridge {
    commands: mpsc::UnboundedSender<Command>,
}

#[async_trait]
impl FocusObserver for FocusBridge {
    async fn on_focus_changed(&self, state: FocusState) {
        let _ = self.commands.send(Command::FocusChanged(state));
    }
}

/// Thin, cloneable handle onto the processor's spawned dispatch loop.
#[derive(Clone)]
pub struct AudioInputProcessor {
    commands: mpsc::UnboundedSender<Command>,
    lifecycle: Arc<Mutex<ComponentState>>,
}

pub struct AudioInputProcessorCollaborators {
    pub focus_manager: Arc<dyn FocusManager>,
    pub context_manager: Arc<dyn ContextManager>,
    pub message_sender: Arc<dyn MessageSender>,
    pub user_inactivity: Option<Arc<dyn UserInactivityNotifier>>,
    pub state_observers: Vec<Arc<dyn AipStateObserver>>,
    /// Default `ExpectSpeech` timeout used when a directive omits
    /// `timeoutInMilliseconds` (§10.4, `VoiceAssistantConfig`).
    pub default_expect_speech_timeout: Duration,
}

impl AudioInputProcessor {
    pub fn new(collaborators: AudioInputProcessorCollaborators) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let loop_commands = commands_tx.clone();
        tokio::spawn(async move {
            ActorLoop::new(collaborators, loop_commands, commands_rx)
                .run()
                .await;
        });

        AudioInputProcessor {
            commands: commands_tx,
            lifecycle: Arc::new(Mutex::new(ComponentState::Created)),
        }
    }

    /// Begins capture from `provider` for `initiator`. Valid from IDLE,
    /// RECOGNIZING (subject to provider precedence), and EXPECTING_SPEECH.
    pub async fn recognize(&self, provider: AudioProvider, initiator: Initiator) -> AipResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Recognize {
                provider,
                initiator,
                reply: reply_tx,
            })
            .map_err(|_| AipError::ShutDown)?;
        reply_rx.await.map_err(|_| AipError::ShutDown)?
    }

    /// RECOGNIZING -> BUSY. Also the effect of an inbound StopCapture
    /// directive or end-of-speech detection.
    pub async fn stop_capture(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::StopCapture { reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    /// BUSY -> IDLE, once the server/transport reports the turn is done.
    pub fn server_confirmed(&self) {
        let _ = self.commands.send(Command::ServerConfirmed);
    }

    /// Cancels the outstanding event (if any), releases focus, and
    /// returns to IDLE. Idempotent.
    pub async fn reset_state(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::ResetState { reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    /// An ExpectSpeech directive arrived. Valid only from IDLE with
    /// `dialog_request_id` matching the current dialog id. `timeout_ms` of
    /// `None` falls back to the collaborators' configured default.
    pub async fn expect_speech(&self, timeout_ms: Option<u64>, dialog_request_id: String) -> AipResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::ExpectSpeech {
                timeout_ms,
                dialog_request_id,
                reply: reply_tx,
            })
            .map_err(|_| AipError::ShutDown)?;
        reply_rx.await.map_err(|_| AipError::ShutDown)?
    }

    pub fn set_current_dialog_request_id(&self, id: impl Into<String>) {
        let _ = self
            .commands
            .send(Command::SetCurrentDialogRequestId(id.into()));
    }

    pub async fn shutdown(&self) {
        *self.lifecycle.lock() = ComponentState::ShuttingDown;
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Shutdown { reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
        *self.lifecycle.lock() = ComponentState::ShutDown;
    }
}

#[async_trait]
impl Component for AudioInputProcessor {
    fn name(&self) -> &str {
        "audio-input-processor"
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
        AudioInputProcessor::shutdown(self).await;
    }
}

/// AIP registers for `StopCapture` and `ExpectSpeech` under the
/// `SpeechRecognizer` namespace (§4.2): the Sequencer routes those two
/// cloud directives here instead of a host parsing them by hand.
#[async_trait]
impl DirectiveHandler for AudioInputProcessor {
    fn configuration(&self) -> HandlerConfiguration {
        let mut config = HandlerConfiguration::new();
        let audio_blocking = BlockingPolicy::new(Medium::Audio, true);
        config.insert(
            NamespaceAndName::new(NAMESPACE_SPEECH_RECOGNIZER, DIRECTIVE_STOP_CAPTURE),
            audio_blocking,
        );
        config.insert(
            NamespaceAndName::new(NAMESPACE_SPEECH_RECOGNIZER, DIRECTIVE_EXPECT_SPEECH),
            audio_blocking,
        );
        config
    }

    async fn handle_immediately(&self, directive: Directive) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::HandleDirectiveImmediately { directive, reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    async fn pre_handle(&self, directive: Directive, result: Arc<dyn DirectiveHandlerResult>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::PreHandleDirective { directive, result, reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    async fn handle(&self, message_id: &str) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::HandleDirective {
                message_id: message_id.to_string(),
                reply: reply_tx,
            })
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    async fn cancel(&self, message_id: &str) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::CancelDirective {
                message_id: message_id.to_string(),
                reply: reply_tx,
            })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    async fn on_deregistered(&self) {}
}

struct ActorLoop {
    collaborators: AudioInputProcessorCollaborators,
    self_commands: mpsc::UnboundedSender<Command>,
    commands: mpsc::UnboundedReceiver<Command>,

    state: AipState,
    active_provider: Option<AudioProvider>,
    active_initiator: Option<Initiator>,
    current_dialog_request_id: String,
    focus_state: FocusState,
    expect_speech_generation: u64,
    shut_down: bool,
    pending_directives: std::collections::HashMap<String, (DirectiveAction, Arc<dyn DirectiveHandlerResult>)>,
}

impl ActorLoop {
    fn new(
        collaborators: AudioInputProcessorCollaborators,
        self_commands: mpsc::UnboundedSender<Command>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        ActorLoop {
            collaborators,
            self_commands,
            commands,
            state: AipState::Idle,
            active_provider: None,
            active_initiator: None,
            current_dialog_request_id: String::new(),
            focus_state: FocusState::None,
            expect_speech_generation: 0,
            shut_down: false,
            pending_directives: std::collections::HashMap::new(),
        }
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            if self.dispatch(command).await {
                break;
            }
        }
        info!("audio input processor dispatch loop exiting");
    }

    async fn dispatch(&mut self, command: Command) -> bool {
        match command {
            Command::Recognize {
                provider,
                initiator,
                reply,
            } => {
                let result = self.on_recognize(provider, initiator).await;
                let _ = reply.send(result);
            }
            Command::StopCapture { reply } => {
                self.on_stop_capture().await;
                let _ = reply.send(());
            }
            Command::ServerConfirmed => self.on_server_confirmed().await,
            Command::ResetState { reply } => {
                self.on_reset_state().await;
                let _ = reply.send(());
            }
            Command::ExpectSpeech {
                timeout_ms,
                dialog_request_id,
                reply,
            } => {
                let result = self.on_expect_speech(timeout_ms, dialog_request_id).await;
                let _ = reply.send(result);
            }
            Command::SetCurrentDialogRequestId(id) => {
                self.current_dialog_request_id = id;
            }
            Command::FocusChanged(state) => self.on_focus_changed(state).await,
            Command::ExpectSpeechTimeout { generation } => {
                self.on_expect_speech_timeout(generation).await;
            }
            Command::PreHandleDirective { directive, result, reply } => {
                let message_id = directive.message_id().to_string();
                if let Some(action) = parse_directive(&directive) {
                    self.pending_directives.insert(message_id, (action, result));
                } else {
                    result.set_failed(format!("unrecognized directive {}", directive.name())).await;
                }
                let _ = reply.send(());
            }
            Command::HandleDirective { message_id, reply } => {
                let outcome = self.on_handle_directive(&message_id).await;
                let _ = reply.send(outcome);
            }
            Command::CancelDirective { message_id, reply } => {
                if self.pending_directives.remove(&message_id).is_some() {
                    debug!(message_id = %message_id, "cancelled AIP directive before handle");
                }
                let _ = reply.send(());
            }
            Command::HandleDirectiveImmediately { directive, reply } => {
                if let Some(action) = parse_directive(&directive) {
                    self.execute_directive_action(action).await;
                }
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                self.on_shutdown().await;
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    async fn transition(&mut self, new_state: AipState) {
        if new_state == self.state {
            return;
        }
        debug!(from = self.state.as_wire_str(), to = new_state.as_wire_str(), "AIP state transition");
        self.state = new_state;
        for observer in &self.collaborators.state_observers {
            observer.on_state_changed(new_state).await;
        }
    }

    async fn on_recognize(&mut self, provider: AudioProvider, initiator: Initiator) -> AipResult<()> {
        if self.shut_down {
            return Err(AipError::ShutDown);
        }

        match self.state {
            AipState::Idle | AipState::ExpectingSpeech => {
                self.expect_speech_generation += 1; // invalidate any pending timeout
            }
            AipState::Recognizing => {
                let active = self
                    .active_provider
                    .as_ref()
                    .expect("RECOGNIZING implies an active provider");
                if !provider.can_supersede(active) {
                    return Err(AipError::ProviderCannotOverride);
                }
            }
            AipState::Busy => {
                return Err(AipError::InvalidStateForRecognize {
                    from: self.state.as_wire_str(),
                });
            }
        }

        self.active_provider = Some(provider);
        self.active_initiator = Some(initiator);

        if let Some(notifier) = &self.collaborators.user_inactivity {
            notifier.on_user_active().await;
        }

        let activity_id = Uuid::new_v4().to_string();
        let bridge = Arc::new(FocusBridge {
            commands: self.self_commands.clone(),
        });
        self.collaborators
            .focus_manager
            .acquire_channel(channel::DIALOG, bridge, activity_id)
            .await;

        self.transition(AipState::Recognizing).await;
        Ok(())
    }

    async fn on_focus_changed(&mut self, state: FocusState) {
        self.focus_state = state;
        match state {
            FocusState::Foreground => {
                if self.state == AipState::Recognizing {
                    self.dispatch_recognize_event().await;
                }
            }
            FocusState::Background => {
                debug!("AIP backgrounded; continuing capture without a new event");
            }
            FocusState::None => {
                if matches!(self.state, AipState::Recognizing | AipState::ExpectingSpeech) {
                    self.active_provider = None;
                    self.active_initiator = None;
                    self.transition(AipState::Idle).await;
                }
            }
        }
    }

    async fn dispatch_recognize_event(&mut self) {
        let context = self.collaborators.context_manager.get_context().await;
        let keyword = match &self.active_initiator {
            Some(Initiator::Wakeword { keyword, .. }) => Some(keyword.clone()),
            _ => None,
        };

        let mut event = OutboundEvent::new(
            NAMESPACE_SPEECH_RECOGNIZER,
            EVENT_RECOGNIZE,
            json!({ "wakeword": keyword }),
        )
        .with_dialog_request_id(self.current_dialog_request_id.clone())
        .with_context(context);

        if let Some(provider) = &self.active_provider {
            let fanout = OverrunFanout {
                observers: self.collaborators.state_observers.clone(),
            };
            let attachment = RingAttachmentSource::new(
                provider.reader.open_attachment_reader(),
                Some(Arc::new(fanout)),
            );
            event = event.with_attachment(Arc::new(attachment));
        }

        self.collaborators.message_sender.send_event(event).await;
    }

    async fn on_stop_capture(&mut self) {
        if self.state != AipState::Recognizing {
            warn!(state = self.state.as_wire_str(), "stop_capture ignored outside RECOGNIZING");
            return;
        }
        self.transition(AipState::Busy).await;
    }

    async fn on_server_confirmed(&mut self) {
        if self.state != AipState::Busy {
            return;
        }
        self.release_focus_if_held().await;
        self.transition(AipState::Idle).await;
    }

    async fn on_reset_state(&mut self) {
        if self.state == AipState::Idle {
            return;
        }
        self.active_provider = None;
        self.active_initiator = None;
        self.expect_speech_generation += 1;
        self.release_focus_if_held().await;
        self.transition(AipState::Idle).await;
    }

    async fn release_focus_if_held(&mut self) {
        if self.focus_state != FocusState::None {
            self.collaborators
                .focus_manager
                .release_channel(channel::DIALOG, "aip")
                .await;
            self.focus_state = FocusState::None;
        }
    }

    async fn on_expect_speech(
        &mut self,
        timeout_ms: Option<u64>,
        dialog_request_id: String,
    ) -> AipResult<()> {
        if self.shut_down {
            return Err(AipError::ShutDown);
        }
        if self.state != AipState::Idle {
            return Err(AipError::InvalidStateForRecognize {
                from: self.state.as_wire_str(),
            });
        }
        if dialog_request_id != self.current_dialog_request_id {
            return Err(AipError::StaleDialogRequestId);
        }

        let timeout_ms = timeout_ms.unwrap_or_else(|| self.collaborators.default_expect_speech_timeout.as_millis() as u64);
        self.expect_speech_generation += 1;
        let generation = self.expect_speech_generation;
        let commands = self.self_commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(timeout_ms)).await;
            let _ = commands.send(Command::ExpectSpeechTimeout { generation });
        });

        self.transition(AipState::ExpectingSpeech).await;
        Ok(())
    }

    async fn on_expect_speech_timeout(&mut self, generation: u64) {
        if generation != self.expect_speech_generation || self.state != AipState::ExpectingSpeech {
            return;
        }
        let event = OutboundEvent::new(
            NAMESPACE_SPEECH_RECOGNIZER,
            EVENT_EXPECT_SPEECH_TIMED_OUT,
            json!({}),
        )
        .with_dialog_request_id(self.current_dialog_request_id.clone());
        self.collaborators.message_sender.send_event(event).await;
        self.transition(AipState::Idle).await;
    }

    async fn on_handle_directive(&mut self, message_id: &str) -> bool {
        let Some((action, result)) = self.pending_directives.remove(message_id) else {
            warn!(message_id = %message_id, "handle called with no matching preHandle, ignoring");
            return false;
        };
        match action {
            DirectiveAction::StopCapture => {
                self.on_stop_capture().await;
                result.set_completed().await;
                true
            }
            DirectiveAction::ExpectSpeech { timeout_ms, dialog_request_id } => {
                match self.on_expect_speech(timeout_ms, dialog_request_id).await {
                    Ok(()) => {
                        result.set_completed().await;
                        true
                    }
                    Err(err) => {
                        result.set_failed(err.to_string()).await;
                        false
                    }
                }
            }
        }
    }

    async fn execute_directive_action(&mut self, action: DirectiveAction) {
        match action {
            DirectiveAction::StopCapture => self.on_stop_capture().await,
            DirectiveAction::ExpectSpeech { timeout_ms, dialog_request_id } => {
                if let Err(err) = self.on_expect_speech(timeout_ms, dialog_request_id).await {
                    warn!(error = %err, "out-of-dialog ExpectSpeech directive rejected");
                }
            }
        }
    }

    async fn on_shutdown(&mut self) {
        self.pending_directives.clear();
        self.active_provider = None;
        self.active_initiator = None;
        self.expect_speech_generation += 1;
        self.release_focus_if_held().await;
        self.transition(AipState::Idle).await;
        self.shut_down = true;
    }
}
