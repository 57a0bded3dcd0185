//! The External Media Player's dispatch loop and public façade (§4.3, §5).
//!
//! Runs the same single-executor-over-a-command-channel shape as the
//! Directive Sequencer and Audio Input Processor: every directive and
//! every discovery callback from an adapter handler funnels through one
//! `mpsc` queue, so authorization state, focus, and in-flight
//! `preHandle`/`handle` pairs never race each other.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use va_directive::{
    BlockingPolicy, Directive, DirectiveHandler, DirectiveHandlerResult, HandlerConfiguration,
    Medium, NamespaceAndName,
};
use va_infra::config::VoiceAssistantConfig;
use va_infra::events::{GuaranteedMessageSender, MessageSender, OutboundEvent};
use va_infra::exception::{ExceptionErrorKind, ExceptionSender};
use va_infra::lifecycle::{Component, ComponentState};

use crate::adapter::{ExternalMediaAdapterHandler, PlayParams};
use crate::authorized_sender::AuthorizedSender;
use crate::directive_parse::{self, Action};
use crate::errors::EmpError;
use crate::player::{LocalOperation, PlayerInfo};
use crate::registry::AuthorizedAdapters;

const NAMESPACE_EMP: &str = directive_parse::NAMESPACE_EMP;
const NAMESPACE_PLAYBACK_CONTROLLER: &str = directive_parse::NAMESPACE_PLAYBACK_CONTROLLER;
const NAMESPACE_PLAYLIST_CONTROLLER: &str = directive_parse::NAMESPACE_PLAYLIST_CONTROLLER;
const NAMESPACE_SEEK_CONTROLLER: &str = directive_parse::NAMESPACE_SEEK_CONTROLLER;
const NAMESPACE_FAVORITES_CONTROLLER: &str = directive_parse::NAMESPACE_FAVORITES_CONTROLLER;

const EVENT_AUTHORIZATION_COMPLETE: &str = "AuthorizationComplete";
const EVENT_REPORT_DISCOVERED_PLAYERS: &str = "ReportDiscoveredPlayers";

enum Command {
    PreHandle {
        directive: Directive,
        result: Arc<dyn DirectiveHandlerResult>,
        reply: oneshot::Sender<()>,
    },
    Handle {
        message_id: String,
        reply: oneshot::Sender<bool>,
    },
    Cancel {
        message_id: String,
        reply: oneshot::Sender<()>,
    },
    HandleImmediately {
        directive: Directive,
        reply: oneshot::Sender<()>,
    },
    DiscoveredPlayers {
        handler: Arc<dyn ExternalMediaAdapterHandler>,
        players: Vec<PlayerInfo>,
    },
    Startup {
        reply: oneshot::Sender<()>,
    },
    LocalOperation {
        op: LocalOperation,
        reply: oneshot::Sender<()>,
    },
    LocalSeekTo {
        location_ms: i64,
        from_start: bool,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub struct ExternalMediaPlayerCollaborators {
    pub message_sender: AuthorizedSender,
    pub guaranteed_sender: Arc<dyn GuaranteedMessageSender>,
    pub exception_sender: Arc<dyn ExceptionSender>,
    /// Supplies the `agent`/`spiVersion` strings the SessionState context
    /// provider reports (§10.4).
    pub config: Arc<VoiceAssistantConfig>,
}

/// Thin, cloneable handle onto the EMP's spawned dispatch loop. Also the
/// point of contact for adapter handlers announcing discovery and for a
/// host wiring up context providers against the shared registry.
#[derive(Clone)]
pub struct ExternalMediaPlayer {
    commands: mpsc::UnboundedSender<Command>,
    registry: Arc<AuthorizedAdapters>,
    config: Arc<VoiceAssistantConfig>,
    lifecycle: Arc<Mutex<ComponentState>>,
}

impl ExternalMediaPlayer {
    pub fn new(collaborators: ExternalMediaPlayerCollaborators) -> Self {
        let registry = Arc::new(AuthorizedAdapters::new());
        let config = collaborators.config.clone();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let actor_registry = registry.clone();
        tokio::spawn(async move {
            ActorLoop::new(collaborators, actor_registry, commands_rx).run().await;
        });

        ExternalMediaPlayer {
            commands: commands_tx,
            registry,
            config,
            lifecycle: Arc::new(Mutex::new(ComponentState::Created)),
        }
    }

    /// Shared with context providers (`SessionStateProvider`,
    /// `PlaybackStateProvider`) so they can read authorization state
    /// without going through the command channel.
    pub fn registry(&self) -> Arc<AuthorizedAdapters> {
        self.registry.clone()
    }

    /// Shared with `SessionStateProvider` so it can report `agent`/
    /// `spiVersion` without each context provider needing its own copy.
    pub fn config(&self) -> Arc<VoiceAssistantConfig> {
        self.config.clone()
    }

    pub fn register_adapter_handler(&self, handler: Arc<dyn ExternalMediaAdapterHandler>) {
        self.registry.register_handler(handler);
    }

    /// Called by an adapter handler whenever it finds new local players
    /// (or re-announces existing ones). Not a directive — this is the
    /// device-to-core discovery path (§4.3 "Discovery").
    pub fn update_discovered_players(&self, handler: Arc<dyn ExternalMediaAdapterHandler>, players: Vec<PlayerInfo>) {
        let _ = self.commands.send(Command::DiscoveredPlayers { handler, players });
    }

    /// Flips discovery from "queued" to "live": any players discovered
    /// before this point are reported in one batch; anything after is
    /// reported as it arrives.
    pub async fn startup(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Startup { reply: reply_tx }).is_ok() {
            let _ = reply_rx.await;
        }
    }

    pub async fn shutdown(&self) {
        *self.lifecycle.lock() = ComponentState::ShuttingDown;
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply: reply_tx }).is_ok() {
            let _ = reply_rx.await;
        }
        *self.lifecycle.lock() = ComponentState::ShutDown;
    }

    /// Routes a local (non-directive) playback request to whichever
    /// player currently holds focus, e.g. a device-side "stop" button
    /// press rather than a cloud `PlaybackController` directive (§4.3
    /// "Local operations").
    pub async fn local_operation(&self, op: LocalOperation) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::LocalOperation { op, reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    /// Local counterpart to the `SeekController` directives: seeks the
    /// focused player to `location_ms`, either as an absolute position
    /// measured from the start of the track (`from_start = true`) or as
    /// a delta from the current position, matching the two directive
    /// variants it shares a `RequestType`/handler path with (§11).
    pub async fn local_seek_to(&self, location_ms: i64, from_start: bool) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::LocalSeekTo {
                location_ms,
                from_start,
                reply: reply_tx,
            })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }
}

#[async_trait]
impl Component for ExternalMediaPlayer {
    fn name(&self) -> &str {
        "external-media-player"
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
        ExternalMediaPlayer::shutdown(self).await;
    }
}

#[async_trait]
impl DirectiveHandler for ExternalMediaPlayer {
    fn configuration(&self) -> HandlerConfiguration {
        let mut config = HandlerConfiguration::new();

        let audio_nonblocking = BlockingPolicy::new(Medium::Audio, false);
        let dimensionless_nonblocking = BlockingPolicy::new(Medium::None, false);

        for name in ["Play", "Login", "Logout"] {
            config.insert(NamespaceAndName::new(NAMESPACE_EMP, name), audio_nonblocking);
        }
        config.insert(
            NamespaceAndName::new(NAMESPACE_EMP, "AuthorizeDiscoveredPlayers"),
            dimensionless_nonblocking,
        );
        for name in ["Play", "Pause", "Stop", "Next", "Previous", "StartOver", "Rewind", "FastForward"] {
            config.insert(NamespaceAndName::new(NAMESPACE_PLAYBACK_CONTROLLER, name), audio_nonblocking);
        }
        for name in ["EnableRepeatOne", "EnableRepeat", "DisableRepeat", "EnableShuffle", "DisableShuffle"] {
            config.insert(NamespaceAndName::new(NAMESPACE_PLAYLIST_CONTROLLER, name), dimensionless_nonblocking);
        }
        for name in ["Favorite", "Unfavorite"] {
            config.insert(NamespaceAndName::new(NAMESPACE_FAVORITES_CONTROLLER, name), dimensionless_nonblocking);
        }
        for name in ["SetSeekPosition", "AdjustSeekPosition"] {
            config.insert(NamespaceAndName::new(NAMESPACE_SEEK_CONTROLLER, name), audio_nonblocking);
        }

        config
    }

    async fn handle_immediately(&self, directive: Directive) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::HandleImmediately { directive, reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    async fn pre_handle(&self, directive: Directive, result: Arc<dyn DirectiveHandlerResult>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::PreHandle { directive, result, reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    async fn handle(&self, message_id: &str) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Handle {
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
            .send(Command::Cancel {
                message_id: message_id.to_string(),
                reply: reply_tx,
            })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    async fn on_deregistered(&self) {
        self.shutdown().await;
    }
}

struct ActorLoop {
    collaborators: ExternalMediaPlayerCollaborators,
    registry: Arc<AuthorizedAdapters>,
    commands: mpsc::UnboundedReceiver<Command>,
    pending: HashMap<String, (Action, Arc<dyn DirectiveHandlerResult>)>,
}

impl ActorLoop {
    fn new(
        collaborators: ExternalMediaPlayerCollaborators,
        registry: Arc<AuthorizedAdapters>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        ActorLoop {
            collaborators,
            registry,
            commands,
            pending: HashMap::new(),
        }
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            if self.dispatch(command).await {
                break;
            }
        }
        info!("external media player dispatch loop exiting");
    }

    async fn dispatch(&mut self, command: Command) -> bool {
        match command {
            Command::PreHandle { directive, result, reply } => {
                let message_id = directive.message_id().to_string();
                let action = directive_parse::parse(&directive);
                self.pending.insert(message_id, (action, result));
                let _ = reply.send(());
            }
            Command::Handle { message_id, reply } => {
                let outcome = self.on_handle(&message_id).await;
                let _ = reply.send(outcome);
            }
            Command::Cancel { message_id, reply } => {
                if self.pending.remove(&message_id).is_some() {
                    debug!(message_id = %message_id, "cancelled EMP directive before handle");
                }
                let _ = reply.send(());
            }
            Command::HandleImmediately { directive, reply } => {
                let action = directive_parse::parse(&directive);
                self.execute_action(action).await;
                let _ = reply.send(());
            }
            Command::DiscoveredPlayers { handler, players } => {
                let fresh = self.registry.note_discovered(handler, players);
                if !fresh.is_empty() {
                    self.emit_report_discovered_players(fresh).await;
                }
            }
            Command::Startup { reply } => {
                let fresh = self.registry.start();
                if !fresh.is_empty() {
                    self.emit_report_discovered_players(fresh).await;
                }
                let _ = reply.send(());
            }
            Command::LocalOperation { op, reply } => {
                match self.registry.focused() {
                    Some(entry) => entry.handler.play_control(&entry.local_player_id, op.as_request_type()).await,
                    None => self.report_no_player_in_focus().await,
                }
                let _ = reply.send(());
            }
            Command::LocalSeekTo { location_ms, from_start, reply } => {
                match self.registry.focused() {
                    Some(entry) => {
                        if from_start {
                            entry.handler.set_seek_position(&entry.local_player_id, location_ms).await;
                        } else {
                            entry.handler.adjust_seek_position(&entry.local_player_id, location_ms).await;
                        }
                    }
                    None => self.report_no_player_in_focus().await,
                }
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                self.pending.clear();
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    async fn on_handle(&mut self, message_id: &str) -> bool {
        let Some((action, result)) = self.pending.remove(message_id) else {
            warn!(message_id = %message_id, "handle called with no matching preHandle, ignoring");
            return false;
        };
        self.execute_action(action).await;
        result.set_completed().await;
        true
    }

    async fn execute_action(&mut self, action: Action) {
        match action {
            Action::Play(play) => match self.registry.lookup(&play.player_id) {
                Some(entry) => {
                    self.registry.set_focus(Some(entry.player_id.clone()));
                    let params = PlayParams {
                        player_id: play.player_id,
                        playback_context_token: play.playback_context_token,
                        index: play.index,
                        offset_ms: play.offset_ms,
                        skill_token: play.skill_token,
                        playback_session_id: play.playback_session_id,
                        navigation: play.navigation,
                        preload: play.preload,
                        play_requestor: play.play_requestor,
                        alias_name: play.alias_name,
                    };
                    entry.handler.play(&entry.local_player_id, params).await;
                }
                None => self.report_unauthorized(&play.player_id).await,
            },
            Action::Login { player_id, access_token, user_name } => match self.registry.lookup(&player_id) {
                Some(entry) => entry.handler.login(&entry.local_player_id, access_token, user_name).await,
                None => self.report_unauthorized(&player_id).await,
            },
            Action::Logout { player_id } => match self.registry.lookup(&player_id) {
                Some(entry) => entry.handler.logout(&entry.local_player_id).await,
                None => self.report_unauthorized(&player_id).await,
            },
            Action::FocusedPlayerControl(request) => match self.registry.focused() {
                Some(entry) => entry.handler.play_control(&entry.local_player_id, request).await,
                None => self.report_no_player_in_focus().await,
            },
            Action::SetSeekPosition { position_ms } => match self.registry.focused() {
                Some(entry) => entry.handler.set_seek_position(&entry.local_player_id, position_ms).await,
                None => self.report_no_player_in_focus().await,
            },
            Action::AdjustSeekPosition { delta_ms } => match self.registry.focused() {
                Some(entry) => entry.handler.adjust_seek_position(&entry.local_player_id, delta_ms).await,
                None => self.report_no_player_in_focus().await,
            },
            Action::AuthorizeDiscoveredPlayers(entries) => {
                let mut outcome = self.registry.authorize(entries);
                self.collaborators
                    .message_sender
                    .set_allowed_players(self.registry.authorized_player_ids());
                let updates = std::mem::take(&mut outcome.updates);
                self.forward_player_info_updates(updates).await;
                self.emit_authorization_complete(outcome).await;
            }
            Action::Invalid { reason } => {
                self.collaborators
                    .exception_sender
                    .send_exception_encountered(String::new(), ExceptionErrorKind::UnexpectedInformationReceived, reason)
                    .await;
            }
        }
    }

    async fn report_unauthorized(&self, player_id: &str) {
        let reason = EmpError::UnauthorizedPlayer {
            player_id: player_id.to_string(),
        }
        .to_string();
        self.collaborators
            .exception_sender
            .send_exception_encountered(String::new(), ExceptionErrorKind::UnexpectedInformationReceived, reason)
            .await;
    }

    async fn report_no_player_in_focus(&self) {
        self.collaborators
            .exception_sender
            .send_exception_encountered(
                String::new(),
                ExceptionErrorKind::UnexpectedInformationReceived,
                "no player is currently in focus".to_string(),
            )
            .await;
    }

    /// §4.3 Authorization step 1: "forwards `{playerId, skillToken}` to
    /// the adapter handler's `updatePlayerInfo`." Entries are grouped by
    /// owning handler (one handler may own several newly authorized local
    /// players) so each handler sees one batched call, the same
    /// `Arc::ptr_eq` dedup `context.rs`'s `collect_authorized_states` uses.
    async fn forward_player_info_updates(&self, updates: Vec<(Arc<dyn ExternalMediaAdapterHandler>, PlayerInfo)>) {
        let mut grouped: Vec<(Arc<dyn ExternalMediaAdapterHandler>, Vec<PlayerInfo>)> = Vec::new();
        for (handler, info) in updates {
            if let Some((_, infos)) = grouped.iter_mut().find(|(h, _)| Arc::ptr_eq(h, &handler)) {
                infos.push(info);
            } else {
                grouped.push((handler, vec![info]));
            }
        }
        for (handler, infos) in grouped {
            handler.update_player_info(infos).await;
        }
    }

    async fn emit_authorization_complete(&self, outcome: crate::registry::AuthorizeOutcome) {
        let authorized: Vec<_> = outcome
            .authorized
            .into_iter()
            .map(|(player_id, skill_token)| json!({ "playerId": player_id, "skillToken": skill_token }))
            .collect();
        let deauthorized: Vec<_> = outcome
            .deauthorized
            .into_iter()
            .map(|local_player_id| json!({ "localPlayerId": local_player_id }))
            .collect();

        let event = OutboundEvent::new(
            NAMESPACE_EMP,
            EVENT_AUTHORIZATION_COMPLETE,
            json!({ "authorized": authorized, "deauthorized": deauthorized }),
        );
        self.collaborators.message_sender.send_event(event).await;
    }

    async fn emit_report_discovered_players(&self, players: Vec<PlayerInfo>) {
        let payload = json!({ "players": players });
        let event = OutboundEvent::new(NAMESPACE_EMP, EVENT_REPORT_DISCOVERED_PLAYERS, payload);
        self.collaborators.guaranteed_sender.send_guaranteed(event).await;
    }
}
