//! `SessionState`/`PlaybackState` context providers (§4.3 "Context
//! provision"). Both aggregate every authorized player's adapter-reported
//! state into one array, filtered to currently-authorized `playerId`s only
//! — a player an adapter still tracks internally but the cloud has
//! deauthorized never appears in context (§11 "Context filters to
//! authorized players").

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use va_infra::config::VoiceAssistantConfig;
use va_infra::context::ContextProvider;
use va_infra::errors::InfraResult;

use crate::player::{AdapterState, RequestType};
use crate::registry::AuthorizedAdapters;

pub const NAMESPACE_SESSION_STATE: &str = "SessionState";
pub const NAMESPACE_PLAYBACK_STATE: &str = "PlaybackState";

fn request_type_wire(request: RequestType) -> &'static str {
    match request {
        RequestType::Play => "PLAY",
        RequestType::Pause => "PAUSE",
        RequestType::Stop => "STOP",
        RequestType::Next => "NEXT",
        RequestType::Previous => "PREVIOUS",
        RequestType::StartOver => "START_OVER",
        RequestType::Rewind => "REWIND",
        RequestType::FastForward => "FAST_FORWARD",
        RequestType::EnableRepeatOne => "ENABLE_REPEAT_ONE",
        RequestType::EnableRepeat => "ENABLE_REPEAT",
        RequestType::DisableRepeat => "DISABLE_REPEAT",
        RequestType::EnableShuffle => "ENABLE_SHUFFLE",
        RequestType::DisableShuffle => "DISABLE_SHUFFLE",
        RequestType::Favorite => "FAVORITE",
        RequestType::Unfavorite => "UNFAVORITE",
        RequestType::StopPlayback => "STOP_PLAYBACK",
        RequestType::ResumableStop => "RESUMABLE_STOP",
        RequestType::TransientPause => "TRANSIENT_PAUSE",
        RequestType::ResumePlayback => "RESUME_PLAYBACK",
    }
}

/// Collects every authorized player's current `AdapterState`, deduplicated
/// and filtered to the authorization set, in one pass. Both providers below
/// share this instead of each re-querying every handler independently.
async fn collect_authorized_states(registry: &AuthorizedAdapters) -> Vec<AdapterState> {
    let authorized_ids: HashSet<String> = registry.authorized_player_ids().into_iter().collect();
    if authorized_ids.is_empty() {
        return Vec::new();
    }

    let mut seen_handlers = Vec::new();
    let mut handlers = Vec::new();
    for entry in registry.all_authorized() {
        if seen_handlers.iter().any(|h: &Arc<dyn crate::adapter::ExternalMediaAdapterHandler>| Arc::ptr_eq(h, &entry.handler)) {
            continue;
        }
        seen_handlers.push(entry.handler.clone());
        handlers.push(entry.handler);
    }

    let mut states = Vec::new();
    for handler in handlers {
        for state in handler.get_adapter_states().await {
            if authorized_ids.contains(&state.session_state.player_id) {
                states.push(state);
            }
        }
    }
    states
}

pub struct SessionStateProvider {
    registry: Arc<AuthorizedAdapters>,
    config: Arc<VoiceAssistantConfig>,
}

impl SessionStateProvider {
    pub fn new(registry: Arc<AuthorizedAdapters>, config: Arc<VoiceAssistantConfig>) -> Self {
        SessionStateProvider { registry, config }
    }
}

#[async_trait]
impl ContextProvider for SessionStateProvider {
    fn namespace(&self) -> &'static str {
        NAMESPACE_SESSION_STATE
    }

    async fn provide_state(&self) -> InfraResult<Value> {
        let states = collect_authorized_states(&self.registry).await;
        let players: Vec<Value> = states
            .into_iter()
            .map(|state| {
                let session = state.session_state;
                json!({
                    "playerId": session.player_id,
                    "loggedIn": session.logged_in,
                    "userName": session.user_name,
                    "spiVersion": session.spi_version,
                    "skillToken": session.skill_token,
                    "playbackSessionId": session.playback_session_id,
                })
            })
            .collect();
        Ok(json!({
            "agent": self.config.agent(),
            "spiVersion": self.config.spi_version(),
            "playerInFocus": self.registry.player_in_focus(),
            "players": players,
        }))
    }
}

pub struct PlaybackStateProvider {
    registry: Arc<AuthorizedAdapters>,
}

impl PlaybackStateProvider {
    pub fn new(registry: Arc<AuthorizedAdapters>) -> Self {
        PlaybackStateProvider { registry }
    }
}

#[async_trait]
impl ContextProvider for PlaybackStateProvider {
    fn namespace(&self) -> &'static str {
        NAMESPACE_PLAYBACK_STATE
    }

    async fn provide_state(&self) -> InfraResult<Value> {
        let states = collect_authorized_states(&self.registry).await;
        let players: Vec<Value> = states
            .into_iter()
            .map(|state| {
                let playback = state.playback_state;
                json!({
                    "playerId": playback.player_id,
                    "state": playback.state.as_wire_str(),
                    "trackName": playback.track_name,
                    "duration": playback.duration_ms,
                    "trackOffset": playback.track_offset_ms,
                    "playRequestor": playback.play_requestor,
                    "supportedOperations": playback.supported_operations.into_iter().map(request_type_wire).collect::<Vec<_>>(),
                })
            })
            .collect();
        Ok(json!({ "players": players }))
    }
}
