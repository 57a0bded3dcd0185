//! The contract a third-party media adapter implements to plug into the
//! EMP (§4.3). Mirrors the original SDK's
//! `ExternalMediaAdapterHandlerInterface`, generalized to let one handler
//! own any subset of local players (§11 "Multiple adapter handlers").

use async_trait::async_trait;

use crate::player::{AdapterState, PlayerInfo, RequestType};

/// Parameters for a `Play` directive, passed through to the owning
/// adapter opaquely where the EMP itself has no use for a field.
#[derive(Debug, Clone)]
pub struct PlayParams {
    pub player_id: String,
    pub playback_context_token: String,
    pub index: Option<i64>,
    pub offset_ms: i64,
    pub skill_token: String,
    pub playback_session_id: String,
    pub navigation: String,
    pub preload: bool,
    pub play_requestor: Option<String>,
    pub alias_name: Option<String>,
}

/// One or more local media players register through a handler
/// implementing this trait.
#[async_trait]
pub trait ExternalMediaAdapterHandler: Send + Sync {
    /// Begin playback on `local_player_id`.
    async fn play(&self, local_player_id: &str, params: PlayParams);

    async fn login(&self, local_player_id: &str, access_token: Option<String>, user_name: Option<String>);

    async fn logout(&self, local_player_id: &str);

    /// Playback/session control, shared with `local_operation`/
    /// `local_seek_to` (§11).
    async fn play_control(&self, local_player_id: &str, request: RequestType);

    /// Absolute seek to `position_ms`.
    async fn set_seek_position(&self, local_player_id: &str, position_ms: i64);

    /// Relative seek by `delta_ms`, already validated to be within range.
    async fn adjust_seek_position(&self, local_player_id: &str, delta_ms: i64);

    /// Offers newly authorized/updated player metadata to this handler.
    /// Returns the subset of `local_player_id`s from `offered` that this
    /// handler actually owns and applied — entries no handler recognizes
    /// are dropped by the EMP with a debug log, not an error (§4.3
    /// "Multiple adapter handlers").
    async fn update_player_info(&self, offered: Vec<PlayerInfo>) -> Vec<String>;

    /// Current state of every player this handler owns, used to build
    /// SessionState/PlaybackState context (§4.3 "Context provision").
    async fn get_adapter_states(&self) -> Vec<AdapterState>;
}
