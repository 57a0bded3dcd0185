//! Per-player data model (§3, §4.3).

use serde::{Deserialize, Serialize};

/// A player entry as offered by `AuthorizeDiscoveredPlayers`/discovery.
/// `localPlayerId` is identity on the device side; `playerId` is identity
/// on the cloud side — the two are never interchangeable. Field names
/// follow the wire representation directly (`rename_all = "camelCase"`)
/// since this struct doubles as the `ReportDiscoveredPlayers` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub local_player_id: String,
    pub spi_version: String,
    /// Absent until the cloud has authorized this player (it assigns the
    /// cloud-side id at that point).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_session_id: Option<String>,
    /// `false` means deauthorized.
    pub player_supported: bool,
}

/// Playback/session request kinds, shared between PlaybackController-style
/// directives and the EMP's `localOperation`/`localSeekTo` hooks
/// (§11 "RequestType enumeration is shared").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    StartOver,
    Rewind,
    FastForward,
    EnableRepeatOne,
    EnableRepeat,
    DisableRepeat,
    EnableShuffle,
    DisableShuffle,
    Favorite,
    Unfavorite,
    /// `localOperation` hook variants (§4.3 "Local operations").
    StopPlayback,
    ResumableStop,
    TransientPause,
    ResumePlayback,
}

/// The subset of [`RequestType`] reachable through the `localOperation`
/// hook, kept as its own enum so callers can't pass a cloud-directive
/// variant (e.g. `Favorite`) into a call meant for a local, non-directive
/// caller (§4.3 "Local operations").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOperation {
    StopPlayback,
    ResumableStop,
    TransientPause,
    ResumePlayback,
}

impl LocalOperation {
    pub fn as_request_type(self) -> RequestType {
        match self {
            LocalOperation::StopPlayback => RequestType::StopPlayback,
            LocalOperation::ResumableStop => RequestType::ResumableStop,
            LocalOperation::TransientPause => RequestType::TransientPause,
            LocalOperation::ResumePlayback => RequestType::ResumePlayback,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackActivity {
    Idle,
    Playing,
    Paused,
    Stopped,
    Finished,
}

impl PlaybackActivity {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            PlaybackActivity::Idle => "IDLE",
            PlaybackActivity::Playing => "PLAYING",
            PlaybackActivity::Paused => "PAUSED",
            PlaybackActivity::Stopped => "STOPPED",
            PlaybackActivity::Finished => "FINISHED",
        }
    }
}

/// Session-side snapshot of one authorized player.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub player_id: String,
    pub logged_in: bool,
    pub user_name: Option<String>,
    pub spi_version: String,
    pub skill_token: Option<String>,
    pub playback_session_id: Option<String>,
}

/// Playback-side snapshot of one authorized player.
#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub player_id: String,
    pub state: PlaybackActivity,
    pub track_name: Option<String>,
    pub duration_ms: Option<i64>,
    pub track_offset_ms: Option<i64>,
    pub play_requestor: Option<String>,
    pub supported_operations: Vec<RequestType>,
}

/// What an adapter handler returns when asked for its current state
/// (§4.3 "Context provision").
#[derive(Debug, Clone)]
pub struct AdapterState {
    pub session_state: SessionState,
    pub playback_state: PlaybackState,
}
