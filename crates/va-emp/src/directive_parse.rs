//! Parses the (namespace, name) directive table (§4.3) into an internal
//! [`Action`]. Kept separate from `emp.rs` so the parsing rules — which
//! fields are required, which namespaces carry which `RequestType` — read
//! as a single table rather than being interleaved with execution.

use va_directive::Directive;

use crate::player::RequestType;

pub const NAMESPACE_EMP: &str = "ExternalMediaPlayer";
pub const NAMESPACE_PLAYBACK_CONTROLLER: &str = "PlaybackController";
pub const NAMESPACE_PLAYLIST_CONTROLLER: &str = "PlaylistController";
pub const NAMESPACE_SEEK_CONTROLLER: &str = "SeekController";
pub const NAMESPACE_FAVORITES_CONTROLLER: &str = "FavoritesController";

/// ±12 hours, the clamp `AdjustSeekPosition` is rejected outside of.
pub const MAX_SEEK_DELTA_MS: i64 = 12 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct AuthorizeEntry {
    pub local_player_id: String,
    pub authorized: bool,
    pub player_id: Option<String>,
    pub skill_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlayAction {
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

#[derive(Debug, Clone)]
pub enum Action {
    Play(PlayAction),
    Login {
        player_id: String,
        access_token: Option<String>,
        user_name: Option<String>,
    },
    Logout {
        player_id: String,
    },
    AuthorizeDiscoveredPlayers(Vec<AuthorizeEntry>),
    /// `PlaybackController`/`PlaylistController`/`FavoritesController`
    /// directives target whichever player currently holds focus — they
    /// carry no `playerId` of their own (§4.3 "Local operations" reuses
    /// the same player-in-focus routing).
    FocusedPlayerControl(RequestType),
    SetSeekPosition {
        position_ms: i64,
    },
    AdjustSeekPosition {
        delta_ms: i64,
    },
    /// Parsing failed; `reason` becomes the `ExceptionEncountered`
    /// description.
    Invalid {
        reason: String,
    },
}

fn playback_control_request_type(name: &str) -> Option<RequestType> {
    match name {
        "Play" => Some(RequestType::Play),
        "Pause" => Some(RequestType::Pause),
        "Stop" => Some(RequestType::Stop),
        "Next" => Some(RequestType::Next),
        "Previous" => Some(RequestType::Previous),
        "StartOver" => Some(RequestType::StartOver),
        "Rewind" => Some(RequestType::Rewind),
        "FastForward" => Some(RequestType::FastForward),
        _ => None,
    }
}

fn playlist_control_request_type(name: &str) -> Option<RequestType> {
    match name {
        "EnableRepeatOne" => Some(RequestType::EnableRepeatOne),
        "EnableRepeat" => Some(RequestType::EnableRepeat),
        "DisableRepeat" => Some(RequestType::DisableRepeat),
        "EnableShuffle" => Some(RequestType::EnableShuffle),
        "DisableShuffle" => Some(RequestType::DisableShuffle),
        _ => None,
    }
}

fn favorites_request_type(name: &str) -> Option<RequestType> {
    match name {
        "Favorite" => Some(RequestType::Favorite),
        "Unfavorite" => Some(RequestType::Unfavorite),
        _ => None,
    }
}

pub fn parse(directive: &Directive) -> Action {
    match (directive.namespace(), directive.name()) {
        (NAMESPACE_EMP, "Play") => parse_play(directive),
        (NAMESPACE_EMP, "Login") => parse_login(directive),
        (NAMESPACE_EMP, "Logout") => parse_logout(directive),
        (NAMESPACE_EMP, "AuthorizeDiscoveredPlayers") => parse_authorize(directive),
        (NAMESPACE_PLAYBACK_CONTROLLER, name) => match playback_control_request_type(name) {
            Some(request) => Action::FocusedPlayerControl(request),
            None => Action::Invalid {
                reason: format!("unrecognized PlaybackController directive {name}"),
            },
        },
        (NAMESPACE_PLAYLIST_CONTROLLER, name) => match playlist_control_request_type(name) {
            Some(request) => Action::FocusedPlayerControl(request),
            None => Action::Invalid {
                reason: format!("unrecognized PlaylistController directive {name}"),
            },
        },
        (NAMESPACE_FAVORITES_CONTROLLER, name) => match favorites_request_type(name) {
            Some(request) => Action::FocusedPlayerControl(request),
            None => Action::Invalid {
                reason: format!("unrecognized FavoritesController directive {name}"),
            },
        },
        (NAMESPACE_SEEK_CONTROLLER, "SetSeekPosition") => match directive.lookup_i64("positionMilliseconds") {
            Some(position_ms) => Action::SetSeekPosition { position_ms },
            None => Action::Invalid {
                reason: "SetSeekPosition missing positionMilliseconds".to_string(),
            },
        },
        (NAMESPACE_SEEK_CONTROLLER, "AdjustSeekPosition") => {
            match directive.lookup_i64("deltaPositionMilliseconds") {
                Some(delta_ms) if delta_ms.abs() <= MAX_SEEK_DELTA_MS => {
                    Action::AdjustSeekPosition { delta_ms }
                }
                Some(delta_ms) => Action::Invalid {
                    reason: format!("deltaPositionMilliseconds {delta_ms} exceeds +/-12h"),
                },
                None => Action::Invalid {
                    reason: "AdjustSeekPosition missing deltaPositionMilliseconds".to_string(),
                },
            }
        }
        (namespace, name) => Action::Invalid {
            reason: format!("unrecognized directive ({namespace}, {name})"),
        },
    }
}

fn parse_play(directive: &Directive) -> Action {
    let player_id = directive.lookup_string("playerId");
    let playback_context_token = directive.lookup_string("playbackContextToken");
    let skill_token = directive.lookup_string("skillToken");
    let playback_session_id = directive.lookup_string("playbackSessionId");
    let navigation = directive.lookup_string("navigation");
    let offset_ms = directive.lookup_i64("offsetInMilliseconds");
    let preload = directive.lookup_bool("preload");

    match (
        player_id,
        playback_context_token,
        skill_token,
        playback_session_id,
        navigation,
        offset_ms,
        preload,
    ) {
        (
            Some(player_id),
            Some(playback_context_token),
            Some(skill_token),
            Some(playback_session_id),
            Some(navigation),
            Some(offset_ms),
            Some(preload),
        ) => Action::Play(PlayAction {
            player_id,
            playback_context_token,
            index: directive.lookup_i64("index"),
            offset_ms,
            skill_token,
            playback_session_id,
            navigation,
            preload,
            play_requestor: directive.lookup_string("playRequestor"),
            alias_name: directive.lookup_string("aliasName"),
        }),
        _ => Action::Invalid {
            reason: "Play directive missing one or more required fields".to_string(),
        },
    }
}

fn parse_login(directive: &Directive) -> Action {
    match directive.lookup_string("playerId") {
        Some(player_id) => Action::Login {
            player_id,
            access_token: directive.lookup_string("accessToken"),
            user_name: directive.lookup_string("userName"),
        },
        None => Action::Invalid {
            reason: "Login directive missing playerId".to_string(),
        },
    }
}

fn parse_logout(directive: &Directive) -> Action {
    match directive.lookup_string("playerId") {
        Some(player_id) => Action::Logout { player_id },
        None => Action::Invalid {
            reason: "Logout directive missing playerId".to_string(),
        },
    }
}

fn parse_authorize(directive: &Directive) -> Action {
    let Some(players) = directive.payload().get("players").and_then(|v| v.as_array()) else {
        return Action::Invalid {
            reason: "AuthorizeDiscoveredPlayers missing players array".to_string(),
        };
    };

    let mut entries = Vec::with_capacity(players.len());
    for entry in players {
        let Some(local_player_id) = entry.get("localPlayerId").and_then(|v| v.as_str()) else {
            return Action::Invalid {
                reason: "AuthorizeDiscoveredPlayers entry missing localPlayerId".to_string(),
            };
        };
        let authorized = entry.get("authorized").and_then(|v| v.as_bool()).unwrap_or(false);
        let metadata = entry.get("metadata");
        let player_id = metadata
            .and_then(|m| m.get("playerId"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let skill_token = metadata
            .and_then(|m| m.get("skillToken"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        entries.push(AuthorizeEntry {
            local_player_id: local_player_id.to_string(),
            authorized,
            player_id,
            skill_token,
        });
    }

    Action::AuthorizeDiscoveredPlayers(entries)
}
