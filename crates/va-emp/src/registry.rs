//! The authorized-adapters registry (§4.3 "Discovery", "Authorization").
//!
//! Tracks three things the EMP's directive routing depends on: which
//! `playerId` the cloud has authorized and which handler/local id it maps
//! to, which local players have already been reported via
//! `ReportDiscoveredPlayers` (so a handler re-announcing the same player
//! doesn't double-report — §8 Testable Property 7), and which player
//! currently holds focus for `PlaybackController`-style directives.
//!
//! A plain `parking_lot::Mutex` is enough here: every read and write
//! happens from within the EMP's own single dispatch path (§5
//! "Shared-resource policy"), so there's no cross-executor contention to
//! shard away from — unlike [`crate::authorized_sender::AuthorizedSender`],
//! whose allow-list is read from an adapter's own send path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::adapter::ExternalMediaAdapterHandler;
use crate::directive_parse::AuthorizeEntry;
use crate::player::PlayerInfo;

/// One authorized player: the cloud-assigned `playerId`, the local id the
/// owning handler knows it by, and the handler itself.
#[derive(Clone)]
pub struct AuthorizedEntry {
    pub player_id: String,
    pub local_player_id: String,
    pub handler: Arc<dyn ExternalMediaAdapterHandler>,
}

/// What `authorize` did, so the caller can emit `AuthorizationComplete`
/// and refresh the authorized-sender allow-list.
#[derive(Default)]
pub struct AuthorizeOutcome {
    pub authorized: Vec<(String, Option<String>)>, // (playerId, skillToken)
    pub deauthorized: Vec<String>,                  // localPlayerId
    /// Per-entry `{playerId, skillToken}` grant to forward to the owning
    /// handler's `update_player_info` (§4.3 Authorization step 1), paired
    /// with the handler that owns the `localPlayerId`.
    pub updates: Vec<(Arc<dyn ExternalMediaAdapterHandler>, PlayerInfo)>,
}

#[derive(Default)]
struct Inner {
    by_player_id: HashMap<String, AuthorizedEntry>,
    /// Every local player any handler has ever announced via discovery,
    /// and who owns it — populated before authorization so
    /// `AuthorizeDiscoveredPlayers` knows which handler to hand the grant
    /// to.
    local_player_owner: HashMap<String, Arc<dyn ExternalMediaAdapterHandler>>,
    reported: HashSet<String>,
    pending_discovery: Vec<PlayerInfo>,
    started: bool,
    player_in_focus: Option<String>,
    handlers: Vec<Arc<dyn ExternalMediaAdapterHandler>>,
}

#[derive(Default)]
pub struct AuthorizedAdapters {
    inner: parking_lot::Mutex<Inner>,
}

impl AuthorizedAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(&self, handler: Arc<dyn ExternalMediaAdapterHandler>) {
        self.inner.lock().handlers.push(handler);
    }

    pub fn handlers(&self) -> Vec<Arc<dyn ExternalMediaAdapterHandler>> {
        self.inner.lock().handlers.clone()
    }

    /// A handler has announced (or re-announced) a batch of local players.
    /// Returns the subset that should be reported to the cloud right now —
    /// empty if discovery hasn't started yet (queued instead) or every
    /// entry was already reported.
    pub fn note_discovered(
        &self,
        handler: Arc<dyn ExternalMediaAdapterHandler>,
        players: Vec<PlayerInfo>,
    ) -> Vec<PlayerInfo> {
        let mut inner = self.inner.lock();
        let mut fresh = Vec::new();
        for player in players {
            inner
                .local_player_owner
                .insert(player.local_player_id.clone(), handler.clone());

            if !inner.started {
                inner.pending_discovery.push(player);
                continue;
            }
            if inner.reported.insert(player.local_player_id.clone()) {
                fresh.push(player);
            } else {
                debug!(local_player_id = %fresh_id(&player), "discovery re-announced an already-reported player, skipping");
            }
        }
        fresh
    }

    /// First transition to "started". Returns every queued discovery entry
    /// (deduplicated against anything already reported), to be sent in one
    /// `ReportDiscoveredPlayers` event.
    pub fn start(&self) -> Vec<PlayerInfo> {
        let mut inner = self.inner.lock();
        if inner.started {
            return Vec::new();
        }
        inner.started = true;
        let pending = std::mem::take(&mut inner.pending_discovery);
        let mut fresh = Vec::new();
        for player in pending {
            if inner.reported.insert(player.local_player_id.clone()) {
                fresh.push(player);
            }
        }
        fresh
    }

    /// Applies an `AuthorizeDiscoveredPlayers` batch. Entries naming a
    /// local player no handler has ever discovered are skipped with a
    /// debug log (§4.3 "Multiple adapter handlers" — unrecognized entries
    /// are dropped, not errors).
    pub fn authorize(&self, entries: Vec<AuthorizeEntry>) -> AuthorizeOutcome {
        let mut inner = self.inner.lock();
        let mut outcome = AuthorizeOutcome::default();

        for entry in entries {
            if entry.authorized {
                let Some(handler) = inner.local_player_owner.get(&entry.local_player_id).cloned() else {
                    debug!(local_player_id = %entry.local_player_id, "authorize: no handler has discovered this local player, skipping");
                    continue;
                };
                let Some(player_id) = entry.player_id.clone() else {
                    debug!(local_player_id = %entry.local_player_id, "authorize: missing playerId in metadata, skipping");
                    continue;
                };
                inner.by_player_id.insert(
                    player_id.clone(),
                    AuthorizedEntry {
                        player_id: player_id.clone(),
                        local_player_id: entry.local_player_id.clone(),
                        handler: handler.clone(),
                    },
                );
                outcome.updates.push((
                    handler,
                    PlayerInfo {
                        local_player_id: entry.local_player_id.clone(),
                        spi_version: String::new(),
                        player_id: Some(player_id.clone()),
                        skill_token: entry.skill_token.clone(),
                        playback_session_id: None,
                        player_supported: true,
                    },
                ));
                outcome.authorized.push((player_id, entry.skill_token.clone()));
            } else {
                let removed_player_id = inner
                    .by_player_id
                    .iter()
                    .find(|(_, v)| v.local_player_id == entry.local_player_id)
                    .map(|(k, _)| k.clone());
                if let Some(player_id) = removed_player_id {
                    inner.by_player_id.remove(&player_id);
                    if inner.player_in_focus.as_deref() == Some(player_id.as_str()) {
                        inner.player_in_focus = None;
                    }
                }
                outcome.deauthorized.push(entry.local_player_id.clone());
            }
        }

        outcome
    }

    pub fn lookup(&self, player_id: &str) -> Option<AuthorizedEntry> {
        self.inner.lock().by_player_id.get(player_id).cloned()
    }

    pub fn set_focus(&self, player_id: Option<String>) {
        self.inner.lock().player_in_focus = player_id;
    }

    pub fn focused(&self) -> Option<AuthorizedEntry> {
        let inner = self.inner.lock();
        let player_id = inner.player_in_focus.as_ref()?;
        inner.by_player_id.get(player_id).cloned()
    }

    /// The cloud-assigned `playerId` currently in focus, if any — reported
    /// as SessionState's top-level `playerInFocus` field (§4.3).
    pub fn player_in_focus(&self) -> Option<String> {
        self.inner.lock().player_in_focus.clone()
    }

    pub fn authorized_player_ids(&self) -> Vec<String> {
        self.inner.lock().by_player_id.keys().cloned().collect()
    }

    pub fn all_authorized(&self) -> Vec<AuthorizedEntry> {
        self.inner.lock().by_player_id.values().cloned().collect()
    }
}

fn fresh_id(player: &PlayerInfo) -> &str {
    &player.local_player_id
}
