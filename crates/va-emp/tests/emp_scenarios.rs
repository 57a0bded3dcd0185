//! Scenario tests for the External Media Player capability agent
//! (§8 Scenario S5 "authorize then play", S6 "unauthorized play").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use va_directive::{Directive, DirectiveHandler, DirectiveHandlerResult};
use va_emp::{
    AdapterState, ExternalMediaAdapterHandler, ExternalMediaPlayer,
    ExternalMediaPlayerCollaborators, PlayParams, PlayerInfo, RequestType,
};
use va_infra::config::VoiceAssistantConfig;
use va_infra::events::{GuaranteedMessageSender, MessageSender, OutboundEvent, SendStatus};
use va_infra::exception::{ExceptionErrorKind, ExceptionSender};

#[derive(Default)]
struct RecordingAdapter {
    played: Mutex<Vec<(String, PlayParams)>>,
    controlled: Mutex<Vec<(String, RequestType)>>,
    player_info_updates: Mutex<Vec<PlayerInfo>>,
}

#[async_trait]
impl ExternalMediaAdapterHandler for RecordingAdapter {
    async fn play(&self, local_player_id: &str, params: PlayParams) {
        self.played.lock().await.push((local_player_id.to_string(), params));
    }

    async fn login(&self, _local_player_id: &str, _access_token: Option<String>, _user_name: Option<String>) {}

    async fn logout(&self, _local_player_id: &str) {}

    async fn play_control(&self, local_player_id: &str, request: RequestType) {
        self.controlled.lock().await.push((local_player_id.to_string(), request));
    }

    async fn set_seek_position(&self, _local_player_id: &str, _position_ms: i64) {}

    async fn adjust_seek_position(&self, _local_player_id: &str, _delta_ms: i64) {}

    async fn update_player_info(&self, offered: Vec<PlayerInfo>) -> Vec<String> {
        let ids = offered.iter().map(|p| p.local_player_id.clone()).collect();
        self.player_info_updates.lock().await.extend(offered);
        ids
    }

    async fn get_adapter_states(&self) -> Vec<AdapterState> {
        Vec::new()
    }
}

#[derive(Default)]
struct RecordingSender {
    events: Mutex<Vec<OutboundEvent>>,
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_event(&self, event: OutboundEvent) -> SendStatus {
        self.events.lock().await.push(event);
        SendStatus::Success
    }
}

#[async_trait]
impl GuaranteedMessageSender for RecordingSender {
    async fn send_guaranteed(&self, event: OutboundEvent) -> SendStatus {
        self.events.lock().await.push(event);
        SendStatus::Success
    }
}

#[derive(Default)]
struct RecordingExceptionSender {
    exceptions: Mutex<Vec<(ExceptionErrorKind, String)>>,
}

#[async_trait]
impl ExceptionSender for RecordingExceptionSender {
    async fn send_exception_encountered(&self, _unparsed_directive: String, kind: ExceptionErrorKind, error_description: String) {
        self.exceptions.lock().await.push((kind, error_description));
    }
}

struct RecordingResult {
    completed: AtomicBool,
}

impl RecordingResult {
    fn new() -> Self {
        RecordingResult {
            completed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DirectiveHandlerResult for RecordingResult {
    async fn set_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    async fn set_failed(&self, _reason: String) {}
}

fn play_params_payload() -> serde_json::Value {
    json!({
        "playerId": "cloud-player-1",
        "playbackContextToken": "token",
        "offsetInMilliseconds": 0,
        "skillToken": "skill",
        "playbackSessionId": "session",
        "navigation": "DEFAULT",
        "preload": false,
    })
}

async fn authorize_directive(emp: &ExternalMediaPlayer) {
    let payload = json!({
        "players": [
            {
                "localPlayerId": "local-1",
                "authorized": true,
                "metadata": { "playerId": "cloud-player-1", "skillToken": "skill" },
            }
        ]
    });
    let directive = Directive::new("ExternalMediaPlayer", "AuthorizeDiscoveredPlayers", "msg-authorize", "dialog-1", payload);
    let result = Arc::new(RecordingResult::new());
    emp.pre_handle(directive, result.clone()).await;
    assert!(emp.handle("msg-authorize").await);
    assert!(result.completed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn authorize_then_play_reaches_the_owning_adapter() {
    let exception_sender = Arc::new(RecordingExceptionSender::default());
    let sender = Arc::new(RecordingSender::default());
    let emp = ExternalMediaPlayer::new(ExternalMediaPlayerCollaborators {
        message_sender: va_emp::AuthorizedSender::new(sender.clone()),
        guaranteed_sender: sender.clone(),
        exception_sender: exception_sender.clone(),
        config: Arc::new(VoiceAssistantConfig::builder().agent("ALEXA").build().unwrap()),
    });

    let adapter = Arc::new(RecordingAdapter::default());
    emp.register_adapter_handler(adapter.clone());
    emp.update_discovered_players(
        adapter.clone(),
        vec![PlayerInfo {
            local_player_id: "local-1".to_string(),
            spi_version: "1.0".to_string(),
            player_id: None,
            skill_token: None,
            playback_session_id: None,
            player_supported: true,
        }],
    );
    emp.startup().await;

    authorize_directive(&emp).await;
    assert_eq!(emp.registry().authorized_player_ids(), vec!["cloud-player-1".to_string()]);

    let updates = adapter.player_info_updates.lock().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].local_player_id, "local-1");
    assert_eq!(updates[0].player_id.as_deref(), Some("cloud-player-1"));
    assert_eq!(updates[0].skill_token.as_deref(), Some("skill"));
    drop(updates);

    let play_directive = Directive::new("ExternalMediaPlayer", "Play", "msg-play", "dialog-1", play_params_payload());
    let result = Arc::new(RecordingResult::new());
    emp.pre_handle(play_directive, result.clone()).await;
    assert!(emp.handle("msg-play").await);
    assert!(result.completed.load(Ordering::SeqCst));

    let played = adapter.played.lock().await;
    assert_eq!(played.len(), 1);
    assert_eq!(played[0].0, "local-1");
    assert!(exception_sender.exceptions.lock().await.is_empty());
}

#[tokio::test]
async fn play_for_an_unauthorized_player_id_is_rejected() {
    let exception_sender = Arc::new(RecordingExceptionSender::default());
    let sender = Arc::new(RecordingSender::default());
    let emp = ExternalMediaPlayer::new(ExternalMediaPlayerCollaborators {
        message_sender: va_emp::AuthorizedSender::new(sender.clone()),
        guaranteed_sender: sender.clone(),
        exception_sender: exception_sender.clone(),
        config: Arc::new(VoiceAssistantConfig::builder().agent("ALEXA").build().unwrap()),
    });

    let adapter = Arc::new(RecordingAdapter::default());
    emp.register_adapter_handler(adapter.clone());
    emp.startup().await;

    let play_directive = Directive::new("ExternalMediaPlayer", "Play", "msg-play", "dialog-1", play_params_payload());
    let result = Arc::new(RecordingResult::new());
    emp.pre_handle(play_directive, result.clone()).await;
    assert!(emp.handle("msg-play").await);

    assert!(adapter.played.lock().await.is_empty());
    let exceptions = exception_sender.exceptions.lock().await;
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].0, ExceptionErrorKind::UnexpectedInformationReceived);
    assert!(exceptions[0].1.contains("cloud-player-1"));
}

#[tokio::test]
async fn local_operation_routes_to_the_focused_player() {
    let exception_sender = Arc::new(RecordingExceptionSender::default());
    let sender = Arc::new(RecordingSender::default());
    let emp = ExternalMediaPlayer::new(ExternalMediaPlayerCollaborators {
        message_sender: va_emp::AuthorizedSender::new(sender.clone()),
        guaranteed_sender: sender.clone(),
        exception_sender,
        config: Arc::new(VoiceAssistantConfig::builder().agent("ALEXA").build().unwrap()),
    });

    let adapter = Arc::new(RecordingAdapter::default());
    emp.register_adapter_handler(adapter.clone());
    emp.update_discovered_players(
        adapter.clone(),
        vec![PlayerInfo {
            local_player_id: "local-1".to_string(),
            spi_version: "1.0".to_string(),
            player_id: None,
            skill_token: None,
            playback_session_id: None,
            player_supported: true,
        }],
    );
    emp.startup().await;
    authorize_directive(&emp).await;

    let play_directive = Directive::new("ExternalMediaPlayer", "Play", "msg-play", "dialog-1", play_params_payload());
    let result = Arc::new(RecordingResult::new());
    emp.pre_handle(play_directive, result.clone()).await;
    assert!(emp.handle("msg-play").await);

    emp.local_operation(va_emp::LocalOperation::TransientPause).await;

    let controlled = adapter.controlled.lock().await;
    assert_eq!(controlled.len(), 1);
    assert_eq!(controlled[0], ("local-1".to_string(), RequestType::TransientPause));
}
