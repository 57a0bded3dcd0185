//! Scenario tests for the Audio Input Processor's FSM (§8 Testable
//! Property 8, Scenario S4).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use serde_json::json;
use va_aip::{
    AipState, AipStateObserver, AudioInputProcessor, AudioInputProcessorCollaborators,
    AudioProvider, AudioRing, AudioRingReader, AudioRingWriter, AudioStreamProfile, Initiator,
};
use va_directive::{Directive, DirectiveHandler, DirectiveHandlerResult};
use va_infra::context::{ContextManager, DefaultContextManager};
use va_infra::events::{MessageSender, OutboundEvent, SendStatus};
use va_infra::focus::{FocusManager, FocusObserver, FocusState};

struct ImmediateForegroundFocusManager;

#[async_trait]
impl FocusManager for ImmediateForegroundFocusManager {
    async fn acquire_channel(
        &self,
        _channel: &str,
        observer: Arc<dyn FocusObserver>,
        _activity_id: String,
    ) -> bool {
        observer.on_focus_changed(FocusState::Foreground).await;
        true
    }

    async fn release_channel(&self, _channel: &str, _activity_id: &str) -> bool {
        true
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

#[derive(Default)]
struct RecordingStateObserver {
    states: Mutex<Vec<AipState>>,
}

#[async_trait]
impl AipStateObserver for RecordingStateObserver {
    async fn on_state_changed(&self, state: AipState) {
        self.states.lock().await.push(state);
    }

    async fn on_overrun(&self) {}
}

fn make_provider() -> AudioProvider {
    let ring = AudioRing::new(4096);
    let reader = AudioRingReader::new(ring, None);
    AudioProvider {
        reader,
        format: "AUDIO_L16_RATE_16000_CHANNELS_1",
        profile: AudioStreamProfile::NearField,
        always_readable: false,
        can_override: true,
        can_be_overridden: true,
    }
}

#[tokio::test]
async fn tap_to_talk_with_silence_reaches_idle_without_a_speak_directive() {
    let sender = Arc::new(RecordingSender::default());
    let state_observer = Arc::new(RecordingStateObserver::default());

    let processor = AudioInputProcessor::new(AudioInputProcessorCollaborators {
        focus_manager: Arc::new(ImmediateForegroundFocusManager),
        context_manager: Arc::new(DefaultContextManager::new()),
        message_sender: sender.clone(),
        user_inactivity: None,
        state_observers: vec![state_observer.clone()],
        default_expect_speech_timeout: Duration::from_secs(8),
    });

    processor
        .recognize(make_provider(), Initiator::Tap)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    {
        let states = state_observer.states.lock().await;
        assert_eq!(*states, vec![AipState::Recognizing]);
    }
    {
        let events = sender.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].header.name, "Recognize");
    }

    processor.stop_capture().await;
    processor.server_confirmed();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let states = state_observer.states.lock().await;
    assert_eq!(
        *states,
        vec![AipState::Recognizing, AipState::Busy, AipState::Idle]
    );

    // No Speak directive was ever delivered to this processor — it only
    // ever knows about its own Recognize/ExpectSpeechTimedOut events.
    let events = sender.events.lock().await;
    assert!(events.iter().all(|e| e.header.name != "Speak"));
}

#[tokio::test]
async fn expect_speech_timeout_emits_event_and_returns_to_idle() {
    let sender = Arc::new(RecordingSender::default());
    let state_observer = Arc::new(RecordingStateObserver::default());

    let processor = AudioInputProcessor::new(AudioInputProcessorCollaborators {
        focus_manager: Arc::new(ImmediateForegroundFocusManager),
        context_manager: Arc::new(DefaultContextManager::new()),
        message_sender: sender.clone(),
        user_inactivity: None,
        state_observers: vec![state_observer.clone()],
        default_expect_speech_timeout: Duration::from_secs(8),
    });

    processor.set_current_dialog_request_id("dialog-1");
    processor
        .expect_speech(Some(20), "dialog-1".to_string())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;

    let states = state_observer.states.lock().await;
    assert_eq!(
        *states,
        vec![AipState::ExpectingSpeech, AipState::Idle]
    );
    let events = sender.events.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].header.name, "ExpectSpeechTimedOut");
}

#[tokio::test]
async fn expect_speech_with_stale_dialog_id_is_rejected() {
    let sender = Arc::new(RecordingSender::default());
    let processor = AudioInputProcessor::new(AudioInputProcessorCollaborators {
        focus_manager: Arc::new(ImmediateForegroundFocusManager),
        context_manager: Arc::new(DefaultContextManager::new()),
        message_sender: sender,
        user_inactivity: None,
        state_observers: vec![],
        default_expect_speech_timeout: Duration::from_secs(8),
    });

    processor.set_current_dialog_request_id("dialog-1");
    let result = processor.expect_speech(Some(20), "dialog-stale".to_string()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn recognize_during_recognizing_requires_provider_precedence() {
    let sender = Arc::new(RecordingSender::default());
    let processor = AudioInputProcessor::new(AudioInputProcessorCollaborators {
        focus_manager: Arc::new(ImmediateForegroundFocusManager),
        context_manager: Arc::new(DefaultContextManager::new()),
        message_sender: sender,
        user_inactivity: None,
        state_observers: vec![],
        default_expect_speech_timeout: Duration::from_secs(8),
    });

    processor
        .recognize(make_provider(), Initiator::Tap)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut stubborn_provider = make_provider();
    stubborn_provider.can_override = false;
    let result = processor.recognize(stubborn_provider, Initiator::Tap).await;
    assert!(result.is_err());
}

struct RejectingContextManager;

#[async_trait]
impl ContextManager for RejectingContextManager {
    async fn register_provider(&self, _provider: Arc<dyn va_infra::context::ContextProvider>) {}
    async fn unregister_provider(&self, _namespace: &str) {}
    async fn get_context(&self) -> Value {
        serde_json::json!({})
    }
}

#[tokio::test]
async fn reset_state_from_recognizing_returns_to_idle() {
    let sender = Arc::new(RecordingSender::default());
    let calls = Arc::new(AtomicUsize::new(0));

    struct CountingFocusManager {
        calls: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl FocusManager for CountingFocusManager {
        async fn acquire_channel(
            &self,
            _channel: &str,
            observer: Arc<dyn FocusObserver>,
            _activity_id: String,
        ) -> bool {
            observer.on_focus_changed(FocusState::Foreground).await;
            true
        }
        async fn release_channel(&self, _channel: &str, _activity_id: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    let processor = AudioInputProcessor::new(AudioInputProcessorCollaborators {
        focus_manager: Arc::new(CountingFocusManager {
            calls: calls.clone(),
        }),
        context_manager: Arc::new(RejectingContextManager),
        message_sender: sender,
        user_inactivity: None,
        state_observers: vec![],
        default_expect_speech_timeout: Duration::from_secs(8),
    });

    processor
        .recognize(make_provider(), Initiator::PressAndHold)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    processor.reset_state().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Idempotent: calling it again from IDLE does nothing further.
    processor.reset_state().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}


#[tokio::test]
async fn recognize_event_streams_captured_audio_as_an_attachment() {
    let sender = Arc::new(RecordingSender::default());
    let processor = AudioInputProcessor::new(AudioInputProcessorCollaborators {
        focus_manager: Arc::new(ImmediateForegroundFocusManager),
        context_manager: Arc::new(DefaultContextManager::new()),
        message_sender: sender.clone(),
        user_inactivity: None,
        state_observers: vec![],
        default_expect_speech_timeout: Duration::from_secs(8),
    });

    let ring = AudioRing::new(4096);
    let writer = AudioRingWriter::new(ring.clone());
    let reader = AudioRingReader::new(ring, None);
    let provider = AudioProvider {
        reader,
        format: "AUDIO_L16_RATE_16000_CHANNELS_1",
        profile: AudioStreamProfile::NearField,
        always_readable: false,
        can_override: true,
        can_be_overridden: true,
    };

    processor.recognize(provider, Initiator::Tap).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    writer.write(b"captured-audio");

    let attachment = {
        let events = sender.events.lock().await;
        assert_eq!(events.len(), 1);
        events[0].attachment.clone().expect("Recognize event carries an attachment")
    };

    let chunk = attachment.next_chunk().await.expect("a chunk of captured audio");
    assert_eq!(&chunk[..], b"captured-audio");
}

struct RecordingResult {
    completed: AtomicBool,
    failed: Mutex<Option<String>>,
}

impl RecordingResult {
    fn new() -> Self {
        RecordingResult {
            completed: AtomicBool::new(false),
            failed: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DirectiveHandlerResult for RecordingResult {
    async fn set_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    async fn set_failed(&self, reason: String) {
        *self.failed.lock().await = Some(reason);
    }
}

fn make_processor(sender: Arc<RecordingSender>) -> AudioInputProcessor {
    AudioInputProcessor::new(AudioInputProcessorCollaborators {
        focus_manager: Arc::new(ImmediateForegroundFocusManager),
        context_manager: Arc::new(DefaultContextManager::new()),
        message_sender: sender,
        user_inactivity: None,
        state_observers: vec![],
        default_expect_speech_timeout: Duration::from_secs(8),
    })
}

#[tokio::test]
async fn stop_capture_directive_drives_the_same_transition_as_the_host_method() {
    let sender = Arc::new(RecordingSender::default());
    let processor = make_processor(sender.clone());

    let provider = make_provider();
    processor.recognize(provider, Initiator::Tap).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let directive = Directive::new("SpeechRecognizer", "StopCapture", "msg-1", "dialog-1", json!({}));
    let result = Arc::new(RecordingResult::new());
    processor.pre_handle(directive, result.clone()).await;
    assert!(processor.handle("msg-1").await);
    assert!(result.completed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn expect_speech_directive_honors_the_timeout_in_the_payload() {
    let sender = Arc::new(RecordingSender::default());
    let processor = make_processor(sender.clone());
    processor.set_current_dialog_request_id("dialog-1");

    let directive = Directive::new(
        "SpeechRecognizer",
        "ExpectSpeech",
        "msg-1",
        "dialog-1",
        json!({"timeoutInMilliseconds": 20}),
    );
    let result = Arc::new(RecordingResult::new());
    processor.pre_handle(directive, result.clone()).await;
    assert!(processor.handle("msg-1").await);
    assert!(result.completed.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_millis(60)).await;
    let events = sender.events.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].header.name, "ExpectSpeechTimedOut");
}

#[tokio::test]
async fn expect_speech_directive_with_a_stale_dialog_id_fails_handle() {
    let sender = Arc::new(RecordingSender::default());
    let processor = make_processor(sender);
    processor.set_current_dialog_request_id("dialog-1");

    let directive = Directive::new(
        "SpeechRecognizer",
        "ExpectSpeech",
        "msg-1",
        "dialog-stale",
        json!({"timeoutInMilliseconds": 20}),
    );
    let result = Arc::new(RecordingResult::new());
    processor.pre_handle(directive, result.clone()).await;
    assert!(!processor.handle("msg-1").await);
    assert!(!result.completed.load(Ordering::SeqCst));
    assert!(result.failed.lock().await.is_some());
}

#[tokio::test]
async fn cancel_drops_a_pending_directive_without_calling_handle() {
    let sender = Arc::new(RecordingSender::default());
    let processor = make_processor(sender);

    let directive = Directive::new("SpeechRecognizer", "StopCapture", "msg-1", "dialog-1", json!({}));
    let result = Arc::new(RecordingResult::new());
    processor.pre_handle(directive, result.clone()).await;
    processor.cancel("msg-1").await;

    assert!(!processor.handle("msg-1").await);
    assert!(!result.completed.load(Ordering::SeqCst));
}
