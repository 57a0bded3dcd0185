//! The Audio Input Processor: a finite state machine coordinating
//! wake-word/button capture, streaming recognition uploads, expect-speech
//! re-prompting, and focus arbitration.
//!
//! See [`processor::AudioInputProcessor`] for the public entry point.

pub mod attachment;
pub mod errors;
pub mod initiator;
pub mod observer;
pub mod processor;
pub mod provider;
pub mod state;

pub use attachment::{AudioRing, AudioRingReader, AudioRingWriter, ReaderNotification, RingAttachmentSource};
pub use errors::{AipError, AipResult};
pub use initiator::{Initiator, WakewordIndices};
pub use observer::{AipStateObserver, UserInactivityNotifier};
pub use processor::{AudioInputProcessor, AudioInputProcessorCollaborators};
pub use provider::{AudioProvider, AudioStreamProfile};
pub use state::AipState;
