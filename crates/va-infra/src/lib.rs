//! Shared plumbing for the voice-assistant core.
//!
//! This crate carries the ambient concerns every capability subsystem
//! (Directive Sequencer, Audio Input Processor, External Media Player)
//! depends on but none of them owns: context snapshotting, exception
//! reporting, outbound event envelopes, focus arbitration, configuration,
//! logging, and a uniform component lifecycle. The collaborators these
//! traits front — the real Context Manager, transport, and focus
//! arbiter — are external to this workspace (see the crate-level spec);
//! what lives here is the contract the core is built against.

pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod exception;
pub mod focus;
pub mod lifecycle;
pub mod logging;

pub use config::VoiceAssistantConfig;
pub use errors::{InfraError, InfraResult};
