//! The Directive Sequencer: ordering, dispatch, and cancellation of
//! cloud-issued directives under per-dialog blocking rules.
//!
//! See [`sequencer::DirectiveSequencer`] for the public entry point.

pub mod directive;
pub mod errors;
pub mod handler;
pub mod policy;
pub mod sequencer;

pub use directive::{AttachmentHandle, Directive, NamespaceAndName};
pub use errors::{DirectiveError, DirectiveResult};
pub use handler::{DirectiveHandler, DirectiveHandlerResult, HandleOutcome, HandlerConfiguration};
pub use policy::{BlockingPolicy, Medium};
pub use sequencer::DirectiveSequencer;
