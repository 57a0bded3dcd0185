//! Uniform start/shutdown lifecycle for the three core subsystems.
//!
//! The Directive Sequencer, AIP, and EMP each own a background executor.
//! Rather than grow three bespoke init/stop surfaces, they all implement
//! this small `Component` trait so a host can bring the stack up and tear
//! it down in one place.

use async_trait::async_trait;

/// Where a component sits in its start/stop lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Created,
    Running,
    ShuttingDown,
    ShutDown,
}

/// A subsystem that can be started and shut down uniformly.
///
/// `shutdown` must be idempotent: calling it twice (or calling it before
/// `start`) is not an error.
#[async_trait]
pub trait Component: Send + Sync {
    /// Unique name for logging/diagnostics.
    fn name(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> ComponentState;

    /// Start the component's background executor.
    async fn start(&self);

    /// Drain outstanding work, cancel it, and release owned resources.
    /// Idempotent.
    async fn shutdown(&self);
}
