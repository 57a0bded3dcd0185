//! Logging setup shared by every core component.
//!
//! Components never call `println!`/`log::*` directly; they emit `tracing`
//! spans and events with structured fields (dialog id, message id, player
//! id, …). This module wires up a subscriber for local development and
//! tests; production sink wiring is a host-application concern (see the
//! crate-level docs).

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Configuration for the default `tracing` subscriber.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level to emit.
    pub level: Level,
    /// Emit one JSON object per line instead of human-readable text.
    pub json: bool,
    /// Include file/line info in each event.
    pub file_info: bool,
    /// Application name, carried as a field on every event.
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            app_name: "voice-assistant-core".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }
}

/// Install a process-global `tracing` subscriber built from `config`.
///
/// Safe to call more than once in tests; subsequent calls are ignored if a
/// global subscriber is already set.
pub fn setup_logging(config: LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized, skipping");
    }
}

/// Emit a one-line startup banner. Called once by the host after
/// [`setup_logging`]; kept separate so tests can install logging without
/// the banner noise.
pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!(app_name, version, "starting");
}
