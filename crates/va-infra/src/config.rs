//! Startup configuration shared by the Sequencer, AIP, and EMP.
//!
//! Mirrors the teacher's client config layer: a typed struct with a
//! validating builder rather than a bag of public fields assembled ad hoc.

use std::collections::HashSet;
use std::time::Duration;

use crate::errors::{InfraError, InfraResult};

/// Default ExpectSpeech timeout when the builder is not given one.
pub const DEFAULT_EXPECT_SPEECH_TIMEOUT: Duration = Duration::from_secs(8);

/// Startup configuration for the voice-assistant core.
#[derive(Debug, Clone)]
pub struct VoiceAssistantConfig {
    /// Agent string reported by the EMP in SessionState context (e.g. "ALEXA").
    agent: String,
    /// SPI version advertised by the EMP.
    spi_version: String,
    /// Default timeout for an ExpectSpeech directive with no explicit one.
    expect_speech_timeout: Duration,
    /// (namespace) set of capability namespaces this build enables.
    enabled_namespaces: HashSet<String>,
}

impl VoiceAssistantConfig {
    pub fn builder() -> VoiceAssistantConfigBuilder {
        VoiceAssistantConfigBuilder::default()
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn spi_version(&self) -> &str {
        &self.spi_version
    }

    pub fn expect_speech_timeout(&self) -> Duration {
        self.expect_speech_timeout
    }

    pub fn is_namespace_enabled(&self, namespace: &str) -> bool {
        self.enabled_namespaces.is_empty() || self.enabled_namespaces.contains(namespace)
    }
}

/// Builder for [`VoiceAssistantConfig`] with field-level validation.
#[derive(Debug, Default)]
pub struct VoiceAssistantConfigBuilder {
    agent: Option<String>,
    spi_version: Option<String>,
    expect_speech_timeout: Option<Duration>,
    enabled_namespaces: HashSet<String>,
}

impl VoiceAssistantConfigBuilder {
    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn spi_version(mut self, version: impl Into<String>) -> Self {
        self.spi_version = Some(version.into());
        self
    }

    pub fn expect_speech_timeout(mut self, timeout: Duration) -> Self {
        self.expect_speech_timeout = Some(timeout);
        self
    }

    pub fn enable_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.enabled_namespaces.insert(namespace.into());
        self
    }

    pub fn build(self) -> InfraResult<VoiceAssistantConfig> {
        let agent = self.agent.unwrap_or_default();
        if agent.trim().is_empty() {
            return Err(InfraError::InvalidConfig {
                field: "agent",
                reason: "agent string must not be empty".to_string(),
            });
        }

        let spi_version = self.spi_version.unwrap_or_else(|| "1.0".to_string());
        if spi_version.trim().is_empty() {
            return Err(InfraError::InvalidConfig {
                field: "spi_version",
                reason: "spi_version must not be empty".to_string(),
            });
        }

        let expect_speech_timeout = self
            .expect_speech_timeout
            .unwrap_or(DEFAULT_EXPECT_SPEECH_TIMEOUT);
        if expect_speech_timeout.is_zero() {
            return Err(InfraError::InvalidConfig {
                field: "expect_speech_timeout",
                reason: "timeout must be greater than zero".to_string(),
            });
        }

        Ok(VoiceAssistantConfig {
            agent,
            spi_version,
            expect_speech_timeout,
            enabled_namespaces: self.enabled_namespaces,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_agent() {
        let err = VoiceAssistantConfig::builder().build().unwrap_err();
        assert!(matches!(err, InfraError::InvalidConfig { field: "agent", .. }));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = VoiceAssistantConfig::builder()
            .agent("ALEXA")
            .expect_speech_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            InfraError::InvalidConfig {
                field: "expect_speech_timeout",
                ..
            }
        ));
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = VoiceAssistantConfig::builder().agent("ALEXA").build().unwrap();
        assert_eq!(cfg.agent(), "ALEXA");
        assert_eq!(cfg.spi_version(), "1.0");
        assert_eq!(cfg.expect_speech_timeout(), DEFAULT_EXPECT_SPEECH_TIMEOUT);
        assert!(cfg.is_namespace_enabled("AnyNamespace"));
    }

    #[test]
    fn namespace_allowlist_is_enforced_once_nonempty() {
        let cfg = VoiceAssistantConfig::builder()
            .agent("ALEXA")
            .enable_namespace("ExternalMediaPlayer")
            .build()
            .unwrap();
        assert!(cfg.is_namespace_enabled("ExternalMediaPlayer"));
        assert!(!cfg.is_namespace_enabled("SpeechSynthesizer"));
    }
}
