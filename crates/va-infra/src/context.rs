//! Context Manager contract.
//!
//! The Context Manager holds per-namespace state providers (the Sequencer's
//! handlers register themselves as providers) and assembles a JSON context
//! blob on request. The real implementation lives outside this crate's
//! scope (§1); this module defines only the provider/consumer contracts the
//! core components are built against, plus a small in-memory default used
//! by tests and simple hosts.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::InfraResult;

/// A single namespace's contribution to the assembled context blob.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// The namespace this provider reports state under (e.g. "SessionState").
    fn namespace(&self) -> &'static str;

    /// Produce this namespace's current state as a JSON value.
    async fn provide_state(&self) -> InfraResult<Value>;
}

/// Registry + assembler for context providers.
#[async_trait]
pub trait ContextManager: Send + Sync {
    async fn register_provider(&self, provider: Arc<dyn ContextProvider>);

    async fn unregister_provider(&self, namespace: &str);

    /// Assemble `{namespace: state, ...}` from every registered provider.
    ///
    /// A provider that fails to produce state is logged and omitted from
    /// the blob rather than failing the whole request — one misbehaving
    /// namespace should not block every other handler's context.
    async fn get_context(&self) -> Value;
}

/// Simple in-memory [`ContextManager`] suitable for a single-process host
/// and for tests. Providers are invoked sequentially in registration order,
/// matching the single-threaded executor discipline the rest of the core
/// assumes (no provider runs concurrently with another).
#[derive(Default)]
pub struct DefaultContextManager {
    providers: DashMap<&'static str, Arc<dyn ContextProvider>>,
}

impl DefaultContextManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextManager for DefaultContextManager {
    async fn register_provider(&self, provider: Arc<dyn ContextProvider>) {
        self.providers.insert(provider.namespace(), provider);
    }

    async fn unregister_provider(&self, namespace: &str) {
        self.providers.remove(namespace);
    }

    async fn get_context(&self) -> Value {
        let snapshot: Vec<Arc<dyn ContextProvider>> =
            self.providers.iter().map(|entry| entry.value().clone()).collect();

        let mut blob = Map::new();
        for provider in snapshot {
            match provider.provide_state().await {
                Ok(state) => {
                    blob.insert(provider.namespace().to_string(), state);
                }
                Err(err) => {
                    warn!(namespace = provider.namespace(), error = %err, "context provider failed, omitting from blob");
                }
            }
        }
        Value::Object(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        ns: &'static str,
        state: Value,
    }

    #[async_trait]
    impl ContextProvider for FixedProvider {
        fn namespace(&self) -> &'static str {
            self.ns
        }
        async fn provide_state(&self) -> InfraResult<Value> {
            Ok(self.state.clone())
        }
    }

    #[tokio::test]
    async fn assembles_context_from_all_providers() {
        let manager = DefaultContextManager::new();
        manager
            .register_provider(Arc::new(FixedProvider {
                ns: "SessionState",
                state: serde_json::json!({"agent": "ALEXA"}),
            }))
            .await;
        manager
            .register_provider(Arc::new(FixedProvider {
                ns: "PlaybackState",
                state: serde_json::json!({"state": "IDLE"}),
            }))
            .await;

        let ctx = manager.get_context().await;
        assert_eq!(ctx["SessionState"]["agent"], "ALEXA");
        assert_eq!(ctx["PlaybackState"]["state"], "IDLE");
    }

    struct FailingProvider;

    #[async_trait]
    impl ContextProvider for FailingProvider {
        fn namespace(&self) -> &'static str {
            "Broken"
        }
        async fn provide_state(&self) -> InfraResult<Value> {
            Err(crate::errors::InfraError::ContextTimeout {
                namespace: "Broken".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn omits_failing_provider_instead_of_failing_whole_request() {
        let manager = DefaultContextManager::new();
        manager.register_provider(Arc::new(FailingProvider)).await;
        manager
            .register_provider(Arc::new(FixedProvider {
                ns: "Ok",
                state: serde_json::json!({}),
            }))
            .await;

        let ctx = manager.get_context().await;
        assert!(ctx.get("Broken").is_none());
        assert!(ctx.get("Ok").is_some());
    }
}
