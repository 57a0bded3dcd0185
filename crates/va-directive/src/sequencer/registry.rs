//! Handler registry: all-or-nothing claim/release of (namespace, name) keys.
//!
//! A plain `DashMap` gives per-key atomicity but not whole-map atomicity,
//! and `addDirectiveHandler`/`removeDirectiveHandler` need to check *and*
//! mutate several keys as a single unit (§4.1 "Handler collision"). We
//! hold the whole table behind one `parking_lot::Mutex` instead — it is
//! only ever locked for the handful of instructions a registration check
//! takes, never across an `.await` point.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::directive::NamespaceAndName;
use crate::handler::DirectiveHandler;

pub struct HandlerRegistry {
    handlers: Mutex<HashMap<NamespaceAndName, Arc<dyn DirectiveHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Claims every key in `handler.configuration()` for `handler`, or
    /// claims none of them. Returns `false` without mutating anything if
    /// any key is already claimed by a different handler.
    pub fn add(&self, handler: Arc<dyn DirectiveHandler>) -> bool {
        let keys: Vec<NamespaceAndName> = handler.configuration().into_keys().collect();
        if keys.is_empty() {
            return false;
        }

        let mut table = self.handlers.lock();
        if keys.iter().any(|key| table.contains_key(key)) {
            return false;
        }
        for key in keys {
            table.insert(key, handler.clone());
        }
        true
    }

    /// Releases every key in `handler.configuration()`, but only if
    /// `handler` is the current owner of all of them — a stale handle
    /// (e.g. one already superseded by a re-registration) cannot evict
    /// someone else's claim.
    pub fn remove(&self, handler: &Arc<dyn DirectiveHandler>) -> bool {
        let keys: Vec<NamespaceAndName> = handler.configuration().into_keys().collect();
        if keys.is_empty() {
            return false;
        }

        let mut table = self.handlers.lock();
        let owns_all = keys.iter().all(|key| {
            table
                .get(key)
                .map(|owner| Arc::ptr_eq(owner, handler))
                .unwrap_or(false)
        });
        if !owns_all {
            return false;
        }
        for key in &keys {
            table.remove(key);
        }
        true
    }

    pub fn lookup(&self, key: &NamespaceAndName) -> Option<Arc<dyn DirectiveHandler>> {
        self.handlers.lock().get(key).cloned()
    }

    /// All currently registered handlers, deduplicated by pointer
    /// identity — used by `shutdown()` to deregister each handler exactly
    /// once even though it may own several keys.
    pub fn all_distinct(&self) -> Vec<Arc<dyn DirectiveHandler>> {
        let table = self.handlers.lock();
        let mut seen: Vec<Arc<dyn DirectiveHandler>> = Vec::new();
        for handler in table.values() {
            if !seen.iter().any(|existing| Arc::ptr_eq(existing, handler)) {
                seen.push(handler.clone());
            }
        }
        seen
    }

    pub fn clear(&self) {
        self.handlers.lock().clear();
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        HandlerRegistry::new()
    }
}
