//! High-level client facade.
//!
//! A [`FetchClient`] is the composition root: it holds the injected
//! transport and cache capabilities plus the client-wide dedupe
//! registry, and mints request slots that share them.

use crate::cache::{CacheStore, MemoryStore};
use crate::dedupe::InFlightRegistry;
use crate::slot::{FetchConfig, RequestSlot};
use crate::transport::Transport;
use std::sync::Arc;

/// Shared context for a family of request slots.
///
/// All slots created from one client share its cache store and, for
/// [`crate::dedupe::DedupeScope::Shared`] requests, its in-flight
/// registry, so identical concurrent requests from different slots
/// collapse to one physical call.
#[derive(Clone)]
pub struct FetchClient {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn CacheStore>,
    registry: Arc<InFlightRegistry>,
}

impl FetchClient {
    /// Creates a client with an injected transport and cache store.
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            transport,
            cache,
            registry: Arc::new(InFlightRegistry::new()),
        }
    }

    /// Creates a client with an injected transport and a fresh
    /// in-memory cache.
    pub fn with_memory_cache(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, Arc::new(MemoryStore::new()))
    }

    /// Creates a request slot bound to this client's capabilities.
    ///
    /// Auto-firing slots spawn their first request immediately; this
    /// requires a running Tokio runtime.
    pub fn slot(&self, config: FetchConfig) -> RequestSlot {
        RequestSlot::new(
            config,
            Arc::clone(&self.transport),
            Arc::clone(&self.cache),
            Arc::clone(&self.registry),
        )
    }

    /// Returns the client-wide dedupe registry.
    pub fn registry(&self) -> &Arc<InFlightRegistry> {
        &self.registry
    }

    /// Returns the shared cache store.
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }
}

impl std::fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchClient").finish_non_exhaustive()
    }
}
