//! In-memory cache store.

use crate::cache::store::CacheStore;
use crate::key::RequestKey;
use crate::transport::Response;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::trace;

/// Unbounded in-memory store mapping request keys to their last
/// successful response.
///
/// Safe for concurrent access from multiple slots. No eviction: the
/// store lives as long as its owner keeps it (typically the process),
/// or until [`MemoryStore::clear`] is called.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<RequestKey, Response>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &RequestKey) -> Option<Response> {
        let entries = self.entries.lock().unwrap();
        let hit = entries.get(key).cloned();
        trace!(key = %key, hit = hit.is_some(), "cache lookup");
        hit
    }

    fn set(&self, key: RequestKey, response: Response) {
        trace!(key = %key, status = response.status, "cache write");
        self.entries.lock().unwrap().insert(key, response);
    }
}
