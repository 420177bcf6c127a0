//! Cache store capability for dependency injection.

use crate::key::RequestKey;
use crate::transport::Response;

/// Shared key/value store for completed responses.
///
/// The store holds the last successful response per request key. The
/// core never evicts; lifetime is owned by whoever injected the store
/// (process lifetime, explicit reset, ...). Implementations must be
/// safe for concurrent access from multiple slots.
pub trait CacheStore: Send + Sync {
    /// Returns the cached response for `key`, if any.
    fn get(&self, key: &RequestKey) -> Option<Response>;

    /// Stores `response` as the entry for `key`, replacing any previous
    /// entry.
    fn set(&self, key: RequestKey, response: Response);
}

/// Store that never caches.
///
/// Always misses; writes are accepted and dropped. Useful for
/// exercising request flows without cache interference.
#[derive(Debug, Clone, Default)]
pub struct NoOpStore;

impl NoOpStore {
    /// Creates a new no-op store.
    pub fn new() -> Self {
        Self
    }
}

impl CacheStore for NoOpStore {
    fn get(&self, _key: &RequestKey) -> Option<Response> {
        None
    }

    fn set(&self, _key: RequestKey, _response: Response) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> RequestKey {
        RequestKey::explicit("GET http://example.com/posts")
    }

    #[test]
    fn test_noop_store_always_misses() {
        let store = NoOpStore::new();
        assert!(store.get(&test_key()).is_none());
    }

    #[test]
    fn test_noop_store_drops_writes() {
        let store = NoOpStore::new();
        store.set(test_key(), Response::new(200, "cached"));
        assert!(store.get(&test_key()).is_none());
    }

    #[test]
    fn test_noop_store_as_trait_object() {
        let store: Box<dyn CacheStore> = Box::new(NoOpStore::new());
        store.set(test_key(), Response::new(200, ""));
        assert!(store.get(&test_key()).is_none());
    }
}
