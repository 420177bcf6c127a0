//! Cache policy resolution.
//!
//! Each invocation resolves to exactly one of three strategies that
//! govern how the cache is consulted, defaulting by the read/write
//! classification of the method. Whether a successful response is
//! written back to the cache is an independent default, also keyed on
//! the method classification.

use crate::request::is_read_method;

/// Strategy governing cache usage for one invocation.
///
/// Resolved once per invocation and fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Settle from the cache when an entry exists; only go to the
    /// network on a miss.
    CacheFirst,
    /// Surface a cached entry immediately while a network request runs
    /// unconditionally; the network outcome overwrites the cached one.
    CacheAndNetwork,
    /// Ignore the cache entirely; always perform a physical request.
    NetworkOnly,
}

impl CachePolicy {
    /// Resolves the effective policy for a (normalized) method.
    ///
    /// An explicit policy always wins; otherwise read methods default
    /// to [`CachePolicy::CacheFirst`] and write methods to
    /// [`CachePolicy::NetworkOnly`].
    pub fn resolve(explicit: Option<CachePolicy>, method: &str) -> CachePolicy {
        explicit.unwrap_or(if is_read_method(method) {
            CachePolicy::CacheFirst
        } else {
            CachePolicy::NetworkOnly
        })
    }
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CachePolicy::CacheFirst => write!(f, "cache-first"),
            CachePolicy::CacheAndNetwork => write!(f, "cache-and-network"),
            CachePolicy::NetworkOnly => write!(f, "network-only"),
        }
    }
}

/// Decides whether a successful response is written back to the cache.
///
/// Independent of the read policy: an explicit override wins, otherwise
/// cache writes are enabled for read methods and disabled for writes.
pub fn cache_writes_enabled(explicit: Option<bool>, method: &str) -> bool {
    explicit.unwrap_or_else(|| is_read_method(method))
}
