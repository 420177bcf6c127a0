//! Response cache: the injected shared store keyed by request identity.
//!
//! The core only reads and writes through the [`CacheStore`] capability;
//! ownership, lifetime and eviction of the store are external concerns.

mod memory;
mod store;

pub use memory::MemoryStore;
pub use store::{CacheStore, NoOpStore};
