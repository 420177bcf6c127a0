//! refetch - client-side request-state management
//!
//! This library issues network requests on behalf of consumers,
//! deduplicates concurrent identical requests, caches completed
//! responses, and exposes each request's lifecycle (idle, pending,
//! success, error) as observable state.
//!
//! # High-Level API
//!
//! For most use cases, the [`client`] module provides a simplified
//! facade:
//!
//! ```ignore
//! use refetch::client::FetchClient;
//! use refetch::slot::{FetchConfig, FetchOverrides};
//! use refetch::transport::ReqwestTransport;
//! use std::sync::Arc;
//!
//! let transport = Arc::new(ReqwestTransport::new()?);
//! let client = FetchClient::with_memory_cache(transport);
//!
//! // Auto-fires immediately (GET is a read method)
//! let posts = client.slot(FetchConfig::get("https://api.example.com/posts"));
//! let mut state = posts.subscribe();
//!
//! // Manual trigger, always available
//! let response = posts.do_fetch(FetchOverrides::default()).await?;
//! ```

pub mod cache;
pub mod client;
pub mod dedupe;
pub mod error;
pub mod headers;
pub mod key;
pub mod logging;
pub mod policy;
pub mod request;
pub mod slot;
pub mod transport;

pub use client::FetchClient;
pub use error::FetchError;
pub use key::{derive_key, RequestKey};
pub use policy::CachePolicy;
pub use slot::{FetchConfig, FetchOverrides, RequestSlot, RequestState, Status};
pub use transport::Response;

/// Version of the refetch library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
