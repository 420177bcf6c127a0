//! Error taxonomy for settled request outcomes.

use crate::transport::{Response, TransportError};
use thiserror::Error;

/// Error outcome of a request invocation.
///
/// Transport failures and unsuccessful (non-2xx) responses surface
/// through the same error channel: both land the slot in the error
/// state and reach the `on_error` hook. `Status` carries the raw
/// response so callers can still inspect it. Cloneable so outcomes can
/// be broadcast to deduped waiters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The physical send failed (network unreachable, timeout, ...).
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// A structurally valid response with a non-ok status.
    #[error("unsuccessful response: HTTP {}", .0.status)]
    Status(Response),

    /// The request was cancelled by supersession or teardown.
    #[error("request aborted")]
    Aborted,

    /// Invalid combination of inputs (e.g. an unserializable body).
    #[error("invalid request configuration: {0}")]
    Config(String),
}

impl FetchError {
    /// Returns the raw response for unsuccessful-response errors.
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchError::Status(response) => Some(response),
            _ => None,
        }
    }

    /// Returns true if this outcome is a cancellation.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            FetchError::Aborted | FetchError::Transport(TransportError::Aborted)
        )
    }
}
