//! Per-slot request lifecycle state.
//!
//! State is mutated exclusively through [`RequestState::apply`], the
//! transition function driven by the slot. Observers receive snapshots
//! over a `watch` channel; a transition that changes nothing (a
//! re-entrant start while already pending) reports `false` so no
//! redundant notification is published.

use crate::error::FetchError;
use crate::transport::Response;
use bytes::Bytes;

/// Lifecycle phase of a request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Constructed but never triggered (lazy slots only).
    Idle,
    /// A physical or cache-resolution cycle is in progress.
    Pending,
    /// Settled with an ok response.
    Success,
    /// Settled with an error or a non-ok response.
    Error,
}

/// Transition applied to a slot's state.
#[derive(Debug, Clone)]
pub enum Transition {
    /// A trigger fired (manual, automatic, or key change).
    Started,
    /// A cached response was surfaced while the network request is
    /// still running (cache-and-network policy).
    CachedSuccess(Response),
    /// The request settled with an ok response.
    Succeeded(Response),
    /// The request settled with an error outcome.
    Failed(FetchError),
}

/// Observable snapshot of a request slot.
///
/// `response` survives a re-trigger so observers can keep showing the
/// previous result while a refresh is pending; `error` is cleared as
/// soon as a new cycle starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestState {
    /// Current lifecycle phase.
    pub status: Status,
    /// True while a physical or cache-resolution cycle is running.
    ///
    /// Distinct from `status`: under cache-and-network a slot can be in
    /// `Success` (showing the cached response) while still fetching.
    pub fetching: bool,
    /// Most recent response, if any.
    pub response: Option<Response>,
    /// Error of the last settled cycle, if it failed.
    pub error: Option<FetchError>,
}

impl Default for Status {
    fn default() -> Self {
        Status::Idle
    }
}

impl RequestState {
    /// Creates the initial idle state.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Applies a transition, returning true if the state changed.
    ///
    /// Repeated `Started` transitions while already pending collapse to
    /// a single pending state and return false.
    pub fn apply(&mut self, transition: Transition) -> bool {
        match transition {
            Transition::Started => {
                if self.status == Status::Pending && self.fetching {
                    return false;
                }
                self.status = Status::Pending;
                self.fetching = true;
                self.error = None;
                true
            }
            Transition::CachedSuccess(response) => {
                self.status = Status::Success;
                self.response = Some(response);
                self.error = None;
                // fetching stays true: the network outcome is still due
                true
            }
            Transition::Succeeded(response) => {
                self.status = Status::Success;
                self.fetching = false;
                self.response = Some(response);
                self.error = None;
                true
            }
            Transition::Failed(error) => {
                self.status = Status::Error;
                self.fetching = false;
                if let FetchError::Status(response) = &error {
                    self.response = Some(response.clone());
                }
                self.error = Some(error);
                true
            }
        }
    }

    /// Convenience unwrap of the response body, when present.
    pub fn data(&self) -> Option<Bytes> {
        self.response.as_ref().map(|response| response.body.clone())
    }
}
