//! Per-slot cancellation controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Owns the cancellation token of a slot's active physical request.
///
/// A slot holds at most one active token at a time. Starting a new
/// physical request cancels the previous token before a fresh one is
/// handed out, so a slot can never have two outstanding physical
/// requests. Teardown cancels whatever is held, unconditionally.
#[derive(Debug, Default)]
pub struct CancelGuard {
    active: Mutex<Option<CancellationToken>>,
}

impl CancelGuard {
    /// Creates a guard holding no token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a new physical request if `generation` is still the
    /// current one: cancels any previously held token, then allocates,
    /// stores and returns a fresh one.
    ///
    /// Returns `None` when a newer trigger has already claimed the
    /// slot. The generation check and the token swap happen under one
    /// lock, so a trigger that resumes after being superseded can never
    /// replace (and thereby cancel) the newer trigger's token.
    pub fn begin_if_current(
        &self,
        generation: u64,
        current: &AtomicU64,
    ) -> Option<CancellationToken> {
        let mut active = self.active.lock().unwrap();
        if current.load(Ordering::SeqCst) != generation {
            return None;
        }
        let token = CancellationToken::new();
        if let Some(previous) = active.replace(token.clone()) {
            debug!("superseding in-flight request");
            previous.cancel();
        }
        Some(token)
    }

    /// Cancels the held token, if any, without starting a new request.
    pub fn cancel_active(&self) {
        if let Some(token) = self.active.lock().unwrap().take() {
            token.cancel();
        }
    }

    /// Returns true if a token is currently held.
    pub fn is_active(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }
}
