//! In-flight request deduplication.
//!
//! The registry guarantees at most one physical request per key at any
//! instant. The first caller to register for a key becomes the *owner*:
//! it performs the transport call and completes the entry with the
//! settled outcome. Later callers for the same key *attach* to the
//! entry and receive the owner's outcome over a broadcast channel
//! instead of issuing a second physical call.
//!
//! ```text
//! Slot A ──register(k)──► Owner ────► Transport ──┐
//! Slot B ──register(k)──► Attached(rx) ◄──────────┤ complete(k, outcome)
//! Slot C ──register(k)──► Attached(rx) ◄──────────┘
//! ```
//!
//! Each owned entry carries a ticket. `complete` and `abort` act only
//! when the caller's ticket matches the live entry, so a request that
//! was superseded cannot remove or abort the entry of its successor.
//! Aborting an entry (supersession or teardown of the owner) cancels
//! the owner's token, removes the entry early and aborts every
//! attached waiter.

use crate::error::FetchError;
use crate::key::RequestKey;
use crate::transport::Response;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Settled outcome of a physical request, shared across waiters.
pub type Outcome = Result<Response, FetchError>;

/// Per-call dedupe configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupeOptions {
    /// When false, the caller bypasses the registry and always issues
    /// its own physical request.
    pub enabled: bool,
    /// Which registry the caller's requests join.
    pub scope: DedupeScope,
}

impl Default for DedupeOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: DedupeScope::Shared,
        }
    }
}

/// Scope of deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeScope {
    /// Join the client-wide registry: requests from different slots
    /// sharing a key collapse to one physical call.
    Shared,
    /// Join a registry private to the slot: only the slot's own
    /// overlapping triggers collapse.
    PerSlot,
}

/// One in-flight physical request.
struct InFlightEntry {
    ticket: u64,
    tx: broadcast::Sender<Outcome>,
    cancel: CancellationToken,
}

/// Counters for monitoring dedupe effectiveness.
#[derive(Debug, Default, Clone)]
pub struct RegistryStats {
    /// Total registrations.
    pub total: u64,
    /// Registrations that attached to an existing entry.
    pub coalesced: u64,
    /// Registrations that became owners.
    pub owners: u64,
}

impl RegistryStats {
    /// Fraction of registrations that avoided a physical call.
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.coalesced as f64 / self.total as f64
        }
    }
}

/// Result of registering a request for a key.
pub enum Registration {
    /// First request for the key: the caller must perform the physical
    /// call and settle the entry through the guard.
    Owner(OwnerGuard),
    /// A request for the key is already in flight: wait on the receiver
    /// for its outcome.
    Attached(broadcast::Receiver<Outcome>),
}

impl Registration {
    /// Returns true if the caller owns the physical request.
    pub fn is_owner(&self) -> bool {
        matches!(self, Registration::Owner(_))
    }
}

/// Owner-side handle to a registered entry.
///
/// The owner settles its entry with [`OwnerGuard::complete`]. If the
/// guard is dropped first (the owning future was cancelled, e.g. by a
/// caller-side timeout) the entry is aborted on a background task so
/// attached waiters are released and the key is freed for
/// re-registration instead of dangling in the map.
pub struct OwnerGuard {
    registry: Arc<InFlightRegistry>,
    key: RequestKey,
    ticket: u64,
    settled: bool,
}

impl OwnerGuard {
    /// Ticket identifying the owned entry.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Settles the owned entry, broadcasting `outcome` to every
    /// attached waiter and removing the entry.
    pub async fn complete(mut self, outcome: Outcome) {
        self.registry.complete(&self.key, self.ticket, outcome).await;
        // Marked settled only after the entry is gone: dropping this
        // future mid-settlement still triggers the abort path
        self.settled = true;
    }
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let registry = Arc::clone(&self.registry);
        let key = self.key.clone();
        let ticket = self.ticket;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    registry.abort(&key, ticket).await;
                });
            }
            // No runtime left means no waiters left to release
            Err(_) => warn!(key = %key, "owner dropped outside a runtime"),
        }
    }
}

/// Registry of in-flight physical requests, keyed by request identity.
///
/// Invariant: at most one entry per key at any instant. Entries are
/// created on first registration and removed when the physical request
/// settles (success, error or abort).
pub struct InFlightRegistry {
    in_flight: Mutex<HashMap<RequestKey, InFlightEntry>>,
    stats: Mutex<RegistryStats>,
    next_ticket: AtomicU64,
}

impl InFlightRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            stats: Mutex::new(RegistryStats::default()),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Registers a request for `key`.
    ///
    /// The first registration becomes [`Registration::Owner`] and the
    /// entry adopts `cancel` as its cancellation token; later
    /// registrations attach to the entry's outcome.
    pub async fn register(self: Arc<Self>, key: RequestKey, cancel: CancellationToken) -> Registration {
        let mut in_flight = self.in_flight.lock().await;
        let mut stats = self.stats.lock().await;
        stats.total += 1;

        if let Some(entry) = in_flight.get(&key) {
            stats.coalesced += 1;
            debug!(key = %key, "attaching to in-flight request");
            Registration::Attached(entry.tx.subscribe())
        } else {
            // Capacity 16: outcomes are single-shot, waiters never lag
            let (tx, _rx) = broadcast::channel(16);
            let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
            in_flight.insert(key.clone(), InFlightEntry { ticket, tx, cancel });
            stats.owners += 1;
            debug!(key = %key, ticket = ticket, in_flight = in_flight.len(), "new in-flight request");
            Registration::Owner(OwnerGuard {
                registry: Arc::clone(&self),
                key,
                ticket,
                settled: false,
            })
        }
    }

    /// Settles the entry for `key`, broadcasting `outcome` to all
    /// attached waiters and removing the entry.
    ///
    /// A stale ticket (the entry was aborted and re-created since) is a
    /// no-op: the outcome belongs to a superseded request.
    pub async fn complete(&self, key: &RequestKey, ticket: u64, outcome: Outcome) {
        let mut in_flight = self.in_flight.lock().await;

        if !in_flight.get(key).map_or(false, |entry| entry.ticket == ticket) {
            return;
        }
        if let Some(entry) = in_flight.remove(key) {
            let waiters = entry.tx.receiver_count();
            // Ignore send errors: waiters may have dropped out
            let _ = entry.tx.send(outcome);
            if waiters > 0 {
                debug!(key = %key, waiters = waiters, "broadcast outcome to waiters");
            }
        }
    }

    /// Aborts the entry for `key` if it still belongs to `ticket`.
    ///
    /// Cancels the owner's token, broadcasts [`FetchError::Aborted`] to
    /// attached waiters and removes the entry.
    pub async fn abort(&self, key: &RequestKey, ticket: u64) {
        let mut in_flight = self.in_flight.lock().await;

        if !in_flight.get(key).map_or(false, |entry| entry.ticket == ticket) {
            return;
        }
        if let Some(entry) = in_flight.remove(key) {
            debug!(key = %key, ticket = ticket, "aborting in-flight request");
            entry.cancel.cancel();
            let _ = entry.tx.send(Err(FetchError::Aborted));
        }
    }

    /// Returns the number of requests currently in flight.
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Returns a snapshot of the registry counters.
    pub async fn stats(&self) -> RegistryStats {
        self.stats.lock().await.clone()
    }

    /// Logs the registry counters.
    pub async fn log_stats(&self) {
        let stats = self.stats.lock().await.clone();
        let in_flight = self.in_flight.lock().await.len();

        info!(
            total = stats.total,
            coalesced = stats.coalesced,
            owners = stats.owners,
            in_flight = in_flight,
            coalescing_ratio = format!("{:.1}%", stats.coalescing_ratio() * 100.0),
            "dedupe registry statistics"
        );
    }
}

impl Default for InFlightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for a shared outcome, racing it against the waiter's own
/// cancellation token.
///
/// A closed channel means the entry vanished without settling; that is
/// surfaced as an abort rather than a hang.
pub async fn wait_shared(
    mut rx: broadcast::Receiver<Outcome>,
    cancel: &CancellationToken,
) -> Outcome {
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Aborted),
        received = rx.recv() => match received {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::Aborted),
        },
    }
}
