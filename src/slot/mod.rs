//! Request slots: the per-consumer lifecycle controller.
//!
//! A [`RequestSlot`] owns one logical request on behalf of a consumer
//! (typically a UI element) for that consumer's lifetime. It decides
//! when to auto-fire, applies the cache policy, funnels physical calls
//! through the dedupe registry, supersedes stale in-flight requests,
//! and publishes every lifecycle change as observable state.
//!
//! ```text
//!              ┌────────────┐   key    ┌──────────────┐
//!  trigger ───►│ RequestSlot├─────────►│  CacheStore  │
//!              │  (state    │  miss /  └──────────────┘
//!              │   machine) │  network
//!              │            ├─────────► InFlightRegistry ──► Transport
//!              └─────┬──────┘
//!                    │ watch::Receiver<RequestState>
//!                    ▼
//!               observers
//! ```
//!
//! Ordering guarantee: outcomes apply in start order with
//! last-cancel-wins. Every trigger bumps a generation counter and
//! cancels the previous physical request; a settlement whose generation
//! is no longer current is discarded, so observers never see a stale
//! outcome overwrite a newer one.

mod cancel;
mod config;
mod state;

pub use cancel::CancelGuard;
pub use config::{ErrorHook, FetchConfig, FetchOverrides, SuccessHook};
pub use state::{RequestState, Status, Transition};

use crate::cache::CacheStore;
use crate::dedupe::{
    wait_shared, DedupeScope, InFlightRegistry, Outcome, Registration,
};
use crate::error::FetchError;
use crate::key::{derive_key, RequestKey};
use crate::policy::{cache_writes_enabled, CachePolicy};
use crate::request::{normalize_method, shape_request, InitOptions, ShapedRequest};
use crate::transport::{Response, Transport, TransportError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Everything captured from the configuration for one invocation.
///
/// Cloned out of the slot config at trigger time so no lock is held
/// across suspension points.
struct FetchPlan {
    method: String,
    url: String,
    init: InitOptions,
    dedupe: crate::dedupe::DedupeOptions,
    request_key: Option<String>,
    cache_policy: Option<CachePolicy>,
    cache_response: Option<bool>,
    on_success: Option<SuccessHook>,
    on_error: Option<ErrorHook>,
}

/// A previously owned in-flight registry entry, remembered so the next
/// trigger can abort it.
struct OwnedEntry {
    key: RequestKey,
    ticket: u64,
    scope: DedupeScope,
}

struct SlotInner {
    config: Mutex<FetchConfig>,
    current_key: Mutex<RequestKey>,
    state_tx: watch::Sender<RequestState>,
    cancel: CancelGuard,
    teardown: tokio_util::sync::CancellationToken,
    generation: AtomicU64,
    last_owned: Mutex<Option<OwnedEntry>>,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn CacheStore>,
    shared_registry: Arc<InFlightRegistry>,
    private_registry: Arc<InFlightRegistry>,
}

/// One logical request slot.
///
/// Construct through [`crate::client::FetchClient::slot`] (or
/// [`RequestSlot::new`] with explicitly injected capabilities). Slots
/// auto-fire on creation and on key change unless suppressed by the
/// `lazy` setting; [`RequestSlot::do_fetch`] is always available.
///
/// Dropping the slot tears it down: the active physical request is
/// cancelled and no further state mutation or hook invocation occurs.
pub struct RequestSlot {
    inner: Arc<SlotInner>,
}

impl RequestSlot {
    /// Creates a slot with explicitly injected capabilities.
    ///
    /// Auto-firing slots spawn their first request immediately; this
    /// requires a running Tokio runtime.
    pub fn new(
        config: FetchConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn CacheStore>,
        registry: Arc<InFlightRegistry>,
    ) -> Self {
        let method = normalize_method(&config.method);
        let key = match &config.request_key {
            Some(explicit) => RequestKey::explicit(explicit.clone()),
            None => derive_key(&method, &config.url, &config.init),
        };
        let auto_fire = config.should_auto_fire(&method);

        let (state_tx, _state_rx) = watch::channel(RequestState::idle());
        let inner = Arc::new(SlotInner {
            config: Mutex::new(config),
            current_key: Mutex::new(key),
            state_tx,
            cancel: CancelGuard::new(),
            teardown: tokio_util::sync::CancellationToken::new(),
            generation: AtomicU64::new(0),
            last_owned: Mutex::new(None),
            transport,
            cache,
            shared_registry: registry,
            private_registry: Arc::new(InFlightRegistry::new()),
        });

        if auto_fire {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let _ = inner.run_fetch(FetchOverrides::default()).await;
            });
        }

        Self { inner }
    }

    /// Subscribes to lifecycle state changes.
    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.inner.state_tx.subscribe()
    }

    /// Returns the current state snapshot.
    pub fn state(&self) -> RequestState {
        self.inner.state_tx.borrow().clone()
    }

    /// Returns the slot's current request key.
    pub fn request_key(&self) -> RequestKey {
        self.inner.current_key.lock().unwrap().clone()
    }

    /// Returns the manual-trigger handle identity marker, if set.
    ///
    /// Consumers that cache the `do_fetch` handle can compare this
    /// marker to decide whether to treat the handle as changed. It has
    /// no effect on behavior.
    pub fn handle_key(&self) -> Option<String> {
        self.inner.config.lock().unwrap().refresh_do_fetch_key.clone()
    }

    /// Manually triggers the request, regardless of the lazy setting.
    ///
    /// `overrides` are shallow-merged over the base configuration for
    /// this call only.
    ///
    /// # Errors
    ///
    /// Returns the error outcome of this invocation. Errors returned
    /// here are the same ones surfaced through the error state; this is
    /// the only channel that propagates them to chaining callers.
    pub async fn do_fetch(&self, overrides: FetchOverrides) -> Result<Response, FetchError> {
        self.inner.clone().run_fetch(overrides).await
    }

    /// Updates the request descriptor (URL and, optionally, the shaping
    /// options).
    ///
    /// If the derived key changes and the slot is not lazy, a new
    /// request fires automatically, superseding any in-flight one.
    pub fn set_request(&self, url: impl Into<String>, init: Option<InitOptions>) {
        let (auto_fire, new_key) = {
            let mut config = self.inner.config.lock().unwrap();
            config.url = url.into();
            if let Some(init) = init {
                config.init = init;
            }
            let method = normalize_method(&config.method);
            let key = match &config.request_key {
                Some(explicit) => RequestKey::explicit(explicit.clone()),
                None => derive_key(&method, &config.url, &config.init),
            };
            (config.should_auto_fire(&method), key)
        };

        let changed = {
            let mut current = self.inner.current_key.lock().unwrap();
            if *current != new_key {
                *current = new_key.clone();
                true
            } else {
                false
            }
        };

        if changed {
            debug!(key = %new_key, "request key changed");
            if auto_fire {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    let _ = inner.run_fetch(FetchOverrides::default()).await;
                });
            }
        }
    }
}

impl Drop for RequestSlot {
    fn drop(&mut self) {
        self.inner.teardown.cancel();
        self.inner.cancel.cancel_active();

        // Release any still-owned registry entry so attached waiters
        // on other slots are not left hanging
        if let Some(owned) = self.inner.last_owned.lock().unwrap().take() {
            let registry = self.inner.registry_for(owned.scope);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    registry.abort(&owned.key, owned.ticket).await;
                });
            }
        }
    }
}

impl SlotInner {
    fn registry_for(&self, scope: DedupeScope) -> Arc<InFlightRegistry> {
        match scope {
            DedupeScope::Shared => Arc::clone(&self.shared_registry),
            DedupeScope::PerSlot => Arc::clone(&self.private_registry),
        }
    }

    /// Applies a transition, returning true if it landed.
    fn apply(&self, generation: u64, transition: Transition) -> bool {
        self.state_tx.send_if_modified(|state| {
            // Checked under the channel lock so a stale trigger's
            // transition can never land after a newer trigger's, and
            // nothing mutates state once the slot is torn down
            if self.teardown.is_cancelled()
                || self.generation.load(Ordering::SeqCst) != generation
            {
                return false;
            }
            state.apply(transition)
        })
    }

    /// Runs one complete invocation: policy resolution, cache consult,
    /// dedupe registration, physical call and settlement.
    async fn run_fetch(self: Arc<Self>, overrides: FetchOverrides) -> Result<Response, FetchError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let plan = {
            let config = self.config.lock().unwrap();
            FetchPlan {
                method: normalize_method(&config.method),
                url: config.url.clone(),
                init: overrides.init.unwrap_or_else(|| config.init.clone()),
                dedupe: overrides.dedupe.unwrap_or(config.dedupe),
                request_key: config.request_key.clone(),
                cache_policy: config.cache_policy,
                cache_response: config.cache_response,
                on_success: config.on_success.clone(),
                on_error: config.on_error.clone(),
            }
        };

        let key = match &plan.request_key {
            Some(explicit) => RequestKey::explicit(explicit.clone()),
            None => derive_key(&plan.method, &plan.url, &plan.init),
        };
        let policy = CachePolicy::resolve(plan.cache_policy, &plan.method);
        debug!(key = %key, policy = %policy, "request triggered");

        // A newer trigger always supersedes the older in-flight one.
        // Guarded by the generation so the reverse can never happen:
        // a stale trigger must not cancel its successor's request.
        if self.generation.load(Ordering::SeqCst) == generation {
            self.cancel.cancel_active();
            let previous = self.last_owned.lock().unwrap().take();
            if let Some(owned) = previous {
                self.registry_for(owned.scope)
                    .abort(&owned.key, owned.ticket)
                    .await;
            }
        }

        self.apply(generation, Transition::Started);

        match policy {
            CachePolicy::CacheFirst => {
                if let Some(cached) = self.cache.get(&key) {
                    debug!(key = %key, "cache-first hit, settling without transport");
                    let outcome = Ok(cached);
                    self.settle(generation, &key, &plan, outcome.clone(), false);
                    return outcome;
                }
            }
            CachePolicy::CacheAndNetwork => {
                if let Some(cached) = self.cache.get(&key) {
                    debug!(key = %key, "surfacing cached response while refreshing");
                    self.apply(generation, Transition::CachedSuccess(cached));
                }
            }
            CachePolicy::NetworkOnly => {}
        }

        let shaped = match shape_request(&plan.method, &plan.url, &plan.init) {
            Ok(shaped) => shaped,
            Err(error) => {
                let outcome = Err(error);
                self.settle(generation, &key, &plan, outcome.clone(), false);
                return outcome;
            }
        };

        // Generation re-check and token allocation are one atomic step;
        // a trigger superseded while suspended above bails out here.
        let token = match self.cancel.begin_if_current(generation, &self.generation) {
            Some(token) => token,
            None => {
                debug!(key = %key, "superseded before dispatch");
                return Err(FetchError::Aborted);
            }
        };

        let outcome = if plan.dedupe.enabled {
            loop {
                let registry = self.registry_for(plan.dedupe.scope);
                match registry.register(key.clone(), token.clone()).await {
                    Registration::Owner(guard) => {
                        let ticket = guard.ticket();
                        *self.last_owned.lock().unwrap() = Some(OwnedEntry {
                            key: key.clone(),
                            ticket,
                            scope: plan.dedupe.scope,
                        });

                        let outcome = self.perform(&shaped, &token).await;
                        // Settles the entry; if this future is dropped
                        // instead, the guard aborts it in the background
                        guard.complete(outcome.clone()).await;

                        let mut last = self.last_owned.lock().unwrap();
                        if last.as_ref().map_or(false, |owned| owned.ticket == ticket) {
                            *last = None;
                        }
                        break outcome;
                    }
                    Registration::Attached(rx) => {
                        let outcome = wait_shared(rx, &token).await;
                        // The shared entry was aborted from under us
                        // while this trigger is still live (its owner
                        // was superseded or torn down): issue our own
                        // physical request instead of surfacing the
                        // owner's abort
                        if matches!(outcome, Err(FetchError::Aborted))
                            && !token.is_cancelled()
                            && self.generation.load(Ordering::SeqCst) == generation
                        {
                            debug!(key = %key, "shared request aborted, re-registering");
                            continue;
                        }
                        break outcome;
                    }
                }
            }
        } else {
            self.perform(&shaped, &token).await
        };

        let cache_write =
            outcome.is_ok() && cache_writes_enabled(plan.cache_response, &plan.method);
        self.settle(generation, &key, &plan, outcome.clone(), cache_write);
        outcome
    }

    /// Performs the physical call and folds the result into the error
    /// taxonomy: a non-ok response is an error outcome carrying the raw
    /// response.
    async fn perform(
        &self,
        request: &ShapedRequest,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Outcome {
        match self.transport.send(request, cancel).await {
            Ok(response) if response.ok() => Ok(response),
            Ok(response) => Err(FetchError::Status(response)),
            Err(TransportError::Aborted) => Err(FetchError::Aborted),
            Err(error) => Err(FetchError::Transport(error)),
        }
    }

    /// Applies a settled outcome to slot state, the cache and the
    /// notification hooks.
    ///
    /// Superseded outcomes (the generation moved on) and outcomes
    /// arriving after teardown are discarded: no state mutation, no
    /// cache write, no hook.
    fn settle(
        &self,
        generation: u64,
        key: &RequestKey,
        plan: &FetchPlan,
        outcome: Outcome,
        cache_write: bool,
    ) {
        if self.teardown.is_cancelled() {
            debug!(key = %key, "slot torn down, discarding outcome");
            return;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(key = %key, "superseded, discarding outcome");
            return;
        }

        match outcome {
            Ok(response) => {
                if !self.apply(generation, Transition::Succeeded(response.clone())) {
                    return;
                }
                if cache_write {
                    self.cache.set(key.clone(), response.clone());
                }
                if let Some(hook) = &plan.on_success {
                    hook(&response);
                }
            }
            Err(error) => {
                if !self.apply(generation, Transition::Failed(error.clone())) {
                    return;
                }
                match &plan.on_error {
                    Some(hook) => hook(&error),
                    None => warn!(key = %key, error = %error, "request failed"),
                }
            }
        }
    }
}

impl std::fmt::Debug for RequestSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSlot")
            .field("key", &self.request_key())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::transport::MockTransport;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn build_slot(
        config: FetchConfig,
        transport: Arc<MockTransport>,
    ) -> (RequestSlot, Arc<MemoryStore>) {
        let cache = Arc::new(MemoryStore::new());
        let registry = Arc::new(InFlightRegistry::new());
        let slot = RequestSlot::new(
            config,
            transport as Arc<dyn Transport>,
            Arc::clone(&cache) as Arc<dyn CacheStore>,
            registry,
        );
        (slot, cache)
    }

    #[tokio::test]
    async fn test_lazy_slot_stays_idle() {
        let transport = Arc::new(MockTransport::replying(Ok(Response::new(200, "ok"))));
        let config = FetchConfig::get("http://example.com/posts").lazy(true);
        let (slot, _cache) = build_slot(config, Arc::clone(&transport));

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(slot.state().status, Status::Idle);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auto_fire_on_creation_for_get() {
        let transport = Arc::new(MockTransport::replying(Ok(Response::new(200, "body"))));
        let config = FetchConfig::get("http://example.com/posts");
        let (slot, cache) = build_slot(config, Arc::clone(&transport));

        let mut rx = slot.subscribe();
        let state = tokio::time::timeout(
            Duration::from_secs(1),
            rx.wait_for(|state| state.status == Status::Success),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();

        assert_eq!(state.data(), Some("body".into()));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1, "read responses are cached by default");
    }

    #[tokio::test]
    async fn test_manual_fetch_returns_outcome() {
        let transport = Arc::new(MockTransport::replying(Ok(Response::new(200, "manual"))));
        let config = FetchConfig::get("http://example.com").lazy(true);
        let (slot, _cache) = build_slot(config, Arc::clone(&transport));

        let response = slot.do_fetch(FetchOverrides::default()).await.unwrap();

        assert_eq!(response.text(), "manual");
        assert_eq!(slot.state().status, Status::Success);
        assert!(!slot.state().fetching);
    }

    #[tokio::test]
    async fn test_write_response_not_cached_by_default() {
        let transport = Arc::new(MockTransport::replying(Ok(Response::new(201, "created"))));
        let config = FetchConfig::post("http://example.com/posts");
        let (slot, cache) = build_slot(config, Arc::clone(&transport));

        slot.do_fetch(FetchOverrides::default()).await.unwrap();

        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_response_override_enables_write_caching() {
        let transport = Arc::new(MockTransport::replying(Ok(Response::new(201, "created"))));
        let config = FetchConfig::post("http://example.com/posts").cache_response(true);
        let (slot, cache) = build_slot(config, Arc::clone(&transport));

        slot.do_fetch(FetchOverrides::default()).await.unwrap();

        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_non_ok_response_settles_as_error() {
        let errors = Arc::new(AtomicUsize::new(0));
        let errors_seen = Arc::clone(&errors);
        let transport = Arc::new(MockTransport::replying(Ok(Response::new(500, "boom"))));
        let config = FetchConfig::get("http://example.com")
            .lazy(true)
            .on_error(move |error| {
                assert_eq!(error.response().map(|r| r.status), Some(500));
                errors_seen.fetch_add(1, Ordering::SeqCst);
            });
        let (slot, cache) = build_slot(config, Arc::clone(&transport));

        let outcome = slot.do_fetch(FetchOverrides::default()).await;

        assert!(matches!(outcome, Err(FetchError::Status(_))));
        let state = slot.state();
        assert_eq!(state.status, Status::Error);
        assert_eq!(state.response.as_ref().map(|r| r.status), Some(500));
        assert_eq!(errors.load(Ordering::SeqCst), 1, "on_error fires once");
        assert!(cache.is_empty(), "error outcomes are never cached");
    }

    #[tokio::test]
    async fn test_transport_failure_settles_as_error() {
        let transport = Arc::new(MockTransport::replying(Err(TransportError::Http(
            "connection refused".to_string(),
        ))));
        let config = FetchConfig::get("http://example.com").lazy(true);
        let (slot, _cache) = build_slot(config, Arc::clone(&transport));

        let outcome = slot.do_fetch(FetchOverrides::default()).await;

        assert!(matches!(outcome, Err(FetchError::Transport(_))));
        assert_eq!(slot.state().status, Status::Error);
    }

    #[tokio::test]
    async fn test_cache_first_hit_performs_no_transport_call() {
        let transport = Arc::new(MockTransport::replying(Ok(Response::new(200, "fresh"))));
        let config = FetchConfig::get("http://example.com/posts").lazy(true);
        let (slot, cache) = build_slot(config, Arc::clone(&transport));

        let key = derive_key("GET", "http://example.com/posts", &InitOptions::new());
        cache.set(key, Response::new(200, "cached"));

        let response = slot.do_fetch(FetchOverrides::default()).await.unwrap();

        assert_eq!(response.text(), "cached");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(slot.state().status, Status::Success);
    }

    #[tokio::test]
    async fn test_success_hook_receives_response() {
        let successes = Arc::new(AtomicUsize::new(0));
        let successes_seen = Arc::clone(&successes);
        let transport = Arc::new(MockTransport::replying(Ok(Response::new(200, "ok"))));
        let config = FetchConfig::get("http://example.com")
            .lazy(true)
            .on_success(move |response| {
                assert!(response.ok());
                successes_seen.fetch_add(1, Ordering::SeqCst);
            });
        let (slot, _cache) = build_slot(config, Arc::clone(&transport));

        slot.do_fetch(FetchOverrides::default()).await.unwrap();

        assert_eq!(successes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_explicit_request_key_is_exposed() {
        let transport = Arc::new(MockTransport::replying(Ok(Response::new(200, ""))));
        let config = FetchConfig::get("http://example.com")
            .lazy(true)
            .request_key("stable-key")
            .refresh_do_fetch_key("handle-v1");
        let (slot, _cache) = build_slot(config, Arc::clone(&transport));

        assert_eq!(slot.request_key().as_str(), "stable-key");
        assert_eq!(slot.handle_key().as_deref(), Some("handle-v1"));
    }

    #[tokio::test]
    async fn test_set_request_refires_on_key_change() {
        let transport = Arc::new(MockTransport::replying(Ok(Response::new(200, "ok"))));
        let config = FetchConfig::get("http://example.com/posts/1");
        let (slot, _cache) = build_slot(config, Arc::clone(&transport));

        let mut rx = slot.subscribe();
        tokio::time::timeout(
            Duration::from_secs(1),
            rx.wait_for(|state| state.status == Status::Success),
        )
        .await
        .unwrap()
        .unwrap();
        let calls_before = transport.calls.load(Ordering::SeqCst);

        slot.set_request("http://example.com/posts/2", None);

        tokio::time::timeout(Duration::from_secs(1), async {
            while transport.calls.load(Ordering::SeqCst) <= calls_before {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::timeout(
            Duration::from_secs(1),
            rx.wait_for(|state| !state.fetching && state.status == Status::Success),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(transport.calls.load(Ordering::SeqCst) > calls_before);
        assert!(slot.request_key().as_str().contains("/posts/2"));
    }

    #[tokio::test]
    async fn test_overlapping_triggers_settle_on_newest_outcome() {
        let transport = Arc::new(MockTransport::replying(Ok(Response::new(200, "ok"))));
        let config = FetchConfig::get("http://example.com/posts").lazy(true);
        let (slot, _cache) = build_slot(config, Arc::clone(&transport));
        let slot = Arc::new(slot);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let slot = Arc::clone(&slot);
            handles.push(tokio::spawn(async move {
                slot.do_fetch(FetchOverrides::default()).await
            }));
        }
        // Superseded triggers may return aborts to their own callers
        for handle in handles {
            let _ = handle.await.unwrap();
        }

        // The newest trigger's outcome applies; an older trigger
        // resuming late must never cancel it into the error state
        let state = slot.state();
        assert_eq!(state.status, Status::Success);
        assert!(state.error.is_none());
        assert!(!state.fetching);
    }

    #[tokio::test]
    async fn test_set_request_with_same_key_does_not_refire() {
        let transport = Arc::new(MockTransport::replying(Ok(Response::new(200, "ok"))));
        let config = FetchConfig::get("http://example.com/posts").lazy(true);
        let (slot, _cache) = build_slot(config, Arc::clone(&transport));

        slot.set_request("http://example.com/posts", None);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
