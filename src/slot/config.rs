//! Consumer-facing slot configuration.

use crate::dedupe::DedupeOptions;
use crate::error::FetchError;
use crate::policy::CachePolicy;
use crate::request::{is_read_method, InitOptions};
use crate::transport::Response;
use std::sync::Arc;

/// Notification hook invoked once per settled success.
pub type SuccessHook = Arc<dyn Fn(&Response) + Send + Sync>;

/// Notification hook invoked once per settled error.
pub type ErrorHook = Arc<dyn Fn(&FetchError) + Send + Sync>;

/// Per-slot configuration.
///
/// Constructed with [`FetchConfig::get`] / [`FetchConfig::new`] and
/// refined with the builder methods. All fields have sensible
/// defaults; unset knobs fall back to method-derived behavior.
#[derive(Clone)]
pub struct FetchConfig {
    /// Request URL.
    pub url: String,
    /// Request method (normalized lazily at trigger time).
    pub method: String,
    /// Auto-fire suppression: `None` fires read methods only,
    /// `Some(true)` never fires automatically, `Some(false)` always
    /// does.
    pub lazy: Option<bool>,
    /// Explicit request key, bypassing derivation.
    pub request_key: Option<String>,
    /// Request-shaping options (headers, body).
    pub init: InitOptions,
    /// Deduplication configuration.
    pub dedupe: DedupeOptions,
    /// Explicit cache policy, overriding the method default.
    pub cache_policy: Option<CachePolicy>,
    /// Explicit cache-write override (default: writes for read
    /// methods only).
    pub cache_response: Option<bool>,
    /// Invoked once per settled success. Inert by default.
    pub on_success: Option<SuccessHook>,
    /// Invoked once per settled error. Logs a warning by default.
    pub on_error: Option<ErrorHook>,
    /// Identity marker for the manual-trigger handle. Affects only how
    /// consumers detect handle changes, never behavior.
    pub refresh_do_fetch_key: Option<String>,
}

impl FetchConfig {
    /// Creates a configuration for `method` `url`.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            lazy: None,
            request_key: None,
            init: InitOptions::new(),
            dedupe: DedupeOptions::default(),
            cache_policy: None,
            cache_response: None,
            on_success: None,
            on_error: None,
            refresh_do_fetch_key: None,
        }
    }

    /// Creates a GET configuration.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Creates a POST configuration.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    /// Sets the lazy mode.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = Some(lazy);
        self
    }

    /// Sets an explicit request key, keeping identity stable across
    /// header and body churn.
    pub fn request_key(mut self, key: impl Into<String>) -> Self {
        self.request_key = Some(key.into());
        self
    }

    /// Sets the request-shaping options.
    pub fn init(mut self, init: InitOptions) -> Self {
        self.init = init;
        self
    }

    /// Sets the dedupe configuration.
    pub fn dedupe(mut self, dedupe: DedupeOptions) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// Overrides the cache policy.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = Some(policy);
        self
    }

    /// Overrides whether successful responses are written to the cache.
    pub fn cache_response(mut self, enabled: bool) -> Self {
        self.cache_response = Some(enabled);
        self
    }

    /// Sets the success hook.
    pub fn on_success(mut self, hook: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    /// Sets the error hook.
    pub fn on_error(mut self, hook: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Sets the manual-trigger handle identity marker.
    pub fn refresh_do_fetch_key(mut self, key: impl Into<String>) -> Self {
        self.refresh_do_fetch_key = Some(key.into());
        self
    }

    /// Returns true if this configuration auto-fires on creation and
    /// on key change.
    ///
    /// `method` must already be normalized.
    pub fn should_auto_fire(&self, method: &str) -> bool {
        match self.lazy {
            Some(true) => false,
            Some(false) => true,
            None => is_read_method(method),
        }
    }
}

impl std::fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchConfig")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("lazy", &self.lazy)
            .field("request_key", &self.request_key)
            .field("dedupe", &self.dedupe)
            .field("cache_policy", &self.cache_policy)
            .field("cache_response", &self.cache_response)
            .field("has_on_success", &self.on_success.is_some())
            .field("has_on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Per-call overrides for a manual trigger.
///
/// Shallow-merged over the slot's base configuration: a field that is
/// present replaces its base counterpart wholesale, for that single
/// call only.
#[derive(Debug, Clone, Default)]
pub struct FetchOverrides {
    /// Replacement request-shaping options.
    pub init: Option<InitOptions>,
    /// Replacement dedupe configuration.
    pub dedupe: Option<DedupeOptions>,
}

impl FetchOverrides {
    /// Creates empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the request-shaping options for this call.
    pub fn init(mut self, init: InitOptions) -> Self {
        self.init = Some(init);
        self
    }

    /// Replaces the dedupe configuration for this call.
    pub fn dedupe(mut self, dedupe: DedupeOptions) -> Self {
        self.dedupe = Some(dedupe);
        self
    }
}
