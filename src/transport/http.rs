//! HTTP transport abstraction.
//!
//! The transport is the injected capability that performs physical
//! network I/O. It is expressed as an object-safe trait so the rest of
//! the crate can hold it behind `Arc<dyn Transport>`; implementations
//! return boxed futures. The production implementation is backed by
//! `reqwest`; tests inject mocks.

use super::types::{Response, TransportError};
use crate::request::ShapedRequest;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Capability that performs the physical request.
///
/// Implementations must be cancellation-aware: when `cancel` fires
/// before the exchange settles, the returned future resolves to
/// [`TransportError::Aborted`] instead of running to completion.
/// Non-2xx statuses are NOT transport errors; they come back as
/// ordinary [`Response`] values.
pub trait Transport: Send + Sync {
    /// Performs the request described by `request`.
    fn send<'a>(
        &'a self,
        request: &'a ShapedRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Response, TransportError>>;
}

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Production transport backed by an async `reqwest` client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the underlying client cannot
    /// be constructed.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a transport with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the underlying client cannot
    /// be constructed.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TransportError::Http(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: &'a ShapedRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Response, TransportError>> {
        Box::pin(async move {
            trace!(method = %request.method, url = %request.url, "sending request");

            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|e| TransportError::Http(format!("invalid method: {}", e)))?;

            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let exchange = async {
                let response = builder.send().await.map_err(|e| {
                    warn!(url = %request.url, error = %e, "request failed");
                    TransportError::Http(format!("request failed: {}", e))
                })?;

                let status = response.status().as_u16();
                debug!(url = %request.url, status = status, "response received");

                let body = response.bytes().await.map_err(|e| {
                    TransportError::Http(format!("failed to read response body: {}", e))
                })?;

                Ok(Response::new(status, body))
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(url = %request.url, "request cancelled");
                    Err(TransportError::Aborted)
                }
                result = exchange => result,
            }
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::request::{shape_request, InitOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock transport that replays a fixed outcome and counts calls.
    pub struct MockTransport {
        pub outcome: Result<Response, TransportError>,
        pub calls: AtomicUsize,
        pub seen: Mutex<Vec<ShapedRequest>>,
    }

    impl MockTransport {
        pub fn replying(outcome: Result<Response, TransportError>) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for MockTransport {
        fn send<'a>(
            &'a self,
            request: &'a ShapedRequest,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, Result<Response, TransportError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            let outcome = self.outcome.clone();
            Box::pin(async move { outcome })
        }
    }

    fn shaped(method: &str, url: &str) -> ShapedRequest {
        shape_request(method, url, &InitOptions::new()).unwrap()
    }

    #[tokio::test]
    async fn test_mock_transport_success() {
        let transport = MockTransport::replying(Ok(Response::new(200, "ok")));
        let request = shaped("GET", "http://example.com");
        let cancel = CancellationToken::new();

        let response = transport.send(&request, &cancel).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mock_transport_captures_request() {
        let transport = MockTransport::replying(Ok(Response::new(200, "")));
        let request = shaped("POST", "http://example.com/posts");
        let cancel = CancellationToken::new();

        let _ = transport.send(&request, &cancel).await;

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "POST");
    }

    #[tokio::test]
    async fn test_mock_transport_error() {
        let transport =
            MockTransport::replying(Err(TransportError::Http("refused".to_string())));
        let request = shaped("GET", "http://example.com");
        let cancel = CancellationToken::new();

        assert!(transport.send(&request, &cancel).await.is_err());
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new().is_ok());
        assert!(ReqwestTransport::with_timeout(5).is_ok());
    }
}
