//! Transport-level types: responses and transport errors.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// A completed HTTP response.
///
/// The transport returns a `Response` for any structurally valid
/// exchange, including non-2xx statuses; deciding that a non-ok status
/// is an error outcome is the state machine's job, not the transport's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response from a status code and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as UTF-8 text (lossily).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the body is not valid JSON
    /// for the target type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Errors raised by the physical transport.
///
/// Cloneable so a single settled outcome can be broadcast to every
/// deduped waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request could not be performed (connect failure, timeout,
    /// malformed request).
    #[error("HTTP transport error: {0}")]
    Http(String),

    /// The request was cancelled before it settled.
    #[error("request aborted")]
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_ok_for_2xx_only() {
        assert!(Response::new(200, "").ok());
        assert!(Response::new(204, "").ok());
        assert!(Response::new(299, "").ok());
        assert!(!Response::new(199, "").ok());
        assert!(!Response::new(301, "").ok());
        assert!(!Response::new(404, "").ok());
        assert!(!Response::new(500, "").ok());
    }

    #[test]
    fn test_text_decoding() {
        let response = Response::new(200, "hello");
        assert_eq!(response.text(), "hello");
    }

    #[test]
    fn test_json_decoding() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct Post {
            id: u32,
        }

        let response = Response::new(200, r#"{"id": 7}"#);
        assert_eq!(response.json::<Post>().unwrap(), Post { id: 7 });
    }

    #[test]
    fn test_json_decoding_failure() {
        let response = Response::new(200, "not json");
        assert!(response.json::<serde_json::Value>().is_err());
    }

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::Http("connection refused".to_string());
        assert_eq!(error.to_string(), "HTTP transport error: connection refused");
        assert_eq!(TransportError::Aborted.to_string(), "request aborted");
    }
}
