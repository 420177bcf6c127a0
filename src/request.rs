//! Request shaping: method normalization and body serialization.
//!
//! A consumer describes a request with a URL, a method string and
//! [`InitOptions`]. Before transmission the descriptor is shaped into a
//! [`ShapedRequest`]: the method is normalized to upper-case, the
//! read/write classification is decided, and structured bodies are
//! serialized to their JSON text form when the content type calls for
//! it.

use crate::error::FetchError;
use crate::headers::{HeaderLookup, HeaderMap};
use bytes::Bytes;
use tracing::trace;

/// Methods classified as "read": safe to auto-fire and cache by default.
pub const READ_METHODS: [&str; 3] = ["GET", "HEAD", "OPTIONS"];

/// Normalizes a method string to its canonical upper-case form.
///
/// Normalization happens once per invocation; all downstream
/// comparisons (read/write classification, key derivation) operate on
/// the normalized form.
pub fn normalize_method(method: &str) -> String {
    method.trim().to_ascii_uppercase()
}

/// Returns true if the (normalized) method is a read method.
///
/// Read methods are {GET, HEAD, OPTIONS}; everything else is a write.
pub fn is_read_method(method: &str) -> bool {
    READ_METHODS.contains(&method)
}

/// Request body supplied by the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Plain text, transmitted unchanged.
    Text(String),
    /// Structured value, serialized to JSON text before transmission.
    Json(serde_json::Value),
    /// Raw bytes, transmitted unchanged.
    Raw(Bytes),
}

/// Request-shaping options: headers and an optional body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitOptions {
    /// Request headers.
    pub headers: HeaderMap,
    /// Optional request body.
    pub body: Option<Body>,
}

impl InitOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header (builder style).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a structured JSON body and the matching content type.
    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.headers.insert("Content-Type", "application/json");
        self.body = Some(Body::Json(value));
        self
    }

    /// Sets a plain text body.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(Body::Text(text.into()));
        self
    }

    /// Sets a raw byte body.
    pub fn with_raw(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Some(Body::Raw(bytes.into()));
        self
    }
}

/// Returns true if the header collection declares a JSON payload.
///
/// The lookup is case-insensitive on the header name and the match is a
/// substring match on the value, so `application/json; charset=utf-8`
/// qualifies. A missing or empty header collection is simply "no
/// match".
pub fn is_json_content_type(headers: &impl HeaderLookup) -> bool {
    headers
        .lookup("content-type")
        .map(|value| value.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false)
}

/// A fully shaped request, ready for the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedRequest {
    /// Normalized (upper-case) method.
    pub method: String,
    /// Request URL.
    pub url: String,
    /// Headers in insertion order.
    pub headers: Vec<(String, String)>,
    /// Serialized body, if any.
    pub body: Option<Bytes>,
}

/// Shapes a request descriptor for transmission.
///
/// Structured ([`Body::Json`]) bodies are serialized to compact JSON
/// text; text and raw bodies pass through unchanged.
///
/// # Errors
///
/// Returns [`FetchError::Config`] if a structured body cannot be
/// serialized.
pub fn shape_request(
    method: &str,
    url: &str,
    init: &InitOptions,
) -> Result<ShapedRequest, FetchError> {
    let method = normalize_method(method);
    let body = match &init.body {
        None => None,
        Some(Body::Text(text)) => Some(Bytes::from(text.clone())),
        Some(Body::Raw(bytes)) => Some(bytes.clone()),
        Some(Body::Json(value)) => {
            if !is_json_content_type(&init.headers) {
                trace!(url = url, "structured body without json content-type");
            }
            let text = serde_json::to_string(value)
                .map_err(|e| FetchError::Config(format!("unserializable body: {}", e)))?;
            Some(Bytes::from(text))
        }
    };

    Ok(ShapedRequest {
        method,
        url: url.to_string(),
        headers: init
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        body,
    })
}
