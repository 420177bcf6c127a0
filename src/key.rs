//! Request identity derivation.
//!
//! Every request invocation is assigned a [`RequestKey`]: a stable
//! string identity derived from the method, URL and the request-shaping
//! options. The key serves three roles at once: cache index, dedupe
//! index, and the change signal that re-fires a slot when its request
//! descriptor changes.
//!
//! Derivation is pure and deterministic: two descriptors with equal
//! inputs always produce equal keys, regardless of header insertion
//! order or name casing. Consumers can also supply an explicit key to
//! keep identity stable across header or body churn.

use crate::request::{normalize_method, Body, InitOptions};

/// Stable identity for a request invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    /// Wraps a consumer-supplied key verbatim, bypassing derivation.
    pub fn explicit(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the request key for a descriptor.
///
/// The canonical form is `METHOD url`, extended with the canonical
/// header pairs (sorted by lower-cased name) and the body text when
/// present. Construction never fails; a body that has no obvious text
/// form is folded in lossily.
pub fn derive_key(method: &str, url: &str, init: &InitOptions) -> RequestKey {
    let mut key = format!("{} {}", normalize_method(method), url);

    let pairs = init.headers.canonical_pairs();
    if !pairs.is_empty() {
        key.push('|');
        for (name, value) in &pairs {
            key.push_str(name);
            key.push('=');
            key.push_str(value);
            key.push(';');
        }
    }

    if let Some(body) = &init.body {
        key.push('|');
        match body {
            Body::Text(text) => key.push_str(text),
            // serde_json sorts object keys, so equal values canonicalize
            // to equal text regardless of construction order
            Body::Json(value) => key.push_str(&value.to_string()),
            Body::Raw(bytes) => key.push_str(&String::from_utf8_lossy(bytes)),
        }
    }

    RequestKey(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::InitOptions;
    use serde_json::json;

    #[test]
    fn test_derive_is_deterministic() {
        let init = InitOptions::new().with_header("Accept", "application/json");

        let first = derive_key("get", "http://example.com/posts", &init);
        let second = derive_key("get", "http://example.com/posts", &init);

        assert_eq!(first, second);
    }

    #[test]
    fn test_method_is_normalized() {
        let init = InitOptions::new();
        assert_eq!(
            derive_key("get", "http://example.com", &init),
            derive_key("GET", "http://example.com", &init),
        );
    }

    #[test]
    fn test_header_order_does_not_change_key() {
        let first = InitOptions::new()
            .with_header("X-A", "1")
            .with_header("X-B", "2");
        let second = InitOptions::new()
            .with_header("x-b", "2")
            .with_header("x-a", "1");

        assert_eq!(
            derive_key("GET", "http://example.com", &first),
            derive_key("GET", "http://example.com", &second),
        );
    }

    #[test]
    fn test_different_urls_produce_different_keys() {
        let init = InitOptions::new();
        assert_ne!(
            derive_key("GET", "http://example.com/a", &init),
            derive_key("GET", "http://example.com/b", &init),
        );
    }

    #[test]
    fn test_different_methods_produce_different_keys() {
        let init = InitOptions::new();
        assert_ne!(
            derive_key("GET", "http://example.com", &init),
            derive_key("POST", "http://example.com", &init),
        );
    }

    #[test]
    fn test_body_changes_key() {
        let without = InitOptions::new();
        let with = InitOptions::new().with_text("payload");

        assert_ne!(
            derive_key("POST", "http://example.com", &without),
            derive_key("POST", "http://example.com", &with),
        );
    }

    #[test]
    fn test_json_body_is_canonical() {
        let init = InitOptions::new().with_json(json!({"b": 2, "a": 1}));
        let key = derive_key("POST", "http://example.com", &init);

        assert!(key.as_str().contains(r#"{"a":1,"b":2}"#));
    }

    #[test]
    fn test_explicit_key_is_used_verbatim() {
        let key = RequestKey::explicit("my-stable-key");
        assert_eq!(key.as_str(), "my-stable-key");
        assert_eq!(key.to_string(), "my-stable-key");
    }

    #[test]
    fn test_key_is_usable_as_map_index() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        let init = InitOptions::new();
        map.insert(derive_key("GET", "http://example.com", &init), 1);

        assert_eq!(map.get(&derive_key("GET", "http://example.com", &init)), Some(&1));
    }
}
