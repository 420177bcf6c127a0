//! Case-insensitive header access.
//!
//! Request headers arrive in two shapes: the crate's own ordered
//! [`HeaderMap`] and plain string maps supplied by callers. Both are
//! unified behind the [`HeaderLookup`] capability so the request shaper
//! can look up headers (e.g. `Content-Type`) without caring which
//! representation it was handed.

use std::collections::HashMap;

/// Capability for case-insensitive header lookup.
///
/// An empty or missing header collection is a valid input: lookups
/// simply return `None`, they never fail.
pub trait HeaderLookup {
    /// Returns the value for `name`, compared case-insensitively.
    fn lookup(&self, name: &str) -> Option<&str>;
}

/// Ordered header collection with case-insensitive access.
///
/// Insertion order is preserved for transmission; lookups and the
/// canonical form used for key derivation are case-insensitive on the
/// header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts a header, replacing any existing header with the same
    /// name (compared case-insensitively).
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Returns the value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no headers are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns headers as `(lowercased name, value)` pairs sorted by
    /// name.
    ///
    /// This is the canonical form used by the key builder: two maps with
    /// the same headers in different insertion order or name casing
    /// produce identical canonical pairs.
    pub fn canonical_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .entries
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
            .collect();
        pairs.sort();
        pairs
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

impl HeaderLookup for HeaderMap {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

impl HeaderLookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
