//! Header sets and the per-request/instance merge.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An insertion-ordered set of HTTP headers.
///
/// Header names are case-insensitive and stored lower-case. Inserting an
/// existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndexMap<String, String>", into = "IndexMap<String, String>")]
pub struct HeaderSet {
    entries: IndexMap<String, String>,
}

impl HeaderSet {
    /// Create an empty header set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, returning the set.
    #[must_use]
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a header, returning the previous value for that name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        self.entries
            .insert(name.as_ref().to_ascii_lowercase(), value.into())
    }

    /// Get a header value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Check whether a header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Remove a header.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.shift_remove(&name.to_ascii_lowercase())
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl From<IndexMap<String, String>> for HeaderSet {
    fn from(map: IndexMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<HeaderSet> for IndexMap<String, String> {
    fn from(headers: HeaderSet) -> Self {
        headers.entries
    }
}

/// Merge request-level headers over instance-level headers.
///
/// Global entries are applied first, then local ones; a local entry wins
/// over a global entry with the same name.
pub fn combine(local: Option<&HeaderSet>, global: Option<&HeaderSet>) -> HeaderSet {
    let mut merged = HeaderSet::new();
    for source in [global, local].into_iter().flatten() {
        for (name, value) in source.iter() {
            merged.insert(name, value);
        }
    }
    merged
}
