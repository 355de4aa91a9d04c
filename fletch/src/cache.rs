//! Optional response caching.
//!
//! A request carrying a [`CachePolicy`] is looked up before dispatch. A
//! fresh entry short-circuits the request as a success; successful
//! responses are recorded under the instance name, the resolved path and
//! the expiry instant.

use crate::response::EvaluatedResponse;
use crate::store::StoreError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fletch_core::{cache_key, ResponseBody};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// How long a successful response may be served from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePolicy {
    /// Instant after which the entry is stale.
    pub expires_at: DateTime<Utc>,
}

impl CachePolicy {
    /// Cache until an absolute instant.
    pub fn until(expires_at: DateTime<Utc>) -> Self {
        Self { expires_at }
    }

    /// Cache for a duration from now.
    pub fn for_duration(ttl: Duration) -> Self {
        let expires_at = ChronoDuration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { expires_at }
    }

    /// Whether the policy is still fresh at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Whether the policy is still fresh.
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    /// Key for `path` on `instance`.
    pub fn key(&self, instance: &str, path: &str) -> String {
        cache_key(instance, path, self.expires_at.timestamp_millis())
    }
}

/// A stored response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    /// Status code of the original response.
    pub status_code: u16,
    /// Body of the original response.
    pub body: ResponseBody,
    /// Instant after which the entry is stale.
    pub expires_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Capture a successful response.
    pub fn capture(response: &EvaluatedResponse, policy: &CachePolicy) -> Self {
        Self {
            status_code: response.status_code,
            body: response.body.clone(),
            expires_at: policy.expires_at,
        }
    }

    /// Whether the entry is still fresh at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Storage for cached responses.
pub trait ResponseCache: Send + Sync {
    /// Get an entry by key.
    fn get(&self, key: &str) -> Result<Option<CachedResponse>, StoreError>;

    /// Store an entry, replacing any previous one.
    fn put(&self, key: &str, entry: CachedResponse) -> Result<(), StoreError>;

    /// Remove an entry.
    fn remove(&self, key: &str) -> Result<Option<CachedResponse>, StoreError>;
}

/// In-memory response cache.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CachedResponse>>>,
}

impl InMemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ResponseCache for InMemoryCache {
    fn get(&self, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, entry: CachedResponse) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        Ok(self.entries.write().remove(key))
    }
}

/// Look up a fresh entry, evicting it if it has expired.
pub(crate) fn lookup(
    cache: &dyn ResponseCache,
    key: &str,
) -> Result<Option<CachedResponse>, StoreError> {
    match cache.get(key)? {
        Some(entry) if entry.is_fresh_at(Utc::now()) => Ok(Some(entry)),
        Some(_) => {
            cache.remove(key)?;
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Record a successful response.
pub(crate) fn record(
    cache: &dyn ResponseCache,
    key: &str,
    response: &EvaluatedResponse,
    policy: &CachePolicy,
) -> Result<(), StoreError> {
    if !response.success || !policy.is_fresh() {
        return Ok(());
    }
    cache.put(key, CachedResponse::capture(response, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use fletch_core::RawResponse;
    use pretty_assertions::assert_eq;

    fn success() -> EvaluatedResponse {
        EvaluatedResponse::evaluate(
            RawResponse::new(200, "cached"),
            Request::get("/users"),
            &["200-299".into()],
        )
    }

    #[test]
    fn test_policy_key() {
        let expires_at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();
        let policy = CachePolicy::until(expires_at);
        assert_eq!(policy.key("api", "/users"), "api-/users-1700000000000");
    }

    #[test]
    fn test_policy_freshness() {
        let now = Utc::now();
        let policy = CachePolicy::until(now + ChronoDuration::seconds(5));
        assert!(policy.is_fresh_at(now));
        assert!(!policy.is_fresh_at(now + ChronoDuration::seconds(5)));
        assert!(CachePolicy::for_duration(Duration::from_secs(60)).is_fresh());
    }

    #[test]
    fn test_record_then_lookup() {
        let cache = InMemoryCache::new();
        let policy = CachePolicy::for_duration(Duration::from_secs(60));
        let key = policy.key("api", "/users");

        record(&cache, &key, &success(), &policy).unwrap();
        let entry = lookup(&cache, &key).unwrap().unwrap();

        assert_eq!(entry.status_code, 200);
        assert_eq!(entry.body, ResponseBody::Text("cached".into()));
    }

    #[test]
    fn test_failures_are_not_recorded() {
        let cache = InMemoryCache::new();
        let policy = CachePolicy::for_duration(Duration::from_secs(60));
        let mut failure = success();
        failure.success = false;

        record(&cache, "k", &failure, &policy).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_are_evicted() {
        let cache = InMemoryCache::new();
        let expired = CachedResponse {
            status_code: 200,
            body: ResponseBody::Text("old".into()),
            expires_at: Utc::now() - ChronoDuration::seconds(1),
        };
        cache.put("k", expired).unwrap();

        assert_eq!(lookup(&cache, "k").unwrap(), None);
        assert!(cache.is_empty());
    }
}
