//! Persistence of named instances.

use crate::config::Instance;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Error during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No instance stored under the name.
    #[error("Instance not found: {0}")]
    NotFound(String),

    /// Other error.
    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Create a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Key/value storage for instances.
pub trait ConfigStore: Send + Sync {
    /// Store an instance, replacing any under the same name.
    fn put(&self, name: &str, instance: Arc<Instance>) -> Result<(), StoreError>;

    /// Fetch an instance. A miss is an error.
    fn get(&self, name: &str) -> Result<Arc<Instance>, StoreError>;

    /// Remove an instance, returning it if present.
    fn remove(&self, name: &str) -> Result<Option<Arc<Instance>>, StoreError>;

    /// List stored names.
    fn names(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory instance store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    instances: Arc<RwLock<HashMap<String, Arc<Instance>>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored instances.
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.instances.write().clear();
    }
}

impl ConfigStore for InMemoryStore {
    fn put(&self, name: &str, instance: Arc<Instance>) -> Result<(), StoreError> {
        self.instances.write().insert(name.to_string(), instance);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Arc<Instance>, StoreError> {
        self.instances
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(name))
    }

    fn remove(&self, name: &str) -> Result<Option<Arc<Instance>>, StoreError> {
        Ok(self.instances.write().remove(name))
    }

    fn names(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<_> = self.instances.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let store = InMemoryStore::new();
        assert!(matches!(store.get("a"), Err(StoreError::NotFound(_))));

        store.put("a", Arc::new(Instance::default_named("a"))).unwrap();
        assert_eq!(store.get("a").unwrap().name(), "a");
        assert_eq!(store.len(), 1);

        let removed = store.remove("a").unwrap();
        assert!(removed.is_some());
        assert!(store.is_empty());
        assert!(store.remove("a").unwrap().is_none());
    }

    #[test]
    fn test_put_replaces() {
        let store = InMemoryStore::new();
        let first = Arc::new(Instance::default_named("a"));
        let second = Arc::new(Instance::default_named("a"));

        store.put("a", first.clone()).unwrap();
        store.put("a", second.clone()).unwrap();

        assert!(Arc::ptr_eq(&store.get("a").unwrap(), &second));
        assert_eq!(store.names().unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn test_clones_share_storage() {
        let store = InMemoryStore::new();
        let clone = store.clone();
        clone.put("b", Arc::new(Instance::default_named("b"))).unwrap();
        assert!(store.get("b").is_ok());
        store.clear();
        assert!(clone.is_empty());
    }
}
