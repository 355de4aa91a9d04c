//! Registry of named instances.
//!
//! The registry sits over a [`ConfigStore`] and guarantees one instance per
//! name. Looking up a name that is not stored, or that the store fails to
//! produce, creates and stores a default instance under that name.

use crate::config::{Instance, InstanceOptions};
use crate::error::Result;
use crate::store::{ConfigStore, InMemoryStore};
use fletch_core::{resolve_instance_name, validate_instance_name};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Named instance registry.
pub struct Registry {
    store: Arc<dyn ConfigStore>,
    create_lock: Mutex<()>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a registry over an in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    /// Create a registry over a custom store.
    pub fn with_store(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            create_lock: Mutex::new(()),
        }
    }

    /// Build an instance from options and store it, replacing any instance
    /// of the same name.
    pub fn configure(&self, options: InstanceOptions) -> Result<Arc<Instance>> {
        let name = resolve_instance_name(options.instance_name.as_deref()).to_string();
        validate_instance_name(&name)?;

        let instance = Arc::new(Instance::new(name.clone(), options.into_config()));
        self.store.put(&name, instance.clone())?;
        debug!(instance = %name, "Configured instance");
        Ok(instance)
    }

    /// Look up an instance, creating a default one on a miss.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<Instance>> {
        let name = resolve_instance_name(name);
        if let Ok(instance) = self.store.get(name) {
            return Ok(instance);
        }

        let _guard = self.create_lock.lock();
        match self.store.get(name) {
            Ok(instance) => Ok(instance),
            Err(err) => {
                warn!(
                    instance = %name,
                    error = %err,
                    "No active instance found, creating a default one"
                );
                self.configure(InstanceOptions::named(name))
            }
        }
    }

    /// Remove an instance.
    pub fn remove(&self, name: Option<&str>) -> Result<Option<Arc<Instance>>> {
        Ok(self.store.remove(resolve_instance_name(name))?)
    }

    /// List the stored instance names.
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.store.names()?)
    }
}
