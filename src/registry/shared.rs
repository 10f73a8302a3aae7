//! Thread-safe registry handle.
//!
//! The registry sits behind a single `RwLock`: applies take the write lock
//! (single writer, which also serializes applies per identifier), readers
//! take the read lock and receive clones so they never hold the lock while
//! rendering.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{PlottrError, PlottrResult};
use crate::structure::{ArrayShape, StructuredDataset};
use crate::wire::WireMessage;

use super::feed::{ChangeFeed, ChangeFeedConfig, ChangeStream};
use super::{DatasetRegistry, RegistryChange, RegistryEntry};

fn lock_err(context: &'static str) -> PlottrError {
    PlottrError::internal(format!("poisoned lock: {context}"))
}

/// Cloneable handle to one registry and its change feed.
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    inner: Arc<RwLock<DatasetRegistry>>,
    feed: Arc<ChangeFeed>,
}

impl SharedRegistry {
    /// Creates an empty registry with its own change feed.
    #[must_use]
    pub fn new(cfg: ChangeFeedConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(DatasetRegistry::new())),
            feed: Arc::new(ChangeFeed::new(cfg)),
        }
    }

    fn read(&self) -> PlottrResult<RwLockReadGuard<'_, DatasetRegistry>> {
        self.inner.read().map_err(|_| lock_err("registry read"))
    }

    fn write(&self) -> PlottrResult<RwLockWriteGuard<'_, DatasetRegistry>> {
        self.inner.write().map_err(|_| lock_err("registry write"))
    }

    /// Apply a message and publish the resulting change.
    ///
    /// The change is published before the write lock is released, so
    /// subscribers see changes in apply order even with several writers.
    pub fn apply(&self, dataset_id: &str, message: &WireMessage, is_update: bool) -> PlottrResult<RegistryChange> {
        let mut registry = self.write()?;
        let change = registry.apply(dataset_id, message, is_update)?;
        // Publishing never blocks, so holding the guard here is cheap.
        self.feed.publish(&change);
        drop(registry);
        Ok(change)
    }

    /// Current state of one array.
    pub fn get_structured_dataset(&self, dataset_id: &str, array: &str) -> PlottrResult<Option<StructuredDataset>> {
        Ok(self.read()?.get_structured_dataset(dataset_id, array).cloned())
    }

    /// Snapshot of a whole entry.
    pub fn entry(&self, dataset_id: &str) -> PlottrResult<Option<RegistryEntry>> {
        Ok(self.read()?.entry(dataset_id).cloned())
    }

    /// Shape metadata of an entry.
    pub fn shape(&self, dataset_id: &str) -> PlottrResult<Option<Vec<ArrayShape>>> {
        Ok(self.read()?.shape(dataset_id))
    }

    /// Known identifiers, sorted.
    pub fn dataset_ids(&self) -> PlottrResult<Vec<String>> {
        Ok(self.read()?.dataset_ids())
    }

    /// Run a closure against the registry under the read lock.
    pub fn with_registry<T>(&self, f: impl FnOnce(&DatasetRegistry) -> T) -> PlottrResult<T> {
        let guard = self.read()?;
        Ok(f(&*guard))
    }

    /// Remove an entry.
    pub fn evict(&self, dataset_id: &str) -> PlottrResult<Option<RegistryEntry>> {
        Ok(self.write()?.evict(dataset_id))
    }

    /// Remove every entry.
    pub fn clear(&self) -> PlottrResult<()> {
        self.write()?.clear();
        Ok(())
    }

    /// Subscribe to change notifications.
    ///
    /// Notifications arrive in apply order; a full buffer skips some.
    pub fn subscribe(&self) -> ChangeStream {
        self.feed.subscribe()
    }

    /// The change feed, for drop counters and subscriber counts.
    #[must_use]
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new(ChangeFeedConfig::default())
    }
}
