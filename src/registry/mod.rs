//! Dataset registry.
//!
//! Maps dataset identifiers to their structured datasets and owns the
//! dataset lifecycle: an entry is created by the first message for an
//! identifier and updated by every later one, either by full reset
//! (`update: false`) or by merge (`update: true`). Entries are only removed
//! by explicit eviction.

/// Change notification fan-out.
pub mod feed;
/// Lock-guarded registry handle shared between threads.
pub mod shared;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::structure::{structure_arrays, ArrayShape, StructuredDataset};
use crate::wire::WireMessage;

pub use feed::{ChangeFeed, ChangeFeedConfig, ChangeStream, SubscriptionId};
pub use shared::SharedRegistry;

/// How an apply changed an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// First message for this identifier.
    Created,
    /// Full reset: prior arrays were discarded.
    Replaced,
    /// Incoming arrays were merged into the existing ones.
    Merged,
    /// Message carried no arrays; only the update timestamp moved.
    Touched,
}

/// Notification emitted after a successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryChange {
    /// Identifier of the changed entry.
    pub dataset_id: String,
    /// What the apply did.
    pub kind: ChangeKind,
    /// Arrays whose content changed with this apply.
    pub changed_arrays: Vec<String>,
    /// Shape of every array of the entry after the apply.
    pub shape: Vec<ArrayShape>,
    /// Entry revision after the apply.
    pub revision: u64,
    /// When the apply happened.
    pub timestamp: DateTime<Utc>,
}

/// State kept for one dataset identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    datasets: BTreeMap<String, StructuredDataset>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    revision: u64,
}

impl RegistryEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            datasets: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Structured dataset for a data array name.
    #[must_use]
    pub fn dataset(&self, array: &str) -> Option<&StructuredDataset> {
        self.datasets.get(array)
    }

    /// All structured datasets, keyed by array name.
    #[must_use]
    pub fn datasets(&self) -> &BTreeMap<String, StructuredDataset> {
        &self.datasets
    }

    /// Shape of every array, in name order.
    #[must_use]
    pub fn shape(&self) -> Vec<ArrayShape> {
        self.datasets.values().map(StructuredDataset::shape).collect()
    }

    /// Time of the first apply.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the latest apply.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Number of successful applies so far.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }
}

/// Process-wide map from dataset identifier to its current state.
///
/// Not synchronized itself; wrap it in [`SharedRegistry`] when more than one
/// thread needs access.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl DatasetRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a message to the entry for `dataset_id`.
    ///
    /// With `is_update == false` the structured arrays of the message replace
    /// the entry's arrays entirely. With `is_update == true` each array is
    /// merged into the existing array of the same name (or added if new).
    ///
    /// A message without arrays (`datasets` absent or empty) creates an
    /// empty entry for a new identifier and otherwise only touches it.
    ///
    /// All structuring and merge checks run before anything is mutated, so
    /// an error leaves the registry exactly as it was.
    ///
    /// # Errors
    /// `SchemaError` from structuring or from a merge axis-order conflict.
    pub fn apply(
        &mut self,
        dataset_id: &str,
        message: &WireMessage,
        is_update: bool,
    ) -> Result<RegistryChange, SchemaError> {
        // An empty `datasets` map carries no structure, same as an absent one.
        let incoming = match message.datasets.as_ref().filter(|arrays| !arrays.is_empty()) {
            Some(arrays) => Some(structure_arrays(arrays)?),
            None => None,
        };

        if is_update {
            if let (Some(entry), Some(datasets)) = (self.entries.get(dataset_id), &incoming) {
                for ds in datasets {
                    if let Some(current) = entry.datasets.get(ds.name()) {
                        current.check_mergeable(ds)?;
                    }
                }
            }
        }

        let now = Utc::now();
        let created = !self.entries.contains_key(dataset_id);
        let entry = self
            .entries
            .entry(dataset_id.to_string())
            .or_insert_with(|| RegistryEntry::new(now));

        let mut changed_arrays = Vec::new();
        let kind = match incoming {
            None => {
                if created {
                    ChangeKind::Created
                } else {
                    ChangeKind::Touched
                }
            }
            Some(datasets) if created || !is_update => {
                let previous = std::mem::take(&mut entry.datasets);
                changed_arrays.extend(previous.into_keys());
                for ds in datasets {
                    changed_arrays.push(ds.name().to_string());
                    entry.datasets.insert(ds.name().to_string(), ds);
                }
                changed_arrays.sort();
                changed_arrays.dedup();
                if created {
                    ChangeKind::Created
                } else {
                    ChangeKind::Replaced
                }
            }
            Some(datasets) => {
                for ds in datasets {
                    let name = ds.name().to_string();
                    match entry.datasets.get_mut(&name) {
                        Some(current) => {
                            current.merge_from(ds)?;
                        }
                        None => {
                            entry.datasets.insert(name.clone(), ds);
                        }
                    }
                    changed_arrays.push(name);
                }
                ChangeKind::Merged
            }
        };

        entry.updated_at = now;
        entry.revision += 1;

        Ok(RegistryChange {
            dataset_id: dataset_id.to_string(),
            kind,
            changed_arrays,
            shape: entry.shape(),
            revision: entry.revision,
            timestamp: now,
        })
    }

    /// Apply a message using its own identifier and update flag.
    pub fn apply_message(&mut self, message: &WireMessage) -> Result<RegistryChange, SchemaError> {
        self.apply(&message.id, message, message.update)
    }

    /// Read-only access to one structured dataset.
    #[must_use]
    pub fn get_structured_dataset(&self, dataset_id: &str, array: &str) -> Option<&StructuredDataset> {
        self.entries.get(dataset_id)?.dataset(array)
    }

    /// Entry for an identifier.
    #[must_use]
    pub fn entry(&self, dataset_id: &str) -> Option<&RegistryEntry> {
        self.entries.get(dataset_id)
    }

    /// Shape metadata of an entry.
    #[must_use]
    pub fn shape(&self, dataset_id: &str) -> Option<Vec<ArrayShape>> {
        self.entries.get(dataset_id).map(RegistryEntry::shape)
    }

    /// Known identifiers, sorted.
    #[must_use]
    pub fn dataset_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether an entry exists.
    #[must_use]
    pub fn contains(&self, dataset_id: &str) -> bool {
        self.entries.contains_key(dataset_id)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove an entry.
    pub fn evict(&mut self, dataset_id: &str) -> Option<RegistryEntry> {
        self.entries.remove(dataset_id)
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
