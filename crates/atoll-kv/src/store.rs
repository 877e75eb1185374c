//! LWW register map keyed by string.

use std::collections::HashMap;

use atoll_clock::Timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A value plus the HLC timestamp of the write that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedValue {
    /// Application payload.
    pub data: String,
    /// When the write happened, per the writer's clock.
    pub ts: Timestamp,
}

/// In-memory last-writer-wins store.
///
/// Safe for concurrent use. Conflict resolution is conservative: an
/// incoming write replaces the incumbent only when its timestamp is
/// [`definitely_after`](Timestamp::definitely_after) the incumbent's.
#[derive(Default)]
pub struct LwwStore {
    data: Mutex<HashMap<String, VersionedValue>>,
}

impl LwwStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a local or replicated write.
    ///
    /// Absent keys always accept; present keys keep the incumbent unless
    /// the incoming timestamp is unambiguously newer.
    pub fn apply(&self, key: impl Into<String>, value: VersionedValue) {
        let mut data = self.data.lock();
        match data.entry(key.into()) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                if value.ts.definitely_after(&slot.get().ts) {
                    slot.insert(value);
                }
            }
        }
    }

    /// Current value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<VersionedValue> {
        self.data.lock().get(key).cloned()
    }

    /// Copy of the full store contents.
    pub fn snapshot(&self) -> HashMap<String, VersionedValue> {
        self.data.lock().clone()
    }

    /// Number of keys in the store.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}
