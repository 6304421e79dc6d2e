//! Concurrent entry registry.
//!
//! Maps entry names to shared [`Entry`] handles. Readers take cheap
//! snapshots (cloned `Arc`s) so that scans and listings never hold the lock
//! while evaluating schedules or sorting.

use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::entry::Entry;

/// Thread-safe name -> entry map.
///
/// Critical sections never run caller code, so a poisoned lock still guards
/// a consistent map and is recovered rather than propagated.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, Arc<Entry>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Entry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Entry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `entry` unless its name is taken.
    ///
    /// On collision the rejected entry is handed back.
    pub fn insert(&self, entry: Entry) -> Result<Arc<Entry>, Entry> {
        let mut entries = self.write();
        match entries.entry(entry.name().to_string()) {
            MapEntry::Occupied(_) => Err(entry),
            MapEntry::Vacant(slot) => Ok(Arc::clone(slot.insert(Arc::new(entry)))),
        }
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<Arc<Entry>> {
        self.read().get(name).cloned()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Remove an entry by name.
    pub fn remove(&self, name: &str) -> Option<Arc<Entry>> {
        self.write().remove(name)
    }

    /// Remove `entry` only if it is still the instance registered under its name.
    pub fn remove_entry(&self, entry: &Arc<Entry>) -> bool {
        let mut entries = self.write();
        match entries.get(entry.name()) {
            Some(current) if Arc::ptr_eq(current, entry) => {
                entries.remove(entry.name());
                true
            }
            _ => false,
        }
    }

    /// Remove several entries under a single write lock.
    ///
    /// Returns the entries that were actually removed.
    pub fn remove_batch(&self, batch: &[Arc<Entry>]) -> Vec<Arc<Entry>> {
        if batch.is_empty() {
            return Vec::new();
        }
        let mut entries = self.write();
        let mut removed = Vec::new();
        for entry in batch {
            let is_current = entries
                .get(entry.name())
                .is_some_and(|current| Arc::ptr_eq(current, entry));
            if !is_current {
                continue;
            }
            if let Some(entry) = entries.remove(entry.name()) {
                removed.push(entry);
            }
        }
        removed
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Unordered snapshot of every entry.
    pub fn snapshot(&self) -> Vec<Arc<Entry>> {
        self.read().values().cloned().collect()
    }

    /// Snapshot ordered ascending by registration time.
    pub fn sorted(&self) -> Vec<Arc<Entry>> {
        let mut entries = self.snapshot();
        entries.sort_by_key(|e| e.order_key());
        entries
    }
}
