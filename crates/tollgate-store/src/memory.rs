//! In-memory [`VersionedStore`].
//!
//! Not durable - data is lost on restart.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use tollgate_types::Version;

use crate::{StoreError, Versioned, VersionedStore};

/// Thread-safe in-memory store.
///
/// A single `RwLock` makes each operation atomic; the version check and the
/// write of `conditional_put` happen under the same write guard.
pub struct InMemoryStore<K, V> {
    records: RwLock<BTreeMap<K, Versioned<V>>>,
    /// Statistics (AtomicU64 so readers do not need the write lock)
    creates: AtomicU64,
    updates: AtomicU64,
    conflicts: AtomicU64,
}

/// Counters describing store traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub records: usize,
    pub creates: u64,
    pub updates: u64,
    /// Writes refused because of a stale version or an existing key.
    pub conflicts: u64,
}

impl<K, V> InMemoryStore<K, V> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            creates: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> StoreStats {
        let records = self.records.read().map_or(0, |records| records.len());
        StoreStats {
            records,
            creates: self.creates.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }

    fn conflict(&self, err: StoreError) -> StoreError {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
        err
    }
}

impl<K, V> Default for InMemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("record lock poisoned".to_string())
}

impl<K, V> VersionedStore<K, V> for InMemoryStore<K, V>
where
    K: Ord + Clone + Display + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Result<Option<Versioned<V>>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(key).cloned())
    }

    fn create(&self, key: K, value: V) -> Result<Version, StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        if records.contains_key(&key) {
            return Err(self.conflict(StoreError::already_exists(&key)));
        }
        records.insert(key, Versioned::new(value, Version::INITIAL));
        self.creates.fetch_add(1, Ordering::Relaxed);
        Ok(Version::INITIAL)
    }

    fn conditional_put(
        &self,
        key: &K,
        expected: Version,
        value: V,
    ) -> Result<Version, StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let current = records.get_mut(key).ok_or_else(|| StoreError::not_found(key))?;

        if current.version != expected {
            let actual = current.version;
            tracing::debug!(%key, %expected, %actual, "conditional write refused");
            return Err(self.conflict(StoreError::VersionConflict {
                key: key.to_string(),
                expected,
                actual,
            }));
        }

        let next = expected.next();
        *current = Versioned::new(value, next);
        self.updates.fetch_add(1, Ordering::Relaxed);

        // Postcondition: versions strictly increase
        debug_assert!(next > expected);
        Ok(next)
    }

    fn list(&self) -> Result<Vec<(K, Versioned<V>)>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect())
    }
}
