//! Bounded read-modify-conditional-write.

use std::fmt::Display;

use crate::{StoreError, Versioned, VersionedStore};

/// What a computation decided to do with the record it was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<V, T> {
    /// Persist `value`; `output` is returned once the write commits.
    Write { value: V, output: T },
    /// Nothing to persist.
    Skip(T),
}

/// Reads `key`, lets `compute` decide the successor, and writes it back
/// conditionally on the version that was read.
///
/// A missing record is created; an existing one is replaced with
/// `conditional_put`. When another writer got there first, the record is
/// re-read and `compute` runs again, up to `max_attempts` times in total.
/// Business errors returned by `compute` end the loop immediately.
pub fn read_modify_write<K, V, T, E, S, F>(
    store: &S,
    key: &K,
    max_attempts: u32,
    mut compute: F,
) -> Result<T, E>
where
    S: VersionedStore<K, V> + ?Sized,
    K: Clone + Display,
    E: From<StoreError>,
    F: FnMut(Option<&Versioned<V>>) -> Result<Step<V, T>, E>,
{
    // Precondition: at least one attempt
    assert!(max_attempts > 0, "max_attempts must be positive");

    for attempt in 1..=max_attempts {
        let current = store.get(key)?;

        let (value, output) = match compute(current.as_ref())? {
            Step::Skip(output) => return Ok(output),
            Step::Write { value, output } => (value, output),
        };

        let written = match &current {
            None => store.create(key.clone(), value),
            Some(current) => store.conditional_put(key, current.version, value),
        };

        match written {
            Ok(_) => return Ok(output),
            Err(err) if err.is_conflict() => {
                tracing::debug!(%key, attempt, max_attempts, "write conflict, re-reading");
            }
            Err(err) => return Err(err.into()),
        }
    }

    tracing::warn!(%key, max_attempts, "conditional write retries exhausted");
    Err(StoreError::RetriesExhausted {
        key: key.to_string(),
        attempts: max_attempts,
    }
    .into())
}
