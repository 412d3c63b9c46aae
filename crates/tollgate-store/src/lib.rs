//! # tollgate-store: Versioned record storage for `Tollgate`
//!
//! Every record lives under a key together with a [`Version`]. Writers read a
//! record, compute its successor, and write it back naming the version they
//! read. The store accepts the write only if that version is still current,
//! so concurrent writers never silently overwrite each other.
//!
//! - [`VersionedStore`]: the minimal contract (`get`, `create`,
//!   `conditional_put`, `list`)
//! - [`InMemoryStore`]: a thread-safe implementation for the service binary
//!   and tests
//! - [`read_modify_write`]: the one bounded retry-with-reread loop every
//!   mutating operation goes through

mod memory;
mod retry;


use std::fmt::Display;

pub use memory::{InMemoryStore, StoreStats};
pub use retry::{Step, read_modify_write};
pub use tollgate_types::Version;

/// A stored value and the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<V> {
    pub value: V,
    pub version: Version,
}

impl<V> Versioned<V> {
    pub fn new(value: V, version: Version) -> Self {
        Self { value, version }
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Key-value storage with optimistic concurrency control.
///
/// Implementations must offer read-your-writes consistency: a `get` issued
/// after a successful write observes that write.
pub trait VersionedStore<K, V>: Send + Sync {
    /// Reads the current value and version of `key`.
    fn get(&self, key: &K) -> Result<Option<Versioned<V>>, StoreError>;

    /// Creates `key`. Fails with [`StoreError::AlreadyExists`] if it exists.
    fn create(&self, key: K, value: V) -> Result<Version, StoreError>;

    /// Replaces `key` if its current version is `expected`.
    ///
    /// Fails with [`StoreError::VersionConflict`] when the stored version has
    /// moved, leaving the stored record exactly as it was.
    fn conditional_put(&self, key: &K, expected: Version, value: V)
    -> Result<Version, StoreError>;

    /// Returns every record, ordered by key.
    fn list(&self) -> Result<Vec<(K, Versioned<V>)>, StoreError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from store operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record {key} already exists")]
    AlreadyExists { key: String },

    #[error("record {key} not found")]
    NotFound { key: String },

    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: Version,
        actual: Version,
    },

    #[error("gave up on {key} after {attempts} conflicting writes")]
    RetriesExhausted { key: String, attempts: u32 },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn already_exists(key: &impl Display) -> Self {
        StoreError::AlreadyExists {
            key: key.to_string(),
        }
    }

    pub(crate) fn not_found(key: &impl Display) -> Self {
        StoreError::NotFound {
            key: key.to_string(),
        }
    }

    /// True for errors caused by a concurrent writer, which a re-read may
    /// resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict { .. } | StoreError::AlreadyExists { .. }
        )
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
