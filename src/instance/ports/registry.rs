//! Registry port for durable instance record persistence.

use crate::instance::domain::InstanceRecord;
use camino::Utf8PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type for registry store operations.
pub type RegistryStoreResult<T> = Result<T, RegistryStoreError>;

/// Persistence contract for the instance registry.
///
/// The registry is read and written as a whole: callers load every record,
/// mutate in memory, and save the full list back. Implementations must make
/// `save` atomic so readers never observe a partially written registry.
#[cfg_attr(test, mockall::automock)]
pub trait RegistryStore: Send + Sync {
    /// Loads every registered record, sorted by identifier.
    ///
    /// A store that has never been written loads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryStoreError::Corrupted`] when persisted data cannot
    /// be decoded or violates registry invariants, and
    /// [`RegistryStoreError::Io`] when it cannot be read.
    fn load(&self) -> RegistryStoreResult<Vec<InstanceRecord>>;

    /// Replaces the registry with `records`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryStoreError::Io`] when the registry cannot be
    /// written. The previous contents stay intact on failure.
    fn save(&self, records: &[InstanceRecord]) -> RegistryStoreResult<()>;
}

/// Errors returned by registry store implementations.
#[derive(Debug, Clone, Error)]
pub enum RegistryStoreError {
    /// Persisted registry data is malformed or inconsistent.
    #[error("instance registry at {path} is corrupted: {reason}")]
    Corrupted {
        /// Location of the registry.
        path: Utf8PathBuf,
        /// What made the data unusable.
        reason: String,
    },

    /// Reading or writing the registry failed.
    #[error("instance registry I/O failed at {path}: {source}")]
    Io {
        /// Location of the failed operation.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl RegistryStoreError {
    /// Wraps an I/O failure at `path`.
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Reports corrupted registry data at `path`.
    pub fn corrupted(path: impl Into<Utf8PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
