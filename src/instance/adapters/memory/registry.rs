//! In-memory registry store.

use crate::instance::domain::InstanceRecord;
use crate::instance::ports::{RegistryStore, RegistryStoreError, RegistryStoreResult};
use std::sync::{Arc, RwLock};

const MEMORY_PATH: &str = "memory://instance_registry";

/// Thread-safe in-memory registry store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistryStore {
    state: Arc<RwLock<InMemoryRegistryState>>,
}

#[derive(Debug, Default)]
struct InMemoryRegistryState {
    records: Vec<InstanceRecord>,
    fail_next_save: bool,
    save_count: usize,
}

fn lock_error(err: impl std::fmt::Display) -> RegistryStoreError {
    RegistryStoreError::io(MEMORY_PATH, std::io::Error::other(err.to_string()))
}

impl InMemoryRegistryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `records`.
    #[must_use]
    pub fn with_records(mut records: Vec<InstanceRecord>) -> Self {
        records.sort_by_key(InstanceRecord::instance_id);
        Self {
            state: Arc::new(RwLock::new(InMemoryRegistryState {
                records,
                ..InMemoryRegistryState::default()
            })),
        }
    }

    /// Makes the next [`RegistryStore::save`] fail without changing state.
    ///
    /// # Errors
    ///
    /// Returns registry errors when lock acquisition fails.
    pub fn fail_next_save(&self) -> RegistryStoreResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.fail_next_save = true;
        Ok(())
    }

    /// Returns how many saves succeeded.
    ///
    /// # Errors
    ///
    /// Returns registry errors when lock acquisition fails.
    pub fn save_count(&self) -> RegistryStoreResult<usize> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.save_count)
    }
}

impl RegistryStore for InMemoryRegistryStore {
    fn load(&self) -> RegistryStoreResult<Vec<InstanceRecord>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.records.clone())
    }

    fn save(&self, records: &[InstanceRecord]) -> RegistryStoreResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        if state.fail_next_save {
            state.fail_next_save = false;
            return Err(RegistryStoreError::io(
                MEMORY_PATH,
                std::io::Error::other("injected save failure"),
            ));
        }

        let mut sorted = records.to_vec();
        sorted.sort_by_key(InstanceRecord::instance_id);
        state.records = sorted;
        state.save_count += 1;
        Ok(())
    }
}
