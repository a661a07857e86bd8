//! Repository traits for the form engine
//!
//! The snapshot store is a plain durable key-value store holding serialized
//! snapshot records. External crates implement it to provide different
//! persistence mechanisms.

use async_trait::async_trait;

use crate::CoreError;

/// Durable key-value store for in-progress form snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the record stored under `key`; absence is a normal state
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;

    /// Write the record under `key`, replacing any previous one
    async fn set(&self, key: &str, record: String) -> Result<(), CoreError>;

    /// Delete the record under `key`; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> Result<(), CoreError>;
}

/// Memory implementations for testing
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory snapshot store with write accounting and failure injection
    #[derive(Clone, Default)]
    pub struct MemorySnapshotStore {
        records: Arc<DashMap<String, String>>,
        writes: Arc<AtomicUsize>,
        fail_writes: Arc<AtomicBool>,
    }

    impl MemorySnapshotStore {
        /// Create an empty store
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of successful `set` calls
        pub fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        /// Make subsequent writes fail (or succeed again)
        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        /// Raw record under a key
        pub fn raw(&self, key: &str) -> Option<String> {
            self.records.get(key).map(|record| record.clone())
        }

        /// True if a record exists under the key
        pub fn contains(&self, key: &str) -> bool {
            self.records.contains_key(key)
        }

        /// Insert a raw record without counting it as a write
        pub fn seed(&self, key: &str, record: impl Into<String>) {
            self.records.insert(key.to_string(), record.into());
        }
    }

    #[async_trait]
    impl SnapshotStore for MemorySnapshotStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
            Ok(self.raw(key))
        }

        async fn set(&self, key: &str, record: String) -> Result<(), CoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(CoreError::StateStoreError(format!(
                    "Write rejected for key: {}",
                    key
                )));
            }
            self.records.insert(key.to_string(), record);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<(), CoreError> {
            self.records.remove(key);
            Ok(())
        }
    }
}
