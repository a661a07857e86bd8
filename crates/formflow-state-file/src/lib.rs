//! File-backed snapshot store
//!
//! Each storage key maps to one JSON document in a directory. Writes go to a
//! temporary file first and are renamed into place, so a crash mid-write
//! leaves the previous snapshot intact.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use formflow_core::{CoreError, SnapshotStore};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, trace};

/// Snapshot store writing one file per key into a directory
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    /// Use `root` as the snapshot directory, creating it if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            CoreError::StateStoreError(format!(
                "Failed to create snapshot directory {}: {}",
                root.display(),
                e
            ))
        })?;
        debug!(root = %root.display(), "Opened file snapshot store");
        Ok(Self { root })
    }

    /// Snapshot directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the snapshot for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_key(key)))
    }
}

/// Keep keys readable on disk while making them safe file names.
/// Anything outside `[A-Za-z0-9_-]` is percent-encoded byte by byte.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(record) => {
                trace!(storage_key = key, path = %path.display(), "Read snapshot");
                Ok(Some(record))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::StateStoreError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn set(&self, key: &str, record: String) -> Result<(), CoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, record.as_bytes()).await.map_err(|e| {
            CoreError::StateStoreError(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &path).await.map_err(|e| {
            CoreError::StateStoreError(format!("Failed to replace {}: {}", path.display(), e))
        })?;

        trace!(storage_key = key, bytes = record.len(), "Wrote snapshot");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::StateStoreError(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
