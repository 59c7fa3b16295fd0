use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::path::{display_path, validate_path};
use crate::traits::BlobStore;

/// In-memory, `BTreeMap`-based blob store.
///
/// Intended for tests and embedding. Blobs are held behind a `RwLock` and
/// cloned on read and write.
pub struct InMemoryBlobStore {
    blobs: RwLock<BTreeMap<Vec<String>, Vec<u8>>>,
    writes: AtomicU64,
}

impl InMemoryBlobStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Number of successful `write` calls, overwrites included.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Every stored path, sorted.
    pub fn all_paths(&self) -> Vec<Vec<String>> {
        self.blobs
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn list(&self, path: &[String]) -> StoreResult<Vec<String>> {
        validate_path(path, true)?;
        let map = self.blobs.read().expect("lock poisoned");
        let names: BTreeSet<String> = map
            .keys()
            .filter(|key| key.len() > path.len() && key.starts_with(path))
            .map(|key| key[path.len()].clone())
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn read(&self, path: &[String]) -> StoreResult<Vec<u8>> {
        validate_path(path, false)?;
        let map = self.blobs.read().expect("lock poisoned");
        map.get(path).cloned().ok_or_else(|| StoreError::NotFound {
            path: display_path(path),
        })
    }

    async fn write(&self, path: &[String], data: &[u8]) -> StoreResult<()> {
        validate_path(path, false)?;
        let mut map = self.blobs.write().expect("lock poisoned");
        map.insert(path.to_vec(), data.to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("blob_count", &self.len())
            .finish()
    }
}
