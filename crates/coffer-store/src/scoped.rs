use std::sync::Arc;

use async_trait::async_trait;
use coffer_types::RepoId;

use crate::error::StoreResult;
use crate::path::validate_path;
use crate::traits::{BlobStore, BlobStoreGetter};

/// A view of a shared store rooted at one repository id.
pub struct ScopedBlobStore {
    inner: Arc<dyn BlobStore>,
    prefix: String,
}

impl ScopedBlobStore {
    pub fn new(inner: Arc<dyn BlobStore>, repo_id: &RepoId) -> Self {
        Self {
            inner,
            prefix: repo_id.as_str().to_string(),
        }
    }

    fn scoped(&self, path: &[String]) -> Vec<String> {
        let mut full = Vec::with_capacity(path.len() + 1);
        full.push(self.prefix.clone());
        full.extend_from_slice(path);
        full
    }
}

#[async_trait]
impl BlobStore for ScopedBlobStore {
    async fn list(&self, path: &[String]) -> StoreResult<Vec<String>> {
        validate_path(path, true)?;
        self.inner.list(&self.scoped(path)).await
    }

    async fn read(&self, path: &[String]) -> StoreResult<Vec<u8>> {
        validate_path(path, false)?;
        self.inner.read(&self.scoped(path)).await
    }

    async fn write(&self, path: &[String], data: &[u8]) -> StoreResult<()> {
        validate_path(path, false)?;
        self.inner.write(&self.scoped(path), data).await
    }
}

impl std::fmt::Debug for ScopedBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedBlobStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Hands out [`ScopedBlobStore`]s over one shared backend.
#[derive(Clone)]
pub struct RepoBlobStoreGetter {
    inner: Arc<dyn BlobStore>,
}

impl RepoBlobStoreGetter {
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self { inner }
    }
}

impl BlobStoreGetter for RepoBlobStoreGetter {
    fn store_for(&self, repo_id: &RepoId) -> Arc<dyn BlobStore> {
        Arc::new(ScopedBlobStore::new(Arc::clone(&self.inner), repo_id))
    }
}
