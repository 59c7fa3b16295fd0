use std::sync::Arc;

use async_trait::async_trait;
use coffer_types::RepoId;

use crate::error::StoreResult;

/// Path-keyed blob storage.
///
/// All implementations must satisfy these invariants:
/// - Paths are validated before any I/O. A path containing `.`, `..`, an
///   empty segment or a separator fails with `StoreError::InvalidPath`.
/// - `write` overwrites. Writing identical bytes twice is unobservable;
///   writing different bytes is last-write-wins.
/// - `read` of a missing path fails with `StoreError::NotFound`.
/// - `list` of a missing directory returns an empty list.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Names directly under `path`, sorted.
    async fn list(&self, path: &[String]) -> StoreResult<Vec<String>>;

    /// Bytes stored at `path`.
    async fn read(&self, path: &[String]) -> StoreResult<Vec<u8>>;

    /// Store `data` at `path`, replacing anything already there.
    async fn write(&self, path: &[String], data: &[u8]) -> StoreResult<()>;
}

/// Maps a repository id to the blob store rooted at that repository.
pub trait BlobStoreGetter: Send + Sync {
    fn store_for(&self, repo_id: &RepoId) -> Arc<dyn BlobStore>;
}
