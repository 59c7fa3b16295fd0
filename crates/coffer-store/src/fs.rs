use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::RngCore;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::path::{display_path, validate_path};
use crate::traits::BlobStore;

/// Suffix of in-flight temporary files; never listed.
const TEMP_SUFFIX: &str = ".coffer-tmp";

/// Blob store mapping each path to a file under a root directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a partially written blob.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &[String]) -> PathBuf {
        let mut full = self.root.clone();
        full.extend(path);
        full
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn list(&self, path: &[String]) -> StoreResult<Vec<String>> {
        validate_path(path, true)?;
        let dir = self.resolve(path);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(TEMP_SUFFIX) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read(&self, path: &[String]) -> StoreResult<Vec<u8>> {
        validate_path(path, false)?;
        match tokio::fs::read(self.resolve(path)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                path: display_path(path),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &[String], data: &[u8]) -> StoreResult<()> {
        validate_path(path, false)?;
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut nonce = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut nonce);
        let temp = target.with_file_name(format!(
            ".{}.{}{}",
            path[path.len() - 1],
            hex::encode(nonce),
            TEMP_SUFFIX
        ));

        if let Err(e) = tokio::fs::write(&temp, data).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        debug!(path = %display_path(path), bytes = data.len(), "blob written");
        Ok(())
    }
}
