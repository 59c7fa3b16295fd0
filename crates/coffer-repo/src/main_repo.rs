//! Nested, independently keyed child repositories.

use chrono::{DateTime, Utc};
use coffer_crypto::EncryptionKey;
use coffer_types::RepoId;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::Backend;
use crate::config::{RepoConfig, METADATA_BRANCH};
use crate::error::{RepoError, RepoResult};
use crate::repository::{DirEntryKind, Repository};

/// Directory of the metadata branch holding one record per child.
pub const REPOSITORIES_DIR: &str = "repositories";

/// The record kept for each child repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    pub id: RepoId,
    pub timestamp: DateTime<Utc>,
    /// The child's repository key, base64.
    pub enc_key: String,
}

impl RepositoryInfo {
    pub fn key(&self) -> RepoResult<EncryptionKey> {
        EncryptionKey::from_base64(&self.enc_key)
            .map_err(|e| RepoError::InvalidMetadata(format!("child {}: {e}", self.id)))
    }

    fn decode(bytes: &[u8]) -> RepoResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| RepoError::InvalidMetadata(e.to_string()))
    }
}

/// A root repository whose `.metadata` branch records child repositories.
///
/// Children are ordinary repositories in the same backend, each with its own
/// key. They are tied to the root only by their records and by any repo
/// links the caller inserts.
pub struct MainRepository {
    backend: Backend,
    root: Repository,
}

impl MainRepository {
    pub fn new(backend: Backend, root: Repository) -> Self {
        Self { backend, root }
    }

    pub fn root(&self) -> &Repository {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Repository {
        &mut self.root
    }

    pub fn into_inner(self) -> Repository {
        self.root
    }

    /// Create a child repository with a fresh id and key, record it, and
    /// snapshot the metadata branch.
    pub async fn create_child(&mut self, timestamp: DateTime<Utc>) -> RepoResult<Repository> {
        let id = RepoId::generate();
        let key = EncryptionKey::generate();
        let child = Repository::create(id.clone(), &self.backend, RepoConfig::new(key.clone())).await?;

        let record = RepositoryInfo {
            id: id.clone(),
            timestamp,
            enc_key: key.to_base64(),
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| RepoError::InvalidMetadata(e.to_string()))?;
        let now = timestamp.timestamp_millis();

        let mut meta = self.metadata().await?;
        meta.insert_file(&record_path(&id), &bytes, now, now).await?;
        meta.create_snapshot(timestamp).await?;

        info!(root = %self.root.repo_id(), child = %id, "child repository created");
        Ok(child)
    }

    /// Open a recorded child with its recorded key, or `None` if there is no
    /// record for `id`.
    pub async fn open_child(&self, id: &RepoId) -> RepoResult<Option<Repository>> {
        let mut meta = self.metadata().await?;
        let Some(bytes) = meta.read_file(&record_path(id)).await? else {
            return Ok(None);
        };
        let record = RepositoryInfo::decode(&bytes)?;
        let child = Repository::open(id.clone(), &self.backend, RepoConfig::new(record.key()?)).await?;
        Ok(Some(child))
    }

    /// Every recorded child, ordered by id.
    pub async fn list_children(&self) -> RepoResult<Vec<RepositoryInfo>> {
        let mut meta = self.metadata().await?;
        let dir = [REPOSITORIES_DIR.to_string()];
        let Some(entries) = meta.list_directory(&dir).await? else {
            return Ok(Vec::new());
        };

        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            if !matches!(entry.kind, DirEntryKind::File { .. }) {
                warn!(name = %entry.name, "unexpected entry in child records");
                continue;
            }
            let path = [REPOSITORIES_DIR.to_string(), entry.name];
            if let Some(bytes) = meta.read_file(&path).await? {
                children.push(RepositoryInfo::decode(&bytes)?);
            }
        }
        Ok(children)
    }

    async fn metadata(&self) -> RepoResult<Repository> {
        self.root.branch(METADATA_BRANCH, true).await
    }
}

fn record_path(id: &RepoId) -> [String; 2] {
    [REPOSITORIES_DIR.to_string(), id.to_string()]
}
