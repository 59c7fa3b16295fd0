use async_trait::async_trait;
use coffer_types::{ContentHash, DbHash};

use crate::entry::StoredEntry;
use crate::error::TreeError;

/// Reads persisted directory levels.
#[async_trait]
pub trait TreeLoader: Send + Sync {
    type Error: From<TreeError> + Send;

    /// Entries of the tree whose `content` row id is `tree_id`.
    async fn read_tree(&self, tree_id: i64) -> Result<Vec<(String, StoredEntry)>, Self::Error>;
}

/// Persists directory levels.
#[async_trait]
pub trait TreeWriter: Send + Sync {
    type Error: From<TreeError> + Send;

    /// The row of an already persisted tree with this hash, if any.
    async fn find_tree(&self, hash: &ContentHash) -> Result<Option<DbHash>, Self::Error>;

    /// Persist a new tree level. `entries` are sorted by name.
    async fn write_tree(
        &self,
        hash: &ContentHash,
        entries: &[(String, StoredEntry)],
    ) -> Result<DbHash, Self::Error>;
}
