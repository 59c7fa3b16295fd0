use chrono::{DateTime, Utc};
use coffer_crypto::EncryptionKey;
use coffer_types::{ContentHash, DbHash};

/// Where and how the bytes of one content are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobInfo {
    /// Plaintext parts stored in the index itself.
    Inlined { parts: Vec<Vec<u8>> },
    /// Parts encrypted under a per-blob key and stored in the blob store,
    /// addressed by the hash of each ciphertext part.
    Encrypted {
        key: EncryptionKey,
        parts: Vec<ContentHash>,
    },
}

impl BlobInfo {
    pub fn part_count(&self) -> usize {
        match self {
            Self::Inlined { parts } => parts.len(),
            Self::Encrypted { parts, .. } => parts.len(),
        }
    }
}

/// One commit as read back from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub hash: ContentHash,
    pub tree: DbHash,
    pub timestamp: DateTime<Utc>,
    pub parents: Vec<ContentHash>,
}

/// A branch and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub commit: ContentHash,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub contents: u64,
    pub blobs: u64,
    pub blob_parts: u64,
    pub tree_entries: u64,
    pub commits: u64,
    pub branches: u64,
}
