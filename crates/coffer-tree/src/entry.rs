use std::collections::BTreeMap;

use coffer_crypto::FieldHasher;
use coffer_types::{ContentHash, DbHash, RepoId};

/// Domain tag mixed into every tree hash.
///
/// The tag keeps an empty directory from hashing like an empty file. It
/// does not make tree and plaintext hashes disjoint: a file whose bytes are
/// a tree's hash input has that tree's hash. Lookups in the index therefore
/// tell blob rows and tree rows apart by what hangs off them, never by hash
/// alone.
pub const TREE_HASH_DOMAIN: &str = "coffer-tree-v1";

/// The three kinds of entry a directory can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Blob,
    Tree,
    RepoLink,
}

impl EntryKind {
    /// Single-character tag stored in the index and mixed into tree hashes.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Blob => "b",
            Self::Tree => "t",
            Self::RepoLink => "r",
        }
    }

    /// Parse a stored tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "b" => Some(Self::Blob),
            "t" => Some(Self::Tree),
            "r" => Some(Self::RepoLink),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::RepoLink => "repo link",
        })
    }
}

/// A file: a reference to stored content plus its metadata.
///
/// Times are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub content: DbHash,
    pub size: u64,
    pub creation_time: i64,
    pub modification_time: i64,
}

/// A reference to another repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLinkEntry {
    pub repo_id: RepoId,
}

/// A subtree that is already persisted. `data` is filled in once the
/// subtree has been read from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTree {
    pub hash: DbHash,
    pub data: Option<Tree>,
}

impl PersistedTree {
    pub fn unloaded(hash: DbHash) -> Self {
        Self { hash, data: None }
    }
}

/// One named child of an in-memory directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Blob(BlobEntry),
    RepoLink(RepoLinkEntry),
    /// Unchanged since load; its hash is still valid.
    Tree(PersistedTree),
    /// Changed since load; rehashed and persisted by `finalize`.
    Mutated(Tree),
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Blob(_) => EntryKind::Blob,
            Self::RepoLink(_) => EntryKind::RepoLink,
            Self::Tree(_) | Self::Mutated(_) => EntryKind::Tree,
        }
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self, Self::Mutated(_))
    }
}

impl From<StoredEntry> for Entry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Blob(blob) => Self::Blob(blob),
            StoredEntry::RepoLink(link) => Self::RepoLink(link),
            StoredEntry::Tree(hash) => Self::Tree(PersistedTree::unloaded(hash)),
        }
    }
}

/// One directory level. Entries are kept sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    pub entries: BTreeMap<String, Entry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A tree entry as persisted in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredEntry {
    Blob(BlobEntry),
    Tree(DbHash),
    RepoLink(RepoLinkEntry),
}

impl StoredEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Blob(_) => EntryKind::Blob,
            Self::Tree(_) => EntryKind::Tree,
            Self::RepoLink(_) => EntryKind::RepoLink,
        }
    }
}

/// A directory listing item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirItem {
    Blob(BlobEntry),
    Tree,
    RepoLink(RepoLinkEntry),
}

/// Hash of one directory level.
///
/// `entries` must be sorted by name. Each entry contributes its name (`n`),
/// kind tag (`y`) and kind-specific fields: content hash, size, creation and
/// modification time for blobs (`h`, `s`, `c`, `m`); the subtree hash for
/// trees (`h`); the linked repository id for repo links (`r`).
pub fn tree_hash(entries: &[(String, StoredEntry)]) -> ContentHash {
    let mut hasher = FieldHasher::with_domain(TREE_HASH_DOMAIN);
    for (name, entry) in entries {
        hasher.str("n", name).str("y", entry.kind().tag());
        match entry {
            StoredEntry::Blob(blob) => {
                hasher
                    .bytes("h", blob.content.hash.as_bytes())
                    .number("s", blob.size)
                    .number("c", blob.creation_time)
                    .number("m", blob.modification_time);
            }
            StoredEntry::Tree(tree) => {
                hasher.bytes("h", tree.hash.as_bytes());
            }
            StoredEntry::RepoLink(link) => {
                hasher.str("r", link.repo_id.as_str());
            }
        }
    }
    hasher.finish()
}
