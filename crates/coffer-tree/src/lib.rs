//! The mutable tree overlay used by coffer repositories.
//!
//! A [`TreeBuilder`] holds the root directory of the current branch head.
//! Subtrees are loaded from the index lazily, the first time a path walks
//! into them, and only the nodes on the path to a change are marked dirty.
//! [`TreeBuilder::finalize`] rehashes and persists the dirty nodes bottom-up;
//! untouched subtrees keep their existing hash and are never rewritten.
//!
//! The builder does not know about SQL. It talks to storage through the
//! [`TreeLoader`] and [`TreeWriter`] seams, which the index implements.

pub mod builder;
pub mod entry;
pub mod error;
pub mod traits;

pub use builder::{validate_leaf_path, TreeBuilder};
pub use entry::{
    tree_hash, BlobEntry, DirItem, Entry, EntryKind, PersistedTree, RepoLinkEntry, StoredEntry,
    Tree, TREE_HASH_DOMAIN,
};
pub use error::{TreeError, TreeResult};
pub use traits::{TreeLoader, TreeWriter};
