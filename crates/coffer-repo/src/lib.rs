//! Encrypted, versioned repositories.
//!
//! A [`Repository`] stores files under hierarchical paths, takes immutable
//! snapshots, and keeps everything encrypted at rest in a [`BlobStore`]:
//!
//! - file contents are encrypted under a fresh key per blob and stored at
//!   `blobs/<hex[0..2]>/<hex[2..]>`, addressed by the ciphertext hash;
//! - the index (contents, trees, commits, branches and the per-blob keys)
//!   is serialized, encrypted under the repository key and stored at
//!   `index`.
//!
//! A [`MainRepository`] nests independently keyed child repositories under
//! a root, recording each child's key in the root's `.metadata` branch.
//!
//! # Concurrency
//!
//! A repository is single-writer. Inserts, snapshots and tree reads all
//! take `&mut self`, because reads fill the lazy tree cache. Two processes that
//! commit the same repository concurrently are not detected: whichever
//! stores its index last wins.
//!
//! [`BlobStore`]: coffer_store::BlobStore

pub mod backend;
pub mod config;
pub mod error;
pub mod main_repo;
pub mod repository;
pub mod scan;

pub use backend::Backend;
pub use config::{RepoConfig, DEFAULT_BRANCH, METADATA_BRANCH};
pub use error::{RepoError, RepoResult};
pub use main_repo::{MainRepository, RepositoryInfo, REPOSITORIES_DIR};
pub use repository::{DirEntry, DirEntryKind, Repository};
pub use scan::{scan_dir, snapshot_dir, ScannedFile};
