//! Path-keyed blob storage for coffer.
//!
//! A blob store is a dumb key/value store whose keys are arrays of path
//! segments. The repository engine only ever writes two kinds of keys under
//! a repository root: the encrypted `index`, and ciphertext parts under
//! `blobs/<hex[0..2]>/<hex[2..]>` addressed by their own SHA-256.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`InMemoryBlobStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`FileBlobStore`] -- one file per key under a root directory
//! - [`ScopedBlobStore`] -- prefixes every key with a repository id, so many
//!   logical repositories can share one physical store
//!
//! # Design Rules
//!
//! 1. Paths never contain `.`, `..`, empty segments or separators. Every
//!    backend validates before touching storage.
//! 2. Writes to the same path are overwrites; content-addressed keys make
//!    them safe to retry without locking.
//! 3. The store never interprets blob contents.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod path;
pub mod scoped;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FileBlobStore;
pub use memory::InMemoryBlobStore;
pub use path::{blob_path, index_path, validate_path, validate_segment, BLOBS_DIR, INDEX_NAME};
pub use scoped::{RepoBlobStoreGetter, ScopedBlobStore};
pub use traits::{BlobStore, BlobStoreGetter};
