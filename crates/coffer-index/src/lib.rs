//! The relational index behind a coffer repository.
//!
//! The index is a small SQLite database that records every stored content
//! hash, where each blob's bytes live, every tree level, every commit and
//! the branch pointers. It is the only place per-blob encryption keys are
//! kept. The whole database is serialized, encrypted and stored as a single
//! blob by the repository layer.
//!
//! # Layout
//!
//! - [`db`] -- async SQLite handle on a dedicated thread, plus serialization
//! - [`migrations`] -- versioned schema
//! - [`repository`] -- [`IndexRepository`], the typed read/write façade
//! - [`branch`] -- branch name validation

pub mod branch;
pub mod db;
pub mod error;
pub mod migrations;
pub mod models;
pub mod repository;

pub use branch::validate_branch_name;
pub use db::{IndexDb, SerializableDb, SqliteDb};
pub use error::{IndexError, IndexResult};
pub use models::{BlobInfo, Branch, IndexStats, Snapshot};
pub use repository::IndexRepository;
