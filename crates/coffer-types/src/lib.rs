//! Foundation types for coffer.
//!
//! Every other coffer crate depends on `coffer-types`.
//!
//! # Key Types
//!
//! - [`ContentHash`] -- SHA-256 digest identifying a plaintext, a tree level,
//!   a ciphertext part or a commit
//! - [`DbHash`] -- a content hash paired with the index row id it was stored under
//! - [`RepoId`] -- identifier of a logical repository inside a blob store

pub mod error;
pub mod hash;
pub mod repo;

pub use error::TypeError;
pub use hash::{ContentHash, DbHash};
pub use repo::RepoId;
