use std::path::PathBuf;

use coffer_crypto::CryptoError;
use coffer_index::IndexError;
use coffer_store::StoreError;
use coffer_tree::TreeError;
use coffer_types::{ContentHash, RepoId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("repository already exists: {0}")]
    AlreadyExists(RepoId),

    /// A stored ciphertext part does not hash to the address it is stored
    /// under, or decrypted content does not match its recorded hash.
    #[error("corrupt blob {hash}")]
    CorruptBlob { hash: ContentHash },

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("invalid repository metadata: {0}")]
    InvalidMetadata(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("index error: {0}")]
    Index(IndexError),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IndexError> for RepoError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Tree(e) => Self::Tree(e),
            other => Self::Index(other),
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
