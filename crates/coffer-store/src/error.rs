/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The path is malformed; no I/O was attempted.
    #[error("invalid store path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Nothing is stored at the path.
    #[error("blob not found: {path}")]
    NotFound { path: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
