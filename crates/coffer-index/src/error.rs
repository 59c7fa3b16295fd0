use coffer_tree::TreeError;

/// Errors from the index layer.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The executor thread is gone or refused the call.
    #[error("connection error: {0}")]
    Connection(String),

    /// A schema migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A row that must exist is absent.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The index contradicts itself: dangling ids, unknown tags, malformed
    /// columns.
    #[error("index corruption: {0}")]
    Corruption(String),

    /// The branch name is not acceptable.
    #[error("invalid branch name {name:?}: {reason}")]
    InvalidBranch { name: String, reason: String },

    /// JSON encoding of a column failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O on a scratch file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tree traversal error raised while the index served as tree loader.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl IndexError {
    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
