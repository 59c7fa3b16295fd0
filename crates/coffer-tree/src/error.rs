use crate::entry::EntryKind;

/// Errors from tree traversal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The path is empty, has an empty segment, or walks through something
    /// that is not a directory.
    #[error("invalid tree path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// The leaf exists but is of a different kind than requested.
    #[error("{path} is a {found}, expected a {expected}")]
    TypeMismatch {
        path: String,
        expected: EntryKind,
        found: EntryKind,
    },
}

impl TreeError {
    pub(crate) fn invalid_path(path: &[String], reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: display_path(path),
            reason: reason.into(),
        }
    }
}

/// Render a tree path for messages.
pub fn display_path(path: &[String]) -> String {
    format!("/{}", path.join("/"))
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
