//! Store path validation and the fixed layout of a repository root.

use coffer_types::ContentHash;

use crate::error::{StoreError, StoreResult};

/// Name of the encrypted index blob at a repository root.
pub const INDEX_NAME: &str = "index";

/// Directory holding ciphertext parts.
pub const BLOBS_DIR: &str = "blobs";

/// Path of the encrypted index blob.
pub fn index_path() -> Vec<String> {
    vec![INDEX_NAME.to_string()]
}

/// Fan-out path of a ciphertext part: `blobs/<hex[0..2]>/<hex[2..]>`.
pub fn blob_path(hash: &ContentHash) -> Vec<String> {
    let hex = hash.to_hex();
    let (head, rest) = hex.split_at(2);
    vec![BLOBS_DIR.to_string(), head.to_string(), rest.to_string()]
}

/// Check a single segment, returning the reason it is rejected.
pub fn validate_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        Err("empty segment")
    } else if segment == "." || segment == ".." {
        Err("relative segment")
    } else if segment.contains(|c: char| c == '/' || c == '\\') {
        Err("segment contains a path separator")
    } else if segment.contains('\0') {
        Err("segment contains a NUL byte")
    } else {
        Ok(())
    }
}

/// Validate a full path.
///
/// `allow_root` permits the empty path, which only `list` accepts.
pub fn validate_path(path: &[String], allow_root: bool) -> StoreResult<()> {
    if path.is_empty() && !allow_root {
        return Err(invalid(path, "empty path"));
    }
    for segment in path {
        validate_segment(segment).map_err(|reason| invalid(path, reason))?;
    }
    Ok(())
}

pub(crate) fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.join("/")
    }
}

fn invalid(path: &[String], reason: &str) -> StoreError {
    StoreError::InvalidPath {
        path: format!("{path:?}"),
        reason: reason.to_string(),
    }
}
