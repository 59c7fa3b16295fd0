use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Number of random bytes in a generated repository id.
const GENERATED_ID_BYTES: usize = 12;

/// Identifier of a logical repository.
///
/// A repo id doubles as the root path segment of the repository inside a
/// shared blob store, so it must be a valid single segment: non-empty, not
/// `.` or `..`, and free of path separators and control characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId(String);

impl RepoId {
    /// Validate and wrap an existing id.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        let reason = if id.is_empty() {
            Some("must not be empty")
        } else if id == "." || id == ".." {
            Some("must not be a relative path component")
        } else if id.contains(|c: char| c == '/' || c == '\\') {
            Some("must not contain path separators")
        } else if id.chars().any(char::is_control) {
            Some("must not contain control characters")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(TypeError::InvalidRepoId {
                id,
                reason: reason.to_string(),
            }),
            None => Ok(Self(id)),
        }
    }

    /// Generate a fresh random id (24 lowercase hex characters).
    pub fn generate() -> Self {
        let mut bytes = [0u8; GENERATED_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoId({})", self.0)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepoId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RepoId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.0
    }
}

impl AsRef<str> for RepoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_hex_and_unique() {
        let a = RepoId::generate();
        let b = RepoId::generate();
        assert_eq!(a.as_str().len(), 24);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_path_like_ids() {
        for bad in ["", ".", "..", "a/b", "a\\b", "x\ny"] {
            assert!(RepoId::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn accepts_plain_ids() {
        let id: RepoId = "repoId".parse().unwrap();
        assert_eq!(id.to_string(), "repoId");
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: RepoId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(ok.as_str(), "abc");
        assert!(serde_json::from_str::<RepoId>("\"..\"").is_err());
    }
}
