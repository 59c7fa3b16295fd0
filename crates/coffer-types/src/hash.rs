use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TypeError;

/// SHA-256 digest used for content addressing.
///
/// The same value type names plaintext blobs, tree levels, ciphertext parts
/// and commits. Which one a hash refers to is decided by where it is stored,
/// not by the hash itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Length of a digest in bytes.
    pub const LEN: usize = 32;

    /// SHA-256 of raw bytes.
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Wrap a pre-computed digest.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// Build from a byte slice, e.g. a BLOB column read back from the index.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters), for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for ContentHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A content hash together with the index row id it is stored under.
///
/// The index hands these out from every write so callers can reference a row
/// by id without looking the hash up again, and can still hash over the
/// digest without reading the row back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DbHash {
    /// Database-assigned id of the `content` row.
    pub id: i64,
    /// Digest stored in that row.
    pub hash: ContentHash,
}

impl DbHash {
    pub fn new(id: i64, hash: ContentHash) -> Self {
        Self { id, hash }
    }
}

impl fmt::Display for DbHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.id, self.hash.short_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn digest_matches_known_vector() {
        let hash = ContentHash::digest(b"abc");
        assert_eq!(
            hash.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            ContentHash::digest(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let err = ContentHash::from_slice(&[0u8; 31]).unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 31
            }
        );
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(matches!(
            ContentHash::from_hex("not hex"),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn short_hex_is_8_chars() {
        assert_eq!(ContentHash::digest(b"x").short_hex().len(), 8);
    }

    #[test]
    fn db_hash_display() {
        let h = DbHash::new(7, ContentHash::from_hash([0xab; 32]));
        assert_eq!(h.to_string(), "#7:abababab");
    }

    #[test]
    fn serde_json_roundtrip() {
        let id = ContentHash::digest(b"serde test");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    proptest! {
        #[test]
        fn hex_parse_inverts_display(bytes in proptest::array::uniform32(any::<u8>())) {
            let hash = ContentHash::from_hash(bytes);
            prop_assert_eq!(ContentHash::from_hex(&hash.to_string()).unwrap(), hash);
        }
    }
}
