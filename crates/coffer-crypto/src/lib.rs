//! Cryptographic primitives for coffer.
//!
//! Provides deterministic SHA-256 hashing over ordered typed fields (used for
//! tree and commit chaining) and authenticated symmetric encryption (used for
//! blob parts and the serialized index).
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod encryption;
pub mod error;
pub mod hasher;

pub use encryption::{AesGcmEncryption, Encryption, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use hasher::{hash_parts, sha256, FieldHasher, HashPart, HashValue};
