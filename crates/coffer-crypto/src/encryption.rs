//! Authenticated symmetric encryption with self-contained ciphertexts.
//!
//! Output layout: `[12-byte nonce][ciphertext][16-byte auth tag]`. A fresh
//! random nonce is drawn for every call, so decryption only needs the key.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// Key size in bytes (AES-128).
pub const KEY_SIZE: usize = 16;

/// Nonce size for AES-GCM (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Auth tag size for AES-GCM.
pub const TAG_SIZE: usize = 16;

/// A raw symmetric key.
///
/// Used both for the repository key that seals the index and for the
/// per-blob keys of envelope encryption.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a random key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(s: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(s)
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Symmetric authenticated encryption.
pub trait Encryption: Send + Sync {
    /// Encrypt `plaintext` under `key` with a fresh random nonce.
    fn encrypt(&self, plaintext: &[u8], key: &EncryptionKey) -> CryptoResult<Vec<u8>>;

    /// Decrypt a ciphertext produced by [`Encryption::encrypt`].
    ///
    /// Fails with [`CryptoError::Authentication`] for truncated or corrupted
    /// input and for the wrong key. Never returns unauthenticated bytes.
    fn decrypt(&self, ciphertext: &[u8], key: &EncryptionKey) -> CryptoResult<Vec<u8>>;
}

/// AES-128-GCM.
#[derive(Clone, Copy, Debug, Default)]
pub struct AesGcmEncryption;

impl Encryption for AesGcmEncryption {
    fn encrypt(&self, plaintext: &[u8], key: &EncryptionKey) -> CryptoResult<Vec<u8>> {
        let cipher = Aes128Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &EncryptionKey) -> CryptoResult<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Authentication("ciphertext truncated"));
        }
        let cipher = Aes128Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_SIZE);
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| CryptoError::Authentication("tag mismatch (wrong key or corrupted data)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = EncryptionKey::generate();
        let plaintext = b"Hello, World! This is a test message.";
        let ciphertext = AesGcmEncryption.encrypt(plaintext, &key).unwrap();
        assert_eq!(ciphertext.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
        assert_eq!(AesGcmEncryption.decrypt(&ciphertext, &key).unwrap(), plaintext);
    }

    #[test]
    fn fresh_nonce_per_call() {
        let key = EncryptionKey::generate();
        let a = AesGcmEncryption.encrypt(b"same", &key).unwrap();
        let b = AesGcmEncryption.encrypt(b"same", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let ciphertext = AesGcmEncryption
            .encrypt(b"Secret message", &EncryptionKey::generate())
            .unwrap();
        let err = AesGcmEncryption
            .decrypt(&ciphertext, &EncryptionKey::generate())
            .unwrap_err();
        assert!(matches!(err, CryptoError::Authentication(_)));
    }

    #[test]
    fn corrupted_ciphertext_fails_authentication() {
        let key = EncryptionKey::generate();
        let mut ciphertext = AesGcmEncryption.encrypt(b"Secret message", &key).unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;
        assert!(matches!(
            AesGcmEncryption.decrypt(&ciphertext, &key),
            Err(CryptoError::Authentication(_))
        ));
    }

    #[test]
    fn truncated_ciphertext_fails_authentication() {
        let key = EncryptionKey::generate();
        let ciphertext = AesGcmEncryption.encrypt(b"Secret message", &key).unwrap();
        for len in [0, NONCE_SIZE, NONCE_SIZE + TAG_SIZE, ciphertext.len() - 1] {
            assert!(matches!(
                AesGcmEncryption.decrypt(&ciphertext[..len], &key),
                Err(CryptoError::Authentication(_))
            ));
        }
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let key = EncryptionKey::generate();
        let ciphertext = AesGcmEncryption.encrypt(b"", &key).unwrap();
        assert!(AesGcmEncryption.decrypt(&ciphertext, &key).unwrap().is_empty());
    }

    #[test]
    fn key_encodings() {
        let key = EncryptionKey::generate();
        assert_eq!(EncryptionKey::from_hex(&key.to_hex()).unwrap(), key);
        assert_eq!(EncryptionKey::from_base64(&key.to_base64()).unwrap(), key);
        assert_eq!(key.to_hex().len(), KEY_SIZE * 2);
    }

    #[test]
    fn invalid_key_length() {
        assert_eq!(
            EncryptionKey::from_slice(&[0u8; 32]).unwrap_err(),
            CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: 32
            }
        );
        assert!(matches!(
            EncryptionKey::from_hex("zz"),
            Err(CryptoError::InvalidKeyEncoding(_))
        ));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = EncryptionKey::from_bytes([0xab; KEY_SIZE]);
        assert!(!format!("{key:?}").contains("ab"));
    }

    proptest! {
        #[test]
        fn roundtrip_arbitrary_data(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let key = EncryptionKey::generate();
            let ciphertext = AesGcmEncryption.encrypt(&data, &key).unwrap();
            prop_assert_eq!(AesGcmEncryption.decrypt(&ciphertext, &key).unwrap(), data);
        }
    }
}
