/// Errors from encryption and key handling.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Ciphertext failed authentication: truncated, corrupted, or wrong key.
    #[error("authentication failed: {0}")]
    Authentication(&'static str),

    /// The cipher refused to encrypt.
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
