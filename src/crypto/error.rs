//! Cryptographic error types

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The provided key has an invalid length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Encryption operation failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed - authentication tag mismatch (possibly tampered data)
    #[error("Decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    /// The public key format is invalid
    #[error("Invalid public key format")]
    InvalidPublicKey,

    /// Key agreement produced an all-zero output (low-order peer point)
    #[error("Key agreement was not contributory")]
    NonContributory,

    /// The secret key format is invalid
    #[error("Invalid secret key format")]
    InvalidSecretKey,
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
