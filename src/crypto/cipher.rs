//! AEAD encryption
//!
//! Two interchangeable suites with the same shape: 256-bit key, 96-bit
//! nonce, 128-bit tag. AES-256-GCM is the default. The wire form produced
//! here carries no suite identifier, so both ends must agree out of band.

use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use super::error::{CryptoError, CryptoResult};

/// Size of the encryption key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Authenticated encryption algorithm used for envelopes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherSuite {
    /// AES-256 in Galois/Counter Mode
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// ChaCha20 with a Poly1305 authenticator
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl std::fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherSuite::Aes256Gcm => write!(f, "aes-256-gcm"),
            CipherSuite::ChaCha20Poly1305 => write!(f, "chacha20-poly1305"),
        }
    }
}

/// Symmetric cipher for encryption/decryption
pub struct Cipher;

impl Cipher {
    /// Encrypt data under a freshly drawn random nonce
    ///
    /// Returns: nonce || ciphertext || tag
    pub fn encrypt(
        suite: CipherSuite,
        key: &[u8; KEY_SIZE],
        plaintext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        Self::encrypt_with_nonce(suite, key, &nonce, plaintext)
    }

    /// Decrypt data
    ///
    /// Input: nonce || ciphertext || tag
    pub fn decrypt(
        suite: CipherSuite,
        key: &[u8; KEY_SIZE],
        sealed: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        // Minimum size: nonce + tag
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

        match suite {
            CipherSuite::Aes256Gcm => Aes256Gcm::new(key.into())
                .decrypt(nonce.into(), ciphertext)
                .map_err(|_| CryptoError::DecryptionFailed),
            CipherSuite::ChaCha20Poly1305 => ChaCha20Poly1305::new(key.into())
                .decrypt(nonce.into(), ciphertext)
                .map_err(|_| CryptoError::DecryptionFailed),
        }
    }

    /// Encrypt with a specific nonce
    ///
    /// WARNING: Using the same nonce twice with the same key is catastrophic!
    /// Only [`Cipher::encrypt`] should be used for message traffic.
    pub(crate) fn encrypt_with_nonce(
        suite: CipherSuite,
        key: &[u8; KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let ciphertext = match suite {
            CipherSuite::Aes256Gcm => Aes256Gcm::new(key.into())
                .encrypt(nonce.into(), plaintext)
                .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?,
            CipherSuite::ChaCha20Poly1305 => ChaCha20Poly1305::new(key.into())
                .encrypt(nonce.into(), plaintext)
                .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?,
        };

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(nonce);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }
}
