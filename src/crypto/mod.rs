//! Cryptographic primitives for Courier
//!
//! This module provides all the cryptographic building blocks:
//! - `exchange`: X25519 identity key pairs and ECDH shared keys
//! - `cipher`: AES-256-GCM / ChaCha20-Poly1305 AEAD encryption
//! - `hash`: BLAKE3 key derivation

pub mod cipher;
pub mod error;
pub mod exchange;
pub mod hash;

// Re-export commonly used types
pub use cipher::{Cipher, CipherSuite};
pub use error::{CryptoError, CryptoResult};
pub use exchange::{ExchangePublicKey, IdentityKeyPair, KeyExchange, SharedKey};
pub use hash::Hash;
