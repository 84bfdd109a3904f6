//! X25519 Key Exchange
//!
//! Long-lived identity key pairs and the pairwise symmetric keys
//! derived from them by Elliptic Curve Diffie-Hellman (ECDH).

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::error::{CryptoError, CryptoResult};
use super::hash::{constant_time_eq, Hash};

/// Size of an X25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of an X25519 secret key in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Size of a derived shared key in bytes
pub const SHARED_KEY_SIZE: usize = 32;

/// A public key for key exchange (X25519)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ExchangePublicKey(pub [u8; PUBLIC_KEY_SIZE]);

impl ExchangePublicKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; PUBLIC_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(ExchangePublicKey(arr))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Convert to lowercase hex, the canonical text form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex. Surrounding whitespace and upper-case digits are accepted.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s.trim()).map_err(|_| CryptoError::InvalidPublicKey)?;
        Self::from_bytes(&bytes)
    }

    /// Short fingerprint for log lines
    pub fn fingerprint(&self) -> String {
        Hash::fingerprint(&self.0)
    }
}

impl std::fmt::Debug for ExchangePublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangePublicKey({}...)", &self.to_hex()[..16])
    }
}

impl std::fmt::Display for ExchangePublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl serde::Serialize for ExchangePublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for ExchangePublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Symmetric key shared with one peer
///
/// Both sides compute the same value: derive(a, B) == derive(b, A).
#[derive(Clone, ZeroizeOnDrop)]
pub struct SharedKey {
    key: [u8; SHARED_KEY_SIZE],
}

impl SharedKey {
    /// Wrap raw key bytes
    pub fn from_bytes(key: [u8; SHARED_KEY_SIZE]) -> Self {
        SharedKey { key }
    }

    /// Get the raw bytes (be careful with this!)
    pub fn as_bytes(&self) -> &[u8; SHARED_KEY_SIZE] {
        &self.key
    }
}

impl PartialEq for SharedKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.key, &other.key)
    }
}

impl Eq for SharedKey {}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedKey(<redacted>)")
    }
}

/// The local user's long-lived key agreement identity
///
/// The secret key is automatically zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    public_key: ExchangePublicKey,
    secret_key: [u8; SECRET_KEY_SIZE],
}

impl IdentityKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);

        IdentityKeyPair {
            public_key: ExchangePublicKey(public.to_bytes()),
            secret_key: secret.to_bytes(),
        }
    }

    /// Rebuild a key pair from its secret half
    pub fn from_secret_bytes(secret_key: [u8; SECRET_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(secret_key);
        let public = X25519Public::from(&secret);

        IdentityKeyPair {
            public_key: ExchangePublicKey(public.to_bytes()),
            secret_key,
        }
    }

    /// Import both halves from their hex serialization
    ///
    /// Fails if the public half does not belong to the secret half.
    pub fn from_hex_parts(public_hex: &str, secret_hex: &str) -> CryptoResult<Self> {
        let public_key = ExchangePublicKey::from_hex(public_hex)?;

        let secret_bytes = Zeroizing::new(
            hex::decode(secret_hex.trim()).map_err(|_| CryptoError::InvalidSecretKey)?,
        );
        if secret_bytes.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: SECRET_KEY_SIZE,
                actual: secret_bytes.len(),
            });
        }

        let mut secret_key = [0u8; SECRET_KEY_SIZE];
        secret_key.copy_from_slice(&secret_bytes);

        let pair = Self::from_secret_bytes(secret_key);
        secret_key.zeroize();

        if pair.public_key != public_key {
            return Err(CryptoError::InvalidSecretKey);
        }
        Ok(pair)
    }

    /// Get the public key to share with peers
    pub fn public_key(&self) -> &ExchangePublicKey {
        &self.public_key
    }

    /// Export the secret half as hex for the local identity store
    ///
    /// # Security Warning
    /// The result must never leave the device.
    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.secret_key))
    }

    /// Raw X25519 with a peer, rejecting low-order peer points
    pub fn diffie_hellman(
        &self,
        peer_public: &ExchangePublicKey,
    ) -> CryptoResult<Zeroizing<[u8; 32]>> {
        let secret = StaticSecret::from(self.secret_key);
        let peer = X25519Public::from(peer_public.0);
        let shared = secret.diffie_hellman(&peer);

        if !shared.was_contributory() {
            return Err(CryptoError::NonContributory);
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Key exchange operations
pub struct KeyExchange;

impl KeyExchange {
    /// Derive the symmetric key shared between a local identity and a peer
    ///
    /// X25519 output is passed through BLAKE3 `derive_key` under `context`
    /// so the AEAD never sees raw curve output.
    pub fn derive_shared(
        local: &IdentityKeyPair,
        peer_public: &ExchangePublicKey,
        context: &str,
    ) -> CryptoResult<SharedKey> {
        let raw = local.diffie_hellman(peer_public)?;
        Ok(SharedKey::from_bytes(Hash::derive_key(&raw, context)))
    }
}
