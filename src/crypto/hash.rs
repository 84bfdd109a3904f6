//! BLAKE3 key derivation
//!
//! Turns raw key-agreement output into symmetric keys.

/// Size of a derived key in bytes
pub const DERIVED_KEY_SIZE: usize = 32;

/// Key derivation operations
pub struct Hash;

impl Hash {
    /// Derive a key from a master key and context string
    ///
    /// The context should be a unique string identifying the purpose
    /// of this derived key (e.g., "courier dm envelope v1")
    pub fn derive_key(master: &[u8; 32], context: &str) -> [u8; DERIVED_KEY_SIZE] {
        blake3::derive_key(context, master)
    }

    /// Short hex fingerprint of public material, safe for logs
    pub fn fingerprint(data: &[u8]) -> String {
        let digest = blake3::hash(data);
        hex::encode(&digest.as_bytes()[..8])
    }
}

/// Constant-time comparison to prevent timing attacks
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
