//! Errors surfaced by the encryption layer

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors returned by key lifecycle, derivation and collaborator calls
///
/// Envelope decryption never produces one of these; see
/// [`crate::session::Incoming`].
#[derive(Error, Debug)]
pub enum CourierError {
    /// Identity bootstrap failed; the lifecycle is left `Failed`
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// The key directory rejected or could not receive our public key
    #[error("Key publication failed: {0}")]
    KeyPublication(String),

    /// An operation needed the local identity before it was ready
    #[error("Identity is not ready")]
    NotReady,

    /// Peer public key material could not be used for key agreement
    #[error("Invalid peer public key: {0}")]
    InvalidPeerKey(#[source] CryptoError),

    /// `initialize` was called for a different account than the one loaded
    #[error("Identity already initialized for {active}, refusing {requested}")]
    AccountMismatch {
        /// User the lifecycle is bound to
        active: String,
        /// User passed to the rejected call
        requested: String,
    },

    /// Local identity store failure
    #[error("Identity store error: {0}")]
    Store(String),

    /// Key directory failure
    #[error("Key directory error: {0}")]
    Directory(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Primitive failure outside the cases above
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Result type for Courier operations
pub type CourierResult<T> = Result<T, CourierError>;
