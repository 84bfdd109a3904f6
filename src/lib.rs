//! # Courier
//!
//! End-to-end encryption for direct messages.
//!
//! ## Features
//!
//! - **Identity keys**: one X25519 key pair per user per device, persisted
//!   locally and published to a key directory
//! - **Pairwise keys**: X25519 + BLAKE3 derivation, cached per peer
//! - **Envelopes**: AES-256-GCM (or ChaCha20-Poly1305) with a fresh 96-bit
//!   nonce per message, base64 for storage
//! - **Graceful degradation**: a message that cannot be encrypted or
//!   decrypted never fails the conversation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use courier::{CourierConfig, Session};
//! use courier::keys::{KeyDirectory, MemoryIdentityStore, MemoryKeyDirectory};
//!
//! # async fn demo() -> courier::CourierResult<()> {
//! let directory = Arc::new(MemoryKeyDirectory::new());
//! let alice = Session::new(Arc::new(MemoryIdentityStore::new()), directory.clone(), &CourierConfig::default());
//! let bob = Session::new(Arc::new(MemoryIdentityStore::new()), directory.clone(), &CourierConfig::default());
//! alice.initialize("alice").await?;
//! bob.initialize("bob").await?;
//!
//! let alice_pub = directory.fetch("alice").await?;
//! let envelope = bob.encrypt("hello", alice_pub.as_deref()).await;
//!
//! let bob_pub = directory.fetch("bob").await?;
//! assert_eq!(alice.decrypt(&envelope, bob_pub.as_deref()).await, "hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 SESSION                     │
//! │   encrypt / decrypt  (EnvelopeCodec)        │
//! │   get_shared_key     (SharedKeyDeriver)     │
//! │   initialize         (IdentityLifecycle)    │
//! └──────────┬──────────────────────┬───────────┘
//!            │                      │
//! ┌──────────▼──────────┐ ┌─────────▼───────────┐
//! │       CRYPTO        │ │        KEYS         │
//! │ X25519 | AES-GCM    │ │ IdentityStore       │
//! │ ChaCha20 | BLAKE3   │ │ KeyDirectory        │
//! └─────────────────────┘ └─────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod session;

// Re-export main types at crate root
pub use config::CourierConfig;
pub use crypto::{CipherSuite, CryptoError, CryptoResult, ExchangePublicKey, SharedKey};
pub use error::{CourierError, CourierResult};
pub use keys::{IdentityLifecycle, IdentityState, LocalIdentity};
pub use session::{Incoming, Outgoing, Session};
