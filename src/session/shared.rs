//! Pairwise shared keys
//!
//! Memoizes the symmetric key for each peer for the lifetime of a session.
//! The cache is unbounded: one entry per distinct peer key seen.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::crypto::{CryptoResult, ExchangePublicKey, IdentityKeyPair, KeyExchange, SharedKey};
use crate::error::{CourierError, CourierResult};
use crate::keys::IdentityLifecycle;

/// The key agreement step, separated so it can be swapped or observed
#[async_trait]
pub trait KeyAgreement: Send + Sync {
    /// Derive the symmetric key shared by `local` and `peer`
    async fn agree(
        &self,
        local: &IdentityKeyPair,
        peer: &ExchangePublicKey,
    ) -> CryptoResult<SharedKey>;
}

/// X25519 followed by BLAKE3 key derivation
pub struct X25519Agreement {
    context: String,
}

impl X25519Agreement {
    /// Agreement whose derived keys are bound to `context`
    pub fn new(context: impl Into<String>) -> Self {
        X25519Agreement {
            context: context.into(),
        }
    }
}

#[async_trait]
impl KeyAgreement for X25519Agreement {
    async fn agree(
        &self,
        local: &IdentityKeyPair,
        peer: &ExchangePublicKey,
    ) -> CryptoResult<SharedKey> {
        KeyExchange::derive_shared(local, peer, &self.context)
    }
}

/// Derives and caches shared keys for the local identity
pub struct SharedKeyDeriver {
    lifecycle: Arc<IdentityLifecycle>,
    agreement: Arc<dyn KeyAgreement>,
    // canonical peer key (lowercase hex) -> derived key
    cache: RwLock<HashMap<String, Arc<SharedKey>>>,
}

impl SharedKeyDeriver {
    /// Deriver for the identity owned by `lifecycle`
    pub fn new(lifecycle: Arc<IdentityLifecycle>, agreement: Arc<dyn KeyAgreement>) -> Self {
        SharedKeyDeriver {
            lifecycle,
            agreement,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Lifecycle whose identity keys are used
    pub fn lifecycle(&self) -> &Arc<IdentityLifecycle> {
        &self.lifecycle
    }

    /// Parse peer key material into its canonical form
    pub fn parse_peer_key(material: &str) -> CourierResult<ExchangePublicKey> {
        ExchangePublicKey::from_hex(material).map_err(CourierError::InvalidPeerKey)
    }

    /// Shared key for the peer whose public key material is given
    ///
    /// Requires a ready identity. Repeated calls for the same peer reuse
    /// the cached key without running key agreement again.
    pub async fn get_shared_key(&self, peer_material: &str) -> CourierResult<Arc<SharedKey>> {
        let peer = Self::parse_peer_key(peer_material)?;
        self.shared_key_for(&peer).await
    }

    pub(crate) async fn shared_key_for(
        &self,
        peer: &ExchangePublicKey,
    ) -> CourierResult<Arc<SharedKey>> {
        let identity = self.lifecycle.identity().ok_or(CourierError::NotReady)?;
        let cache_key = peer.to_hex();

        let cached = self.cache.read().get(&cache_key).cloned();
        if let Some(key) = cached {
            return Ok(key);
        }

        let key = self
            .agreement
            .agree(identity.key_pair(), peer)
            .await
            .map_err(CourierError::InvalidPeerKey)?;
        let key = Arc::new(key);

        debug!(peer = %peer.fingerprint(), "derived shared key");
        // A concurrent first derivation for the same peer stores an equal key
        self.cache.write().insert(cache_key, Arc::clone(&key));
        Ok(key)
    }

    /// Number of peers with a cached key
    pub fn cache_len(&self) -> usize {
        self.cache.read().len()
    }

    /// Drop every cached key; they are re-derived on demand
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }
}
