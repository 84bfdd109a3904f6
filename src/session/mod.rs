//! Per-account encryption session
//!
//! A [`Session`] ties the identity lifecycle, the shared key cache and the
//! envelope codec together for one signed-in user. Build a new one on
//! logout or account switch.

mod envelope;
mod shared;

pub use envelope::{EnvelopeCodec, FallbackReason, Incoming, Outgoing, PassthroughReason};
pub use shared::{KeyAgreement, SharedKeyDeriver, X25519Agreement};

use std::sync::Arc;

use crate::config::CourierConfig;
use crate::crypto::SharedKey;
use crate::error::CourierResult;
use crate::keys::{IdentityLifecycle, IdentityState, IdentityStore, KeyDirectory, LocalIdentity};

/// End-to-end encryption for one user's direct messages
pub struct Session {
    lifecycle: Arc<IdentityLifecycle>,
    codec: EnvelopeCodec,
}

impl Session {
    /// Session using X25519 agreement under `config`
    pub fn new(
        store: Arc<dyn IdentityStore>,
        directory: Arc<dyn KeyDirectory>,
        config: &CourierConfig,
    ) -> Self {
        let agreement = Arc::new(X25519Agreement::new(config.kdf_context.clone()));
        Self::with_agreement(store, directory, config, agreement)
    }

    /// Session with a caller-supplied key agreement step
    pub fn with_agreement(
        store: Arc<dyn IdentityStore>,
        directory: Arc<dyn KeyDirectory>,
        config: &CourierConfig,
        agreement: Arc<dyn KeyAgreement>,
    ) -> Self {
        let lifecycle = Arc::new(
            IdentityLifecycle::new(store, directory).with_publish_on_load(config.publish_on_load),
        );
        let deriver = SharedKeyDeriver::new(Arc::clone(&lifecycle), agreement);
        let codec = EnvelopeCodec::new(
            deriver,
            config.cipher_suite,
            config.undecryptable_placeholder.clone(),
        );

        Session { lifecycle, codec }
    }

    /// Load or create the identity for `user_id`; see [`IdentityLifecycle::initialize`]
    pub async fn initialize(&self, user_id: &str) -> CourierResult<Arc<LocalIdentity>> {
        self.lifecycle.initialize(user_id).await
    }

    /// Current readiness
    pub fn state(&self) -> IdentityState {
        self.lifecycle.state()
    }

    /// The identity lifecycle
    pub fn lifecycle(&self) -> &Arc<IdentityLifecycle> {
        &self.lifecycle
    }

    /// Shared key with the peer owning `peer_key`
    pub async fn get_shared_key(&self, peer_key: &str) -> CourierResult<Arc<SharedKey>> {
        self.codec.deriver().get_shared_key(peer_key).await
    }

    /// Encrypt for a recipient, or return `plaintext` if that is not possible
    pub async fn encrypt(&self, plaintext: &str, peer_key: Option<&str>) -> String {
        self.codec.encrypt(plaintext, peer_key).await
    }

    /// Decrypt from a sender; passthrough or placeholder on failure
    pub async fn decrypt(&self, content: &str, peer_key: Option<&str>) -> String {
        self.codec.decrypt(content, peer_key).await
    }

    /// Like [`Session::encrypt`], reporting whether encryption happened
    pub async fn seal(&self, plaintext: &str, peer_key: Option<&str>) -> Outgoing {
        self.codec.seal(plaintext, peer_key).await
    }

    /// Like [`Session::decrypt`], reporting what happened
    pub async fn open(&self, content: &str, peer_key: Option<&str>) -> Incoming {
        self.codec.open(content, peer_key).await
    }

    /// Number of peers with a cached shared key
    pub fn cache_len(&self) -> usize {
        self.codec.deriver().cache_len()
    }

    /// Forget all cached shared keys
    pub fn clear_cache(&self) {
        self.codec.deriver().clear_cache()
    }
}
