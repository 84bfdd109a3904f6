//! Identity key lifecycle
//!
//! Bootstraps the local user's X25519 identity: load it from the
//! [`IdentityStore`], or generate, persist and publish a new one.
//!
//! ```text
//! Uninitialized ──► Initializing ──► Ready(identity)
//!                        │    ▲
//!                        ▼    │ (retry)
//!                       Failed
//! ```
//!
//! There is no way back to `Uninitialized`; a logout or account switch
//! builds a new [`IdentityLifecycle`].
//!
//! One key pair per account per installation. A second device for the same
//! account would publish its own key over the first one's in the
//! directory, after which peers can no longer encrypt to the first device.
//! Multi-device support and rotation are not handled here.

pub mod directory;
pub mod store;

pub use directory::{FileKeyDirectory, KeyDirectory, MemoryKeyDirectory};
pub use store::{FileIdentityStore, IdentityStore, MemoryIdentityStore, StoredKeyPair};

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::crypto::{ExchangePublicKey, IdentityKeyPair};
use crate::error::{CourierError, CourierResult};

/// The ready identity of the local user
#[derive(Debug)]
pub struct LocalIdentity {
    user_id: String,
    key_pair: IdentityKeyPair,
}

impl LocalIdentity {
    /// Account this identity belongs to
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Public half, as published to the directory
    pub fn public_key(&self) -> &ExchangePublicKey {
        self.key_pair.public_key()
    }

    pub(crate) fn key_pair(&self) -> &IdentityKeyPair {
        &self.key_pair
    }
}

/// Readiness of the local identity
#[derive(Clone, Debug)]
pub enum IdentityState {
    /// `initialize` has not been called
    Uninitialized,
    /// A bootstrap is in progress
    Initializing,
    /// Key pair loaded or generated and persisted
    Ready(Arc<LocalIdentity>),
    /// Last bootstrap failed; encryption degrades to passthrough
    Failed(String),
}

impl IdentityState {
    /// True only in `Ready`
    pub fn is_ready(&self) -> bool {
        matches!(self, IdentityState::Ready(_))
    }

    /// Short name for logs and status output
    pub fn name(&self) -> &'static str {
        match self {
            IdentityState::Uninitialized => "uninitialized",
            IdentityState::Initializing => "initializing",
            IdentityState::Ready(_) => "ready",
            IdentityState::Failed(_) => "failed",
        }
    }
}

/// Owns the local identity key pair for one account
pub struct IdentityLifecycle {
    store: Arc<dyn IdentityStore>,
    directory: Arc<dyn KeyDirectory>,
    state: RwLock<IdentityState>,
    // Held for the whole bootstrap so concurrent callers cannot both
    // observe "absent" and generate divergent key pairs.
    init_guard: Mutex<()>,
    publish_on_load: bool,
}

impl IdentityLifecycle {
    /// Create an uninitialized lifecycle over the given collaborators
    pub fn new(store: Arc<dyn IdentityStore>, directory: Arc<dyn KeyDirectory>) -> Self {
        IdentityLifecycle {
            store,
            directory,
            state: RwLock::new(IdentityState::Uninitialized),
            init_guard: Mutex::new(()),
            publish_on_load: false,
        }
    }

    /// Also publish a key pair that was loaded from the store
    pub fn with_publish_on_load(mut self, publish_on_load: bool) -> Self {
        self.publish_on_load = publish_on_load;
        self
    }

    /// Snapshot of the current state
    pub fn state(&self) -> IdentityState {
        self.state.read().clone()
    }

    /// True once initialization has succeeded
    pub fn is_ready(&self) -> bool {
        self.state.read().is_ready()
    }

    /// The ready identity, if any
    pub fn identity(&self) -> Option<Arc<LocalIdentity>> {
        match &*self.state.read() {
            IdentityState::Ready(identity) => Some(Arc::clone(identity)),
            _ => None,
        }
    }

    /// Load or create the identity for `user_id`
    ///
    /// Idempotent: once ready, later calls for the same user return the
    /// same identity without touching the store. Calls for another user
    /// fail with [`CourierError::AccountMismatch`].
    pub async fn initialize(&self, user_id: &str) -> CourierResult<Arc<LocalIdentity>> {
        if let Some(identity) = self.ready_identity_for(user_id)? {
            return Ok(identity);
        }

        let _guard = self.init_guard.lock().await;

        // Another caller may have finished while we waited
        if let Some(identity) = self.ready_identity_for(user_id)? {
            return Ok(identity);
        }

        *self.state.write() = IdentityState::Initializing;
        info!(user_id, "initializing identity");

        match self.bootstrap(user_id).await {
            Ok(identity) => {
                let identity = Arc::new(identity);
                info!(
                    user_id,
                    key = %identity.public_key().fingerprint(),
                    "identity ready"
                );
                *self.state.write() = IdentityState::Ready(Arc::clone(&identity));
                Ok(identity)
            }
            Err(e) => {
                error!(user_id, error = %e, "identity initialization failed");
                *self.state.write() = IdentityState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Publish the ready identity's public key again
    ///
    /// Initialization only logs publication failures; this lets a caller
    /// retry and see the error.
    pub async fn publish_public_key(&self) -> CourierResult<()> {
        let identity = self.identity().ok_or(CourierError::NotReady)?;
        self.directory
            .publish(identity.user_id(), &identity.public_key().to_hex())
            .await
            .map_err(|e| CourierError::KeyPublication(e.to_string()))
    }

    fn ready_identity_for(&self, user_id: &str) -> CourierResult<Option<Arc<LocalIdentity>>> {
        match &*self.state.read() {
            IdentityState::Ready(identity) if identity.user_id() == user_id => {
                Ok(Some(Arc::clone(identity)))
            }
            IdentityState::Ready(identity) => Err(CourierError::AccountMismatch {
                active: identity.user_id().to_string(),
                requested: user_id.to_string(),
            }),
            _ => Ok(None),
        }
    }

    async fn bootstrap(&self, user_id: &str) -> CourierResult<LocalIdentity> {
        let stored = self
            .store
            .get(user_id)
            .await
            .map_err(|e| CourierError::Initialization(e.to_string()))?;

        if let Some(stored) = stored {
            let key_pair = IdentityKeyPair::from_hex_parts(&stored.public_key, &stored.private_key)
                .map_err(|e| {
                    CourierError::Initialization(format!("stored key pair is unusable: {}", e))
                })?;
            debug!(user_id, "loaded identity from store");

            if self.publish_on_load {
                self.publish_logged(user_id, key_pair.public_key()).await;
            }
            return Ok(LocalIdentity {
                user_id: user_id.to_string(),
                key_pair,
            });
        }

        let key_pair = IdentityKeyPair::generate();
        let stored = StoredKeyPair {
            public_key: key_pair.public_key().to_hex(),
            private_key: String::clone(&key_pair.secret_hex()),
        };
        self.store
            .set(user_id, stored)
            .await
            .map_err(|e| CourierError::Initialization(e.to_string()))?;
        debug!(user_id, "generated and stored new identity");

        // Ready does not wait on the directory
        self.publish_logged(user_id, key_pair.public_key()).await;

        Ok(LocalIdentity {
            user_id: user_id.to_string(),
            key_pair,
        })
    }

    async fn publish_logged(&self, user_id: &str, public_key: &ExchangePublicKey) {
        match self.directory.publish(user_id, &public_key.to_hex()).await {
            Ok(()) => debug!(user_id, key = %public_key.fingerprint(), "public key published"),
            Err(e) => warn!(
                user_id,
                error = %CourierError::KeyPublication(e.to_string()),
                "peers cannot encrypt to this identity until the key is published"
            ),
        }
    }
}
