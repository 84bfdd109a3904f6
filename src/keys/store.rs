//! Local identity store
//!
//! Device-local persistence for a user's key pair. The private half handed
//! to an [`IdentityStore`] must never be sent through any other interface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CourierError, CourierResult};

/// Serialized key pair as kept on the device
///
/// Both halves are lowercase hex. The private half is wiped on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct StoredKeyPair {
    /// X25519 public key
    pub public_key: String,
    /// X25519 secret key
    pub private_key: String,
}

impl std::fmt::Debug for StoredKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Persistence for the local identity, addressed by user id
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Load the key pair for `user_id`, if one was saved
    async fn get(&self, user_id: &str) -> CourierResult<Option<StoredKeyPair>>;

    /// Save the key pair for `user_id`, replacing any previous one
    async fn set(&self, user_id: &str, pair: StoredKeyPair) -> CourierResult<()>;
}

/// In-memory store for tests and demos
#[derive(Default)]
pub struct MemoryIdentityStore {
    pairs: RwLock<HashMap<String, StoredKeyPair>>,
}

impl MemoryIdentityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a saved key pair
    pub fn len(&self) -> usize {
        self.pairs.read().len()
    }

    /// True when nothing has been saved
    pub fn is_empty(&self) -> bool {
        self.pairs.read().is_empty()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get(&self, user_id: &str) -> CourierResult<Option<StoredKeyPair>> {
        Ok(self.pairs.read().get(user_id).cloned())
    }

    async fn set(&self, user_id: &str, pair: StoredKeyPair) -> CourierResult<()> {
        self.pairs.write().insert(user_id.to_string(), pair);
        Ok(())
    }
}

/// One JSON file per user under a directory
///
/// File names are the hex encoding of the user id, so any id is safe to
/// use as a path component. Files are created owner-only on Unix.
pub struct FileIdentityStore {
    root: PathBuf,
}

impl FileIdentityStore {
    /// Store rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileIdentityStore { root: root.into() }
    }

    /// Directory holding the key files
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", hex::encode(user_id)))
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn get(&self, user_id: &str) -> CourierResult<Option<StoredKeyPair>> {
        let path = self.path_for(user_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CourierError::Store(format!("{}: {}", path.display(), e))),
        };

        let pair = serde_json::from_slice(&bytes)
            .map_err(|e| CourierError::Store(format!("{}: {}", path.display(), e)))?;
        Ok(Some(pair))
    }

    async fn set(&self, user_id: &str, pair: StoredKeyPair) -> CourierResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CourierError::Store(e.to_string()))?;

        let path = self.path_for(user_id);
        let tmp = path.with_extension("json.tmp");
        let mut json =
            serde_json::to_vec_pretty(&pair).map_err(|e| CourierError::Store(e.to_string()))?;

        let written = write_private(&tmp, &json).await;
        json.zeroize();
        written.map_err(|e| CourierError::Store(format!("{}: {}", tmp.display(), e)))?;

        // Rename so a crash never leaves a half-written key file
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CourierError::Store(format!("{}: {}", path.display(), e)))
    }
}

async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredKeyPair {
        StoredKeyPair {
            public_key: "aa".repeat(32),
            private_key: "bb".repeat(32),
        }
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryIdentityStore::new();
        assert!(store.get("alice").await.unwrap().is_none());

        store.set("alice", sample()).await.unwrap();
        assert_eq!(store.get("alice").await.unwrap(), Some(sample()));
        assert!(store.get("bob").await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path().join("identities"));

        assert!(store.get("alice@example.com").await.unwrap().is_none());
        store.set("alice@example.com", sample()).await.unwrap();

        // A second instance over the same directory sees the saved pair
        let reopened = FileIdentityStore::new(dir.path().join("identities"));
        assert_eq!(
            reopened.get("alice@example.com").await.unwrap(),
            Some(sample())
        );
    }

    #[tokio::test]
    async fn test_file_store_path_is_safe() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path());

        store.set("../../etc/passwd", sample()).await.unwrap();
        let entries: Vec<_> = std::fs::read_dir(store.root()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(store.get("../../etc/passwd").await.unwrap(), Some(sample()));
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path());
        std::fs::write(store.path_for("alice"), b"{ not json").unwrap();

        assert!(matches!(
            store.get("alice").await,
            Err(CourierError::Store(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path());
        store.set("alice", sample()).await.unwrap();

        let mode = std::fs::metadata(store.path_for("alice"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_debug_redacts_private_half() {
        let debug = format!("{:?}", sample());
        assert!(!debug.contains(&"bb".repeat(32)));
        assert!(debug.contains("<redacted>"));
    }
}
