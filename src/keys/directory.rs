//! Key directory client
//!
//! The directory maps a user id to the public key peers should encrypt to.
//! Senders call [`KeyDirectory::fetch`] for the recipient before encrypting;
//! the identity lifecycle calls [`KeyDirectory::publish`] after generating
//! a key pair.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{CourierError, CourierResult};

/// Registry of published public keys
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Publish (or overwrite) the public key of `user_id`
    async fn publish(&self, user_id: &str, public_key: &str) -> CourierResult<()>;

    /// Look up the current public key of `user_id`
    async fn fetch(&self, user_id: &str) -> CourierResult<Option<String>>;
}

/// In-memory directory for tests and demos
#[derive(Default)]
pub struct MemoryKeyDirectory {
    keys: RwLock<HashMap<String, String>>,
}

impl MemoryKeyDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyDirectory for MemoryKeyDirectory {
    async fn publish(&self, user_id: &str, public_key: &str) -> CourierResult<()> {
        self.keys
            .write()
            .insert(user_id.to_string(), public_key.to_string());
        Ok(())
    }

    async fn fetch(&self, user_id: &str) -> CourierResult<Option<String>> {
        Ok(self.keys.read().get(user_id).cloned())
    }
}

/// Directory kept in a single JSON object file (`{"user": "hex key"}`)
///
/// Suitable for a local CLI where several accounts share one machine.
pub struct FileKeyDirectory {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileKeyDirectory {
    /// Directory backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileKeyDirectory {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> CourierResult<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CourierError::Directory(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(CourierError::Directory(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl KeyDirectory for FileKeyDirectory {
    async fn publish(&self, user_id: &str, public_key: &str) -> CourierResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut keys = self.read_all().await?;
        keys.insert(user_id.to_string(), public_key.to_string());

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CourierError::Directory(e.to_string()))?;
        }
        let json =
            serde_json::to_vec_pretty(&keys).map_err(|e| CourierError::Directory(e.to_string()))?;

        // Rename over the old file so readers never see a truncated map
        let tmp = self.path.with_extension("json.tmp");
        write_synced(&tmp, &json)
            .await
            .map_err(|e| CourierError::Directory(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| CourierError::Directory(format!("{}: {}", self.path.display(), e)))
    }

    async fn fetch(&self, user_id: &str) -> CourierResult<Option<String>> {
        Ok(self.read_all().await?.remove(user_id))
    }
}

async fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}
