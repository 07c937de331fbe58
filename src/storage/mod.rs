use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::config::{StorageBackend, StorageConfig};
use crate::errors::{AppError, Result};

pub mod local;
pub mod remote;

pub use local::LocalStorage;
pub use remote::RemoteStorage;

/// Address of one object: the owning user's namespace plus a sanitized name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            namespace: owner_id.to_string(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// What the backend reports after accepting an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub location: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub name: String,
    pub bytes: u64,
    pub location: String,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Moves a fully spooled file into place under `key`, replacing any
    /// existing object with the same key.
    async fn put(&self, key: &ObjectKey, staged: &Path) -> Result<StoredObject>;

    async fn retrieve(&self, key: &ObjectKey) -> Result<Box<dyn AsyncRead + Send + Unpin>>;

    /// Returns `false` when there was nothing to remove.
    async fn remove(&self, key: &ObjectKey) -> Result<bool>;

    /// `None` for backends that cannot enumerate a namespace.
    async fn list(&self, namespace: &str) -> Result<Option<Vec<ObjectEntry>>>;
}

pub fn create_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
    match config.backend {
        StorageBackend::Local => {
            let storage = LocalStorage::new(&config.local_path)?;
            Ok(Arc::new(storage))
        }
        StorageBackend::Remote => {
            let url = config.remote_url.as_deref().ok_or_else(|| {
                AppError::Storage("Remote storage URL is not configured".to_string())
            })?;
            let storage = RemoteStorage::new(url, config.remote_token.clone())?;
            Ok(Arc::new(storage))
        }
    }
}
