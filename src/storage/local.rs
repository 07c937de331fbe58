use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::{fs, io::AsyncRead};
use uuid::Uuid;

use crate::{
    errors::{AppError, Result},
    storage::{ObjectEntry, ObjectKey, Storage, StoredObject},
};

/// One directory per user under a common root: `{root}/{user_id}/{name}`.
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        std::fs::create_dir_all(&base_path)
            .map_err(|e| AppError::Storage(format!("Failed to create storage directory: {}", e)))?;

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf> {
        ensure_single_component(namespace)?;
        Ok(self.base_path.join(namespace))
    }

    fn object_path(&self, key: &ObjectKey) -> Result<PathBuf> {
        ensure_single_component(&key.name)?;
        Ok(self.namespace_dir(&key.namespace)?.join(&key.name))
    }
}

/// Keys must never resolve outside their namespace directory.
fn ensure_single_component(segment: &str) -> Result<()> {
    let mut components = Path::new(segment).components();
    let valid = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
        && !segment.starts_with('.')
        && !segment.contains(['/', '\\']);

    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Invalid storage key segment: {}", segment)))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, key: &ObjectKey, staged: &Path) -> Result<StoredObject> {
        let full_path = self.object_path(key)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {}", e)))?;
        }

        // Staging usually shares the filesystem, so a rename is enough. Across
        // devices, copy next to the target first so the final step is still a rename.
        match fs::rename(staged, &full_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                let partial = full_path.with_file_name(format!(".{}.part", Uuid::new_v4()));
                fs::copy(staged, &partial).await
                    .map_err(|e| AppError::Storage(format!("Failed to write file: {}", e)))?;
                if let Err(e) = fs::rename(&partial, &full_path).await {
                    let _ = fs::remove_file(&partial).await;
                    return Err(AppError::Storage(format!("Failed to write file: {}", e)));
                }
            }
            Err(e) => return Err(AppError::Storage(format!("Failed to write file: {}", e))),
        }

        let metadata = fs::metadata(&full_path).await
            .map_err(|e| AppError::Storage(format!("Failed to get file metadata: {}", e)))?;

        Ok(StoredObject {
            location: full_path.to_string_lossy().to_string(),
            bytes: metadata.len(),
        })
    }

    async fn retrieve(&self, key: &ObjectKey) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let full_path = self.object_path(key)?;

        match fs::File::open(&full_path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound),
            Err(e) => Err(AppError::Storage(format!("Failed to open file: {}", e))),
        }
    }

    async fn remove(&self, key: &ObjectKey) -> Result<bool> {
        let full_path = self.object_path(key)?;

        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage(format!("Failed to delete file: {}", e))),
        }
    }

    async fn list(&self, namespace: &str) -> Result<Option<Vec<ObjectEntry>>> {
        let dir = self.namespace_dir(namespace)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Some(Vec::new())),
            Err(e) => return Err(AppError::Storage(format!("Failed to list directory: {}", e))),
        };

        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            objects.push(ObjectEntry {
                name,
                bytes: metadata.len(),
                location: entry.path().to_string_lossy().to_string(),
            });
        }

        Ok(Some(objects))
    }
}
