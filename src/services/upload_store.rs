//! Quota-checked upload store.
//!
//! Admits a file into a user's namespace only when it has a usable name, an
//! allowed extension, fits the single-upload cap and fits the user's quota.
//! The record store is the authoritative list of a user's files; usage is
//! always recomputed from it.
//!
//! Incoming bytes are spooled into a staging file first, then the
//! check-then-persist step runs under a per-user lock and moves the staged
//! file into place in one step. A rejected or interrupted upload never leaves
//! an object or a record behind.

use futures::stream::{BoxStream, TryStreamExt};
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::StoreConfig,
    database::{
        queries::{FileQueries, NewFileRecord},
        Database,
    },
    errors::{AppError, Result},
    models::{DeleteOutcome, ReconcileReport, StoredFile, UploadReason, UploadResult, Usage, UserIdentity},
    services::user_locks::UserLocks,
    storage::{ObjectKey, Storage},
    utils::{file_extension, sanitize_filename},
};

const SPOOL_CHUNK_SIZE: usize = 64 * 1024;

fn replaced_size(previous: &Option<StoredFile>) -> u64 {
    previous
        .as_ref()
        .map(|file| file.size_bytes.max(0) as u64)
        .unwrap_or(0)
}

pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

pub struct UploadStore {
    database: Database,
    storage: Arc<dyn Storage>,
    config: StoreConfig,
    locks: UserLocks,
}

struct SpooledUpload {
    file: NamedTempFile,
    size: u64,
    sha256: String,
}

impl UploadStore {
    pub fn new(database: Database, storage: Arc<dyn Storage>, config: StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.staging_dir)?;

        Ok(Self {
            database,
            storage,
            config,
            locks: UserLocks::new(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    /// Validates, quota-checks and persists one incoming file.
    ///
    /// Validation outcomes come back as a rejected [`UploadResult`]; only a
    /// failing record store is an `Err`. `declared_size` lets oversized
    /// uploads be refused before any byte is read, but the admitted size is
    /// always the measured one.
    pub async fn submit<R>(
        &self,
        user: &UserIdentity,
        filename: &str,
        reader: R,
        declared_size: Option<u64>,
    ) -> Result<UploadResult>
    where
        R: AsyncRead + Send + Unpin,
    {
        let name = sanitize_filename(filename);
        if name.is_empty() {
            return self.reject(user, filename, UploadReason::EmptyName).await;
        }

        match file_extension(&name) {
            Some(ext) if self.config.allows_extension(&ext) => {}
            _ => return self.reject(user, &name, UploadReason::UnsupportedType).await,
        }

        if let Some(declared) = declared_size {
            if declared > self.config.max_single_upload_bytes {
                return self.reject(user, &name, UploadReason::SingleFileTooLarge).await;
            }

            let (usage, previous) = self.headroom(user, &name).await?;
            if self.exceeds_quota(usage, replaced_size(&previous), declared) {
                return Ok(self.rejected_with(user, &name, UploadReason::QuotaExceeded, usage));
            }
        }

        let spooled = match self.spool(reader).await {
            Ok(Some(spooled)) => spooled,
            Ok(None) => return self.reject(user, &name, UploadReason::SingleFileTooLarge).await,
            Err(e) => {
                warn!("Reading upload {} for {} failed: {}", name, user.username, e);
                return self.reject(user, &name, UploadReason::IoError).await;
            }
        };

        let _guard = self.write_guard(user.id).await;

        let (usage, previous) = self.headroom(user, &name).await?;
        if self.exceeds_quota(usage, replaced_size(&previous), spooled.size) {
            return Ok(self.rejected_with(user, &name, UploadReason::QuotaExceeded, usage));
        }

        // The record is written before the object moves, so a failing record
        // store leaves both the old object and its accounting untouched.
        let key = ObjectKey::new(user.id, name.as_str());
        let pending_location = previous
            .as_ref()
            .map(|file| file.location.clone())
            .unwrap_or_else(|| key.to_string());
        let pending = NewFileRecord {
            owner_id: user.id,
            name: &name,
            size_bytes: spooled.size as i64,
            location: &pending_location,
            sha256: &spooled.sha256,
        };
        let mut file = FileQueries::upsert(self.database.pool(), &pending).await?;

        let stored = match self.storage.put(&key, spooled.file.path()).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to store {}: {}", key, e);
                self.restore_record(&file, previous.as_ref()).await;
                let usage = self.usage(user).await?;
                return Ok(self.rejected_with(user, &name, UploadReason::IoError, usage));
            }
        };

        if stored.location != file.location || stored.bytes as i64 != file.size_bytes {
            let record = NewFileRecord {
                location: &stored.location,
                size_bytes: stored.bytes as i64,
                ..pending
            };
            file = match FileQueries::upsert(self.database.pool(), &record).await {
                Ok(file) => file,
                Err(e) => {
                    // Sizes already match the stored object; only a fresh
                    // upload is undone so it never points at a stale location.
                    if previous.is_none() {
                        if let Err(remove_err) = self.storage.remove(&key).await {
                            error!("Failed to roll back {}: {}", key, remove_err);
                        }
                        self.restore_record(&file, None).await;
                    }
                    return Err(e);
                }
            };
        }

        let usage = self.usage(user).await?;
        info!(
            "Stored {} for {} ({} bytes, {} of {} bytes used)",
            file.name, user.username, file.size_bytes, usage.used_bytes, usage.quota_bytes
        );

        Ok(UploadResult::accepted(file, usage))
    }

    /// Same as [`submit`](Self::submit) for sources that can seek: the exact
    /// length is measured up front, so oversized files are refused unread.
    pub async fn submit_seekable<R>(
        &self,
        user: &UserIdentity,
        filename: &str,
        mut reader: R,
    ) -> Result<UploadResult>
    where
        R: AsyncRead + AsyncSeek + Send + Unpin,
    {
        let start = reader.stream_position().await?;
        let end = reader.seek(SeekFrom::End(0)).await?;
        reader.seek(SeekFrom::Start(start)).await?;

        self.submit(user, filename, reader, Some(end.saturating_sub(start))).await
    }

    /// Lazily yields the user's files in insertion order. Each call starts over.
    pub fn list_stream(&self, user: &UserIdentity) -> BoxStream<'_, Result<StoredFile>> {
        FileQueries::stream_for_owner(self.database.pool(), user.id)
    }

    pub async fn list(&self, user: &UserIdentity) -> Result<Vec<StoredFile>> {
        self.list_stream(user).try_collect().await
    }

    pub async fn usage(&self, user: &UserIdentity) -> Result<Usage> {
        let used = FileQueries::total_size_for_owner(self.database.pool(), user.id).await?;
        Ok(Usage::new(self.config.quota_limit_bytes, used.max(0) as u64))
    }

    /// Removes a file by name from the user's own namespace.
    pub async fn delete(&self, user: &UserIdentity, filename: &str) -> Result<DeleteOutcome> {
        let name = sanitize_filename(filename);
        if name.is_empty() {
            return Ok(DeleteOutcome::NotFound);
        }

        let _guard = self.write_guard(user.id).await;

        match FileQueries::find_by_name(self.database.pool(), user.id, &name).await? {
            Some(file) => self.remove_file(&file).await,
            None => Ok(DeleteOutcome::NotFound),
        }
    }

    /// Removes a file by record id, refusing files owned by someone else.
    pub async fn delete_by_id(&self, user: &UserIdentity, id: i64) -> Result<DeleteOutcome> {
        let _guard = self.write_guard(user.id).await;

        let Some(file) = FileQueries::find_by_id(self.database.pool(), id).await? else {
            return Ok(DeleteOutcome::NotFound);
        };

        if file.owner_id != user.id {
            warn!("{} tried to delete file {} owned by another user", user.username, id);
            return Ok(DeleteOutcome::Forbidden);
        }

        self.remove_file(&file).await
    }

    /// Opens a stored file for download. `None` when the user has no such file.
    pub async fn open(
        &self,
        user: &UserIdentity,
        filename: &str,
    ) -> Result<Option<(StoredFile, FileReader)>> {
        let name = sanitize_filename(filename);
        if name.is_empty() {
            return Ok(None);
        }

        let Some(file) = FileQueries::find_by_name(self.database.pool(), user.id, &name).await? else {
            return Ok(None);
        };

        match self.storage.retrieve(&ObjectKey::new(user.id, name.as_str())).await {
            Ok(reader) => Ok(Some((file, reader))),
            Err(AppError::NotFound) => {
                warn!("Record {} has no stored object", file.id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Brings the record store in line with what the backend actually holds.
    ///
    /// Objects without a record are adopted when their name would have been
    /// accepted by `submit`; records whose object is gone are dropped.
    /// Backends that cannot enumerate a namespace are left untouched.
    pub async fn reconcile(&self, user: &UserIdentity) -> Result<ReconcileReport> {
        let _guard = self.write_guard(user.id).await;

        let Some(objects) = self.storage.list(&user.id.to_string()).await? else {
            return Ok(ReconcileReport::default());
        };

        let records = self.list(user).await?;
        let mut report = ReconcileReport {
            enumerable: true,
            ..Default::default()
        };

        for record in &records {
            if !objects.iter().any(|object| object.name == record.name) {
                FileQueries::delete_by_id(self.database.pool(), record.id).await?;
                report.dropped.push(record.name.clone());
            }
        }

        for object in &objects {
            if records.iter().any(|record| record.name == object.name) {
                continue;
            }

            let allowed = sanitize_filename(&object.name) == object.name
                && file_extension(&object.name)
                    .map(|ext| self.config.allows_extension(&ext))
                    .unwrap_or(false);
            if !allowed {
                debug!("Skipping unexpected object {} for {}", object.name, user.username);
                continue;
            }

            let key = ObjectKey::new(user.id, object.name.as_str());
            let sha256 = self.digest(&key).await?;
            let record = NewFileRecord {
                owner_id: user.id,
                name: &object.name,
                size_bytes: object.bytes as i64,
                location: &object.location,
                sha256: &sha256,
            };
            FileQueries::upsert(self.database.pool(), &record).await?;
            report.adopted.push(object.name.clone());
        }

        if !report.adopted.is_empty() || !report.dropped.is_empty() {
            info!(
                "Reconciled {}: adopted {:?}, dropped {:?}",
                user.username, report.adopted, report.dropped
            );
        }

        Ok(report)
    }

    async fn remove_file(&self, file: &StoredFile) -> Result<DeleteOutcome> {
        if !FileQueries::delete_by_id(self.database.pool(), file.id).await? {
            return Ok(DeleteOutcome::NotFound);
        }

        let key = ObjectKey::new(file.owner_id, file.name.as_str());
        match self.storage.remove(&key).await {
            Ok(true) => {}
            Ok(false) => warn!("Object {} was already gone", key),
            Err(e) => error!("Record removed but object {} remains: {}", key, e),
        }

        info!("Deleted {} ({} bytes)", key, file.size_bytes);
        Ok(DeleteOutcome::Deleted {
            bytes_freed: file.size_bytes.max(0) as u64,
        })
    }

    async fn write_guard(&self, user_id: Uuid) -> Option<OwnedMutexGuard<()>> {
        if self.config.serialize_user_writes {
            Some(self.locks.lock(user_id).await)
        } else {
            None
        }
    }

    /// Current usage plus the same-name file an upload would replace.
    async fn headroom(&self, user: &UserIdentity, name: &str) -> Result<(Usage, Option<StoredFile>)> {
        let usage = self.usage(user).await?;
        let previous = FileQueries::find_by_name(self.database.pool(), user.id, name).await?;

        Ok((usage, previous))
    }

    /// Puts the record back the way it was before a failed write.
    async fn restore_record(&self, written: &StoredFile, previous: Option<&StoredFile>) {
        let restored = match previous {
            Some(previous) => {
                let record = NewFileRecord {
                    owner_id: previous.owner_id,
                    name: &previous.name,
                    size_bytes: previous.size_bytes,
                    location: &previous.location,
                    sha256: &previous.sha256,
                };
                FileQueries::upsert(self.database.pool(), &record).await.map(|_| ())
            }
            None => FileQueries::delete_by_id(self.database.pool(), written.id).await.map(|_| ()),
        };

        if let Err(e) = restored {
            error!("Failed to restore record for {}: {}", written.name, e);
        }
    }

    fn exceeds_quota(&self, usage: Usage, replaced: u64, incoming: u64) -> bool {
        usage
            .used_bytes
            .saturating_sub(replaced)
            .saturating_add(incoming)
            > self.config.quota_limit_bytes
    }

    async fn reject(&self, user: &UserIdentity, name: &str, reason: UploadReason) -> Result<UploadResult> {
        let usage = self.usage(user).await?;
        Ok(self.rejected_with(user, name, reason, usage))
    }

    fn rejected_with(&self, user: &UserIdentity, name: &str, reason: UploadReason, usage: Usage) -> UploadResult {
        warn!("Rejected upload {:?} for {}: {:?}", name, user.username, reason);
        UploadResult::rejected(reason, usage)
    }

    /// Copies the stream into a staging file, hashing as it goes.
    /// `None` once more than `max_single_upload_bytes` arrived.
    async fn spool<R>(&self, reader: R) -> std::io::Result<Option<SpooledUpload>>
    where
        R: AsyncRead + Send + Unpin,
    {
        let staged = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".part")
            .tempfile_in(&self.config.staging_dir)?;
        let mut file = tokio::fs::File::from_std(staged.reopen()?);

        let limit = self.config.max_single_upload_bytes;
        let mut reader = reader.take(limit.saturating_add(1));
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; SPOOL_CHUNK_SIZE];
        let mut size: u64 = 0;

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }

            size += n as u64;
            if size > limit {
                return Ok(None);
            }

            hasher.update(&buffer[..n]);
            file.write_all(&buffer[..n]).await?;
        }

        file.flush().await?;

        Ok(Some(SpooledUpload {
            file: staged,
            size,
            sha256: format!("{:x}", hasher.finalize()),
        }))
    }

    async fn digest(&self, key: &ObjectKey) -> Result<String> {
        let mut reader = self.storage.retrieve(key).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; SPOOL_CHUNK_SIZE];

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}
