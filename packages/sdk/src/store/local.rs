use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::config::{RetryConfig, StoreConfig};
use common::retry::{RetryCleanupGuard, RetryDecision, RetryTracker, calculate_backoff};
use common::storage::filesystem::FilesystemBlobStore;
use common::storage::memory::MemoryBlobStore;
use common::{BlobStore, ContentHash, StorageError};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::index::ObjectIndex;
use super::{DownloadedFile, FileStore, StoredObject, UploadReceipt, UploadRequest};
use crate::error::{Result, SdkError};
use crate::ids::StoreId;
use crate::membership::Membership;
use crate::ownership::Scope;

/// File store over a content-addressed blob backend.
///
/// Objects are indexed by `(scope, name)`; identical content under several
/// keys shares one blob. Transient backend failures are retried with backoff.
pub struct Store {
    id: StoreId,
    membership: Arc<Membership>,
    blobs: Arc<dyn BlobStore>,
    index: Mutex<ObjectIndex>,
    index_path: Option<PathBuf>,
    max_file_size: u64,
    retry: RetryConfig,
    retry_tracker: Arc<Mutex<RetryTracker>>,
}

impl Store {
    pub fn new(membership: Arc<Membership>, blobs: Arc<dyn BlobStore>, retry: RetryConfig) -> Self {
        Self {
            id: StoreId::new(),
            membership,
            blobs,
            index: Mutex::new(ObjectIndex::new()),
            index_path: None,
            max_file_size: u64::MAX,
            retry_tracker: Arc::new(Mutex::new(RetryTracker::new(retry.max_retries))),
            retry,
        }
    }

    /// Store kept entirely in memory.
    pub fn in_memory(membership: Arc<Membership>, retry: RetryConfig) -> Self {
        Self::new(membership, Arc::new(MemoryBlobStore::new()), retry)
    }

    /// Filesystem store under `config.data_dir`: blobs in `blobs/`, index in
    /// `index.json` when `persist_index` is set.
    pub async fn open(
        membership: Arc<Membership>,
        config: &StoreConfig,
        retry: RetryConfig,
    ) -> Result<Self> {
        let blobs =
            FilesystemBlobStore::new(config.data_dir.join("blobs"), config.max_file_size).await?;
        let store = Self::new(membership, Arc::new(blobs), retry)
            .with_max_file_size(config.max_file_size);

        if config.persist_index {
            store.with_index_file(config.data_dir.join("index.json")).await
        } else {
            Ok(store)
        }
    }

    pub fn with_max_file_size(mut self, limit: u64) -> Self {
        self.max_file_size = limit;
        self
    }

    /// Load the index from `path` and write it back there after every change.
    pub async fn with_index_file(mut self, path: PathBuf) -> Result<Self> {
        let index = ObjectIndex::load(&path).await?;
        debug!(store_id = %self.id, path = %path.display(), objects = index.len(), "Index loaded");
        self.index = Mutex::new(index);
        self.index_path = Some(path);
        Ok(self)
    }

    async fn persist_index(&self, index: &ObjectIndex) -> Result<()> {
        if let Some(path) = &self.index_path {
            index.save(path).await?;
        }
        Ok(())
    }

    /// Drop the blob behind `hash` once nothing references it. Best effort.
    async fn release_blob(&self, index: &ObjectIndex, hash: &ContentHash) {
        if index.references(hash) > 0 {
            return;
        }
        if let Err(e) = self.blobs.delete(hash).await {
            warn!(store_id = %self.id, hash = %hash.short(), error = %e, "Failed to delete unreferenced blob");
        }
    }

    /// Write the content blob, retrying transient failures.
    async fn put_with_retry(&self, request: &UploadRequest) -> Result<ContentHash> {
        let key = request.file_id.to_string();
        let mut cleanup_guard = RetryCleanupGuard::new(&self.retry_tracker, key.as_str());

        loop {
            match self.blobs.put(&request.content).await {
                Ok(hash) => {
                    self.retry_tracker.lock().await.clear(&key);
                    cleanup_guard.defuse();
                    return Ok(hash);
                }
                Err(e) if e.is_transient() => {
                    let error_str = e.to_string();
                    let decision = self
                        .retry_tracker
                        .lock()
                        .await
                        .record_failure(&key, &error_str);

                    match decision {
                        RetryDecision::Retry { attempt, .. } => {
                            let delay = calculate_backoff(
                                attempt,
                                self.retry.base_delay_ms,
                                self.retry.max_delay_ms,
                            );
                            warn!(
                                store_id = %self.id,
                                file_id = %request.file_id,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Retrying upload"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::Exhausted { history } => {
                            error!(
                                store_id = %self.id,
                                file_id = %request.file_id,
                                retry_count = history.len(),
                                error = %e,
                                "Upload retries exhausted"
                            );
                            cleanup_guard.defuse();
                            return Err(SdkError::Network {
                                attempts: history.len(),
                                last_error: error_str,
                                history,
                            });
                        }
                    }
                }
                Err(e) => {
                    self.retry_tracker.lock().await.clear(&key);
                    cleanup_guard.defuse();
                    return Err(e.into());
                }
            }
        }
    }
}

#[async_trait]
impl FileStore for Store {
    fn id(&self) -> StoreId {
        self.id
    }

    fn membership(&self) -> &Arc<Membership> {
        &self.membership
    }

    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt> {
        let size = request.content.len() as u64;
        if size > self.max_file_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: size,
                limit: self.max_file_size,
            }
            .into());
        }

        let hash = self.put_with_retry(&request).await?;
        let now = Utc::now();
        let object = StoredObject {
            scope: request.scope.clone(),
            name: request.name.clone(),
            content_hash: hash,
            size,
            mime_type: request.mime_type.clone(),
            updated_at: now,
        };

        {
            let mut index = self.index.lock().await;

            // A removal may have released the blob between the write and the lock.
            if !self.blobs.exists(&hash).await? {
                debug!(store_id = %self.id, hash = %hash.short(), "Blob released during upload, writing again");
                self.put_with_retry(&request).await?;
            }

            let replaced = index.insert(object);
            if let Err(e) = self.persist_index(&index).await {
                match replaced {
                    Some(old) => index.insert(old),
                    None => index.remove(&request.scope, &request.name),
                };
                self.release_blob(&index, &hash).await;
                return Err(e);
            }
            if let Some(old) = replaced
                && old.content_hash != hash
            {
                self.release_blob(&index, &old.content_hash).await;
            }
        }

        info!(
            store_id = %self.id,
            file_id = %request.file_id,
            scope = %request.scope,
            name = %request.name,
            size,
            hash = %hash.short(),
            "File uploaded"
        );

        Ok(UploadReceipt {
            store_id: self.id,
            scope: request.scope,
            name: request.name,
            content_hash: hash,
            size,
            mime_type: request.mime_type,
            stored_at: now,
        })
    }

    async fn download(&self, scope: &Scope, name: &str) -> Result<DownloadedFile> {
        let object = self
            .index
            .lock()
            .await
            .get(scope, name)
            .cloned()
            .ok_or_else(|| SdkError::NotFound(format!("{name} ({scope})")))?;

        let content = self.blobs.get(&object.content_hash).await?;
        if ContentHash::compute(&content) != object.content_hash {
            return Err(SdkError::Remote(format!(
                "stored content of {name} does not match its hash"
            )));
        }

        debug!(store_id = %self.id, scope = %scope, name, size = content.len(), "File downloaded");
        Ok(DownloadedFile { object, content })
    }

    async fn remove(&self, scope: &Scope, name: &str) -> Result<bool> {
        let mut index = self.index.lock().await;
        let Some(removed) = index.remove(scope, name) else {
            return Ok(false);
        };
        if let Err(e) = self.persist_index(&index).await {
            index.insert(removed);
            return Err(e);
        }
        self.release_blob(&index, &removed.content_hash).await;

        info!(store_id = %self.id, scope = %scope, name, "File removed");
        Ok(true)
    }

    async fn list(&self, scope: &Scope) -> Result<Vec<StoredObject>> {
        Ok(self.index.lock().await.list(scope))
    }
}
