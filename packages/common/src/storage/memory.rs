use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::error::StorageError;
use super::hash::ContentHash;
use super::traits::BlobStore;

/// In-process blob store.
///
/// Used for offline sessions and tests. `fail_next_puts` makes the next `n`
/// writes fail with [`StorageError::Unavailable`], which is how tests exercise
/// the retry path of the file store.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<ContentHash, Vec<u8>>>,
    max_size: Option<u64>,
    pending_failures: AtomicUsize,
    put_calls: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(max_size: u64) -> Self {
        Self {
            max_size: Some(max_size),
            ..Self::default()
        }
    }

    /// Make the next `n` calls to `put` fail as if the backend were offline.
    pub fn fail_next_puts(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of `put` calls seen, including failed ones.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, data: &[u8]) -> Result<ContentHash, StorageError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Unavailable("injected failure".into()));
        }

        if let Some(limit) = self.max_size
            && data.len() as u64 > limit
        {
            return Err(StorageError::SizeLimitExceeded {
                actual: data.len() as u64,
                limit,
            });
        }

        let hash = ContentHash::compute(data);
        self.blobs
            .lock()
            .await
            .entry(hash)
            .or_insert_with(|| data.to_vec());
        Ok(hash)
    }

    async fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .lock()
            .await
            .get(hash)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(hash.to_hex()))
    }

    async fn exists(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        Ok(self.blobs.lock().await.contains_key(hash))
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        Ok(self.blobs.lock().await.remove(hash).is_some())
    }
}
