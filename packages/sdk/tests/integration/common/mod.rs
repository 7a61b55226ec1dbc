use std::path::Path;
use std::sync::Arc;

use ::common::storage::memory::MemoryBlobStore;
use cumulus_sdk::config::RetryConfig;
use cumulus_sdk::{Client, PersistedFile, SdkConfig, Store, User};
use tempfile::TempDir;

/// Client over an in-memory default store with its cache in a temp directory.
pub struct TestClient {
    pub client: Client,
    pub dir: TempDir,
}

impl TestClient {
    pub fn new() -> Self {
        Self::with_retry(RetryConfig::immediate(0))
    }

    pub fn with_retry(retry: RetryConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = SdkConfig::default();
        config.cache.root = dir.path().join("cache");
        config.store.data_dir = dir.path().join("store");
        config.retry = retry;
        let client = Client::in_memory(config).expect("Failed to create client");
        Self { client, dir }
    }

    /// Client whose default store writes through `blobs`.
    pub fn with_blobs(blobs: Arc<MemoryBlobStore>, retry: RetryConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = SdkConfig::default();
        config.cache.root = dir.path().join("cache");
        config.retry = retry.clone();
        let store = Store::new(Arc::new(cumulus_sdk::Membership::new()), blobs, retry);
        let client =
            Client::with_default_store(config, Arc::new(store)).expect("Failed to create client");
        Self { client, dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn store(&self) -> Arc<Store> {
        self.client.create_memory_store()
    }
}

pub fn app_file(body: &[u8], name: &str) -> PersistedFile {
    PersistedFile::new(body.to_vec(), name).expect("Failed to create file")
}

pub fn user_file(body: &[u8], name: &str, user: &str) -> PersistedFile {
    PersistedFile::with_owner(body.to_vec(), name, User::new(user), None)
        .expect("Failed to create file")
}
