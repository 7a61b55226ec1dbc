use std::path::Path;
use std::sync::Arc;

use common::BlobStore;
use tokio::runtime::Handle;
use tracing::info;

use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::file::PersistedFile;
use crate::membership::Membership;
use crate::ownership::Scope;
use crate::store::{FileStore, Store, StoredObject};

/// Entry point of the SDK.
///
/// Owns the configuration, the membership registry shared by every store it
/// creates, and the default store files are saved to when they have none.
#[derive(Clone)]
pub struct Client {
    config: Arc<SdkConfig>,
    membership: Arc<Membership>,
    default_store: Arc<dyn FileStore>,
    runtime: Handle,
}

impl Client {
    /// Client whose default store lives under `config.store.data_dir`.
    pub async fn open(config: SdkConfig) -> Result<Self> {
        let membership = Arc::new(Membership::new());
        let store = Store::open(Arc::clone(&membership), &config.store, config.retry.clone()).await?;
        info!(
            store_id = %store.id(),
            data_dir = %config.store.data_dir.display(),
            "Default store opened"
        );
        Self::assemble(config, membership, Arc::new(store))
    }

    /// Client whose default store keeps everything in memory.
    ///
    /// Must be called from within a tokio runtime.
    pub fn in_memory(config: SdkConfig) -> Result<Self> {
        let membership = Arc::new(Membership::new());
        let store = Store::in_memory(Arc::clone(&membership), config.retry.clone())
            .with_max_file_size(config.store.max_file_size);
        Self::assemble(config, membership, Arc::new(store))
    }

    /// Client with a caller-provided default store. The store's registry
    /// becomes the client's registry.
    pub fn with_default_store(config: SdkConfig, store: Arc<dyn FileStore>) -> Result<Self> {
        let membership = Arc::clone(store.membership());
        Self::assemble(config, membership, store)
    }

    fn assemble(
        config: SdkConfig,
        membership: Arc<Membership>,
        default_store: Arc<dyn FileStore>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| SdkError::NoRuntime)?;
        Ok(Self {
            config: Arc::new(config),
            membership,
            default_store,
            runtime,
        })
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn membership(&self) -> &Arc<Membership> {
        &self.membership
    }

    pub fn default_store(&self) -> Arc<dyn FileStore> {
        Arc::clone(&self.default_store)
    }

    /// Runtime tickets complete on.
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn cache_root(&self) -> &Path {
        &self.config.cache.root
    }

    /// A further store over `blobs`, sharing this client's registry so files can
    /// move between it and the default store.
    pub fn create_store(&self, blobs: Arc<dyn BlobStore>) -> Arc<Store> {
        Arc::new(
            Store::new(Arc::clone(&self.membership), blobs, self.config.retry.clone())
                .with_max_file_size(self.config.store.max_file_size),
        )
    }

    /// An in-memory store sharing this client's registry.
    pub fn create_memory_store(&self) -> Arc<Store> {
        Arc::new(
            Store::in_memory(Arc::clone(&self.membership), self.config.retry.clone())
                .with_max_file_size(self.config.store.max_file_size),
        )
    }

    /// Download `name` from `scope` of the default store.
    ///
    /// The returned file is attached to the default store with its level
    /// resolved from `scope`.
    pub async fn fetch_file(&self, scope: &Scope, name: &str) -> Result<PersistedFile> {
        let downloaded = self.default_store.download(scope, name).await?;
        PersistedFile::restored(
            downloaded.content,
            &downloaded.object.name,
            downloaded.object.mime_type,
            scope,
            self.default_store(),
        )
    }

    /// Objects stored in `scope` of the default store.
    pub async fn list_files(&self, scope: &Scope) -> Result<Vec<StoredObject>> {
        self.default_store.list(scope).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("default_store", &self.default_store.id())
            .field("cache_root", &self.config.cache.root)
            .finish_non_exhaustive()
    }
}
