//! The store side of file persistence.
//!
//! [`FileStore`] is the seam persisted files talk to. [`Store`] is the
//! implementation shipped with the SDK, backed by any [`common::BlobStore`].

mod index;
mod local;

pub use index::ObjectIndex;
pub use local::Store;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::{FileId, StoreId};
use crate::membership::Membership;
use crate::ownership::Scope;

/// Everything a store needs to persist one file.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_id: FileId,
    pub name: String,
    pub mime_type: String,
    pub scope: Scope,
    pub content: Arc<[u8]>,
}

/// Proof of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub store_id: StoreId,
    pub scope: Scope,
    pub name: String,
    pub content_hash: ContentHash,
    pub size: u64,
    pub mime_type: String,
    pub stored_at: DateTime<Utc>,
}

/// Index entry for one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub scope: Scope,
    pub name: String,
    pub content_hash: ContentHash,
    pub size: u64,
    pub mime_type: String,
    pub updated_at: DateTime<Utc>,
}

/// A stored object together with its bytes.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub object: StoredObject,
    pub content: Vec<u8>,
}

/// Store collaborator of persisted files.
///
/// Membership methods are synchronous and go through the shared registry;
/// persistence methods are asynchronous.
#[async_trait]
pub trait FileStore: Send + Sync {
    fn id(&self) -> StoreId;

    /// Registry this store records its members in.
    fn membership(&self) -> &Arc<Membership>;

    /// Make `file` a member of this store, moving it out of any other store of
    /// the same registry. Returns the previous store.
    fn attach(&self, file: FileId) -> Option<StoreId> {
        self.membership().attach(file, self.id())
    }

    /// Remove `file` from this store's members. `false` if it was not a member.
    fn detach(&self, file: FileId) -> bool {
        self.membership().detach_from(file, self.id())
    }

    fn contains(&self, file: FileId) -> bool {
        self.membership().contains(self.id(), file)
    }

    /// Member files, in id order.
    fn files(&self) -> Vec<FileId> {
        self.membership().files_in(self.id())
    }

    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt>;

    async fn download(&self, scope: &Scope, name: &str) -> Result<DownloadedFile>;

    /// Delete a stored object. `false` if there was nothing under that key.
    async fn remove(&self, scope: &Scope, name: &str) -> Result<bool>;

    /// Stored objects of one scope, in name order.
    async fn list(&self, scope: &Scope) -> Result<Vec<StoredObject>>;
}
