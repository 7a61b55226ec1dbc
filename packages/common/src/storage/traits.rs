use async_trait::async_trait;

use super::error::StorageError;
use super::hash::ContentHash;

/// Content-addressed blob storage.
///
/// Writing the same bytes twice yields the same hash and keeps one copy.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return their content hash.
    async fn put(&self, data: &[u8]) -> Result<ContentHash, StorageError>;

    /// Retrieve all bytes of a blob.
    async fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, StorageError>;

    /// Whether a blob with this hash is present.
    async fn exists(&self, hash: &ContentHash) -> Result<bool, StorageError>;

    /// Delete a blob.
    ///
    /// Returns `true` if the blob was deleted, `false` if it did not exist.
    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError>;
}
