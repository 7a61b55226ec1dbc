//! Pieces shared by the SDK and its tools: blob backends, retry policy and
//! configuration sections.

pub mod config;
pub mod retry;
pub mod storage;

pub use config::{CacheConfig, RetryConfig, StoreConfig};
pub use retry::{RetryAttempt, RetryDecision, RetryTracker, calculate_backoff};
pub use storage::{BlobStore, ContentHash, StorageError};
