use common::retry::RetryAttempt;
use common::storage::StorageError;
use thiserror::Error;

use crate::filename::FileNameError;
use crate::ids::StoreId;
use crate::ownership::{OwnershipLevel, Scope};

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file name: {0}")]
    InvalidName(#[from] FileNameError),

    /// Saving at a scope other than the one the file is bound to.
    #[error("Scope conflict: file is {current}, cannot save at {requested} scope")]
    ScopeConflict {
        current: OwnershipLevel,
        requested: Scope,
    },

    /// The store could not be reached; retries were exhausted.
    #[error("Network error after {attempts} attempt(s): {last_error}")]
    Network {
        attempts: usize,
        last_error: String,
        history: Vec<RetryAttempt>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The store rejected the request.
    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stores {from} and {to} do not share a membership registry")]
    ForeignStore { from: StoreId, to: StoreId },

    #[error("No Tokio runtime available")]
    NoRuntime,

    #[error("Operation abandoned before completion")]
    Abandoned,
}

impl From<StorageError> for SdkError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => SdkError::NotFound(what),
            other => SdkError::Remote(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;
