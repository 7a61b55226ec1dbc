use std::path::PathBuf;

use serde::Deserialize;

/// Base directory for everything the SDK keeps on disk.
///
/// `<platform cache dir>/cumulus`, or `./.cumulus` where the platform has none.
pub fn default_base_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("cumulus"))
        .unwrap_or_else(|| PathBuf::from(".cumulus"))
}

/// File store configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Where blobs and the object index live. Default: `<base>/store`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Largest accepted file in bytes. Default: 64 MiB.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Whether the object index is written to `data_dir/index.json`. Default: true.
    #[serde(default = "default_persist_index")]
    pub persist_index: bool,
}

fn default_data_dir() -> PathBuf {
    default_base_dir().join("store")
}
fn default_max_file_size() -> u64 {
    64 * 1024 * 1024
}
fn default_persist_index() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_file_size: default_max_file_size(),
            persist_index: default_persist_index(),
        }
    }
}

/// Local offline cache configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Directory cached file copies are written to. Default: `<base>/files`.
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
}

fn default_cache_root() -> PathBuf {
    default_base_dir().join("files")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
        }
    }
}

/// Upload retry policy.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Retries after the first failed attempt. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Backoff base delay. Default: 200 ms.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling. Default: 5000 ms.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u8 {
    3
}
fn default_base_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    5_000
}

impl RetryConfig {
    /// No waiting between attempts. Intended for tests.
    pub fn immediate(max_retries: u8) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}
