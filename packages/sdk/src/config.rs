use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::{CacheConfig, RetryConfig, StoreConfig};

/// SDK configuration, resolved once at application start.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SdkConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl SdkConfig {
    /// Load from `config/cumulus.*` (or the path in `CUMULUS_CONFIG`), then from
    /// `CUMULUS__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CUMULUS_CONFIG").unwrap_or_else(|_| "config/cumulus".to_string());
        Self::build(Config::builder().add_source(File::with_name(&config_path).required(false)))
    }

    /// Load from an explicit file, then the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from(path)))
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let s = builder
            .add_source(
                Environment::with_prefix("CUMULUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}
