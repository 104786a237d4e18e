//! Application configuration.
//!
//! Aggregates the per-module sections into a single [`Config`] that can be
//! loaded from YAML files or environment variables.

use serde::Deserialize;

use crate::bus::{MessagingConfig, PublishConfig};
use crate::cache::CacheConfig;
use crate::services::{ServiceConfig, ServiceOptions};
use crate::storage::StorageConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "STUDY_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "STUDY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub messaging: MessagingConfig,
    /// Retry policy for event publication.
    pub publish: PublishConfig,
    pub service: ServiceConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Sources, later overriding earlier:
    /// 1. `config.yaml` in the current directory (if it exists)
    /// 2. File at `path` (if provided)
    /// 3. File named by `STUDY_CONFIG` (if set)
    /// 4. `STUDY__SECTION__KEY` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Service tunables derived from the service, cache and publish sections.
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions::from_sections(&self.service, &self.cache, &self.publish)
    }
}

#[cfg(test)]
mod tests;
