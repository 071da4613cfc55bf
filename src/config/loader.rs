//! Configuration Loader
//!
//! Environment-aware loading built on the `config` crate. Sources, lowest
//! precedence first:
//!
//! 1. `<dir>/aggregation.{toml,yaml,json}` (optional)
//! 2. `<dir>/aggregation-<environment>.{toml,yaml,json}` (optional)
//! 3. `BFF__<SECTION>__<FIELD>` environment variables
//!
//! Missing files are not an error; the struct defaults fill every gap.

use super::error::{ConfigResult, ConfigurationError};
use super::AggregationConfig;
use crate::constants;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Detect the runtime environment from `BFF_ENV` / `APP_ENV`
pub fn detect_environment() -> String {
    constants::ENVIRONMENT_VARIABLES
        .iter()
        .find_map(|name| env::var(name).ok().filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| "development".to_string())
}

/// Loads `AggregationConfig` from a directory plus environment overrides
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_directory: PathBuf,
    environment: String,
}

impl ConfigLoader {
    /// Loader for `config_directory`, environment auto-detected
    pub fn new(config_directory: impl AsRef<Path>) -> Self {
        Self::with_environment(config_directory, detect_environment())
    }

    /// Loader with an explicit environment (useful in tests)
    pub fn with_environment(config_directory: impl AsRef<Path>, environment: impl Into<String>) -> Self {
        Self {
            config_directory: config_directory.as_ref().to_path_buf(),
            environment: environment.into(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Build, deserialize and validate the configuration
    pub fn load(&self) -> ConfigResult<AggregationConfig> {
        let base = self.config_directory.join("aggregation");
        let overlay = self
            .config_directory
            .join(format!("aggregation-{}", self.environment));

        debug!(
            environment = %self.environment,
            directory = %self.config_directory.display(),
            "Loading aggregation configuration"
        );

        let settings = Config::builder()
            .add_source(File::with_name(&base.to_string_lossy()).required(false))
            .add_source(File::with_name(&overlay.to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix(constants::CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                ConfigurationError::load_error(self.config_directory.display().to_string(), e)
            })?;

        let config: AggregationConfig = settings.try_deserialize().map_err(|e| {
            ConfigurationError::load_error(self.config_directory.display().to_string(), e)
        })?;

        config.validate()?;

        debug!(
            batch_window_ms = config.batcher.batch_window_ms,
            max_batch_size = config.batcher.max_batch_size,
            durable_cache = config.cache.redis_url.is_some(),
            default_timeout_ms = config.aggregator.default_timeout_ms,
            "Aggregation configuration loaded"
        );

        Ok(config)
    }
}
