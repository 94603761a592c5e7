//! Registry configuration.
//!
//! Loaded from `ticketreg.toml` (or an explicit path) with
//! `TICKETREG__`-prefixed environment overrides, for example
//! `TICKETREG__CACHE__SERVERS=cache1:6379,cache2:6379`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ticketreg_cache::{CacheClusterConfig, is_valid_key};
use ticketreg_codec::{CipherConfig, DEFAULT_COMPRESSION_THRESHOLD};
use ticketreg_core::ConfigError;

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "cas";

/// Longest accepted namespace. Leaves room for a 128 character digest.
const MAX_NAMESPACE_LEN: usize = 100;

/// Top-level registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Prefix of every cache key.
    pub namespace: String,

    /// Serialized bodies above this size are deflate-compressed. 0 disables
    /// compression.
    pub compression_threshold: usize,

    pub cache: CacheClusterConfig,

    pub crypto: CipherConfig,

    pub cleaner: CleanerConfig,

    pub logging: LoggingConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            cache: CacheClusterConfig::default(),
            crypto: CipherConfig::default(),
            cleaner: CleanerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::missing("namespace"));
        }
        if self.namespace.len() > MAX_NAMESPACE_LEN || !is_valid_key(&self.namespace) {
            return Err(ConfigError::invalid_value(format!(
                "namespace must be at most {MAX_NAMESPACE_LEN} bytes without whitespace or control characters"
            )));
        }
        self.cache.validate()?;
        self.crypto.validate()?;
        self.cleaner.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Compression threshold as understood by the transcoder.
    #[must_use]
    pub fn compression(&self) -> Option<usize> {
        (self.compression_threshold > 0).then_some(self.compression_threshold)
    }
}

/// Periodic cleaner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Run the cleaner when the backend supports it.
    pub enabled: bool,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(120),
        }
    }
}

impl CleanerConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.interval.is_zero() {
            return Err(ConfigError::invalid_value("cleaner.interval must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unknown level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&level.as_str()) {
            return Err(ConfigError::invalid_value(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

pub mod loader {
    use std::path::{Path, PathBuf};

    use config::{Config, Environment, File};
    use ticketreg_core::ConfigError;

    use super::RegistryConfig;

    /// Default configuration file, looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "ticketreg.toml";

    /// Environment variable prefix for overrides.
    pub const ENV_PREFIX: &str = "TICKETREG";

    /// Loads and validates the configuration.
    ///
    /// An explicit `path` must exist. Without one, `ticketreg.toml` is used
    /// if present. Environment overrides are always applied.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if a source cannot be read or
    /// deserialized, or the validation error.
    pub fn load_config(path: Option<&Path>) -> Result<RegistryConfig, ConfigError> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::missing(format!(
                        "configuration file {}",
                        p.display()
                    )));
                }
                builder = builder.add_source(File::from(p.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., TICKETREG__CACHE__FAILURE_MODE=cancel
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::parse(format!("config build error: {e}")))?;
        let merged: RegistryConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::parse(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}
