//! Cache cluster configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ticketreg_core::ConfigError;

use crate::failure::FailureMode;
use crate::hash::HashAlgorithm;
use crate::locator::LocatorType;

/// Node implementation used for every configured server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeBackend {
    /// Independent Redis servers.
    #[default]
    Redis,
    /// In-process maps, for single-instance deployments and tests.
    Memory,
}

/// Cache cluster settings.
///
/// # Example (TOML)
///
/// ```toml
/// [cache]
/// servers = "cache1:6379,cache2:6379"
/// locator = "CONSISTENT"
/// hash_algorithm = "KETAMA_HASH"
/// failure_mode = "Redistribute"
/// operation_timeout = "500ms"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheClusterConfig {
    /// Server addresses, as a list or a comma-separated string.
    #[serde(deserialize_with = "deserialize_servers")]
    pub servers: Vec<String>,

    pub backend: NodeBackend,

    pub locator: LocatorType,

    pub hash_algorithm: HashAlgorithm,

    pub failure_mode: FailureMode,

    /// Upper bound for a single node call.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Connections per server.
    pub pool_size: usize,

    /// Extra attempts on the primary node in `retry` mode.
    pub max_retries: u32,
}

impl Default for CacheClusterConfig {
    fn default() -> Self {
        Self {
            servers: vec!["localhost:6379".to_string()],
            backend: NodeBackend::default(),
            locator: LocatorType::default(),
            hash_algorithm: HashAlgorithm::default(),
            failure_mode: FailureMode::default(),
            operation_timeout: Duration::from_secs(1),
            pool_size: 10,
            max_retries: 2,
        }
    }
}

impl CacheClusterConfig {
    /// Validates the cluster settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` for an empty server list and
    /// `ConfigError::InvalidValue` for zero timeouts, zero pool size or
    /// duplicate servers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::missing("cache.servers"));
        }
        if let Some(blank) = self.servers.iter().position(|s| s.trim().is_empty()) {
            return Err(ConfigError::invalid_value(format!(
                "cache.servers[{blank}] is empty"
            )));
        }
        for (i, server) in self.servers.iter().enumerate() {
            if self.servers[..i].contains(server) {
                return Err(ConfigError::invalid_value(format!(
                    "cache.servers lists '{server}' twice"
                )));
            }
        }
        if self.operation_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "cache.operation_timeout must be > 0",
            ));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::invalid_value("cache.pool_size must be > 0"));
        }
        Ok(())
    }
}

fn deserialize_servers<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        Csv(String),
        List(Vec<String>),
    }

    let servers = match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::Csv(s) => s.split(',').map(str::to_string).collect::<Vec<_>>(),
        ListOrCsv::List(v) => v,
    };
    Ok(servers
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
