//! Cluster client: the narrow get/put/delete/touch surface used by the
//! registry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ticketreg_core::{ConfigError, redact_id};

use crate::config::{CacheClusterConfig, NodeBackend};
use crate::error::CacheError;
use crate::failure::FailureMode;
use crate::locator::NodeLocator;
use crate::memory::MemoryNode;
use crate::node::CacheNode;
use crate::redis_node::RedisNode;

/// Longest key accepted by the cache protocol, in bytes.
pub const MAX_KEY_LEN: usize = 250;

/// Returns `true` if `key` can be stored as is.
///
/// Keys must be non-empty, at most [`MAX_KEY_LEN`] bytes and free of
/// whitespace and control characters.
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.chars().any(|c| c.is_whitespace() || c.is_control())
}

fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::invalid_key("key is empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(CacheError::invalid_key(format!(
            "key is {} bytes, maximum is {MAX_KEY_LEN}",
            key.len()
        )));
    }
    if !is_valid_key(key) {
        return Err(CacheError::invalid_key(
            "key contains whitespace or control characters",
        ));
    }
    Ok(())
}

// =============================================================================
// Client Trait
// =============================================================================

/// Key/value access to the cache cluster. A TTL of 0 means no expiry.
///
/// Every operation is idempotent.
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn put(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), CacheError>;

    /// Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Returns `true` if the key existed and its TTL was replaced.
    async fn touch(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError>;
}

// =============================================================================
// Cluster Client
// =============================================================================

/// Routes each key to its node and applies the failure mode.
#[derive(Debug)]
pub struct ClusterClient {
    nodes: Vec<Arc<dyn CacheNode>>,
    locator: NodeLocator,
    failure_mode: FailureMode,
    operation_timeout: Duration,
    max_retries: u32,
}

impl ClusterClient {
    /// Creates a client over already constructed nodes.
    ///
    /// Placement, failure mode, timeout and retries come from `config`; the
    /// node list replaces `config.servers`.
    #[must_use]
    pub fn with_nodes(config: &CacheClusterConfig, nodes: Vec<Arc<dyn CacheNode>>) -> Self {
        let addresses: Vec<&str> = nodes.iter().map(|node| node.address()).collect();
        let locator = NodeLocator::new(config.locator, config.hash_algorithm, &addresses);
        Self {
            nodes,
            locator,
            failure_mode: config.failure_mode,
            operation_timeout: config.operation_timeout,
            max_retries: config.max_retries,
        }
    }

    /// Builds the nodes listed in `config` and a client over them.
    ///
    /// Redis nodes connect lazily, so an unreachable server is reported by
    /// the first operation, not here.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configuration is invalid or a server
    /// address cannot be turned into a connection pool.
    pub fn from_config(config: &CacheClusterConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let nodes = config
            .servers
            .iter()
            .map(|server| -> Result<Arc<dyn CacheNode>, ConfigError> {
                match config.backend {
                    NodeBackend::Redis => Ok(Arc::new(RedisNode::new(
                        server,
                        config.pool_size,
                        config.operation_timeout,
                    )?)),
                    NodeBackend::Memory => Ok(Arc::new(MemoryNode::new(server.clone()))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            servers = config.servers.len(),
            backend = ?config.backend,
            locator = %config.locator,
            hash_algorithm = %config.hash_algorithm,
            failure_mode = %config.failure_mode,
            operation_timeout = ?config.operation_timeout,
            "Cache cluster client configured"
        );

        Ok(Self::with_nodes(config, nodes))
    }

    #[must_use]
    pub fn nodes(&self) -> &[Arc<dyn CacheNode>] {
        &self.nodes
    }

    #[must_use]
    pub fn locator(&self) -> &NodeLocator {
        &self.locator
    }

    #[must_use]
    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Addresses of the nodes `key` would be tried on, in order.
    #[must_use]
    pub fn locate(&self, key: &str) -> Vec<&str> {
        self.locator
            .sequence(key)
            .into_iter()
            .filter_map(|index| self.nodes.get(index))
            .map(|node| node.address())
            .collect()
    }

    /// Runs `op` on a single node, bounded by the operation timeout.
    async fn call<T, F, Fut>(&self, index: usize, op: &F) -> Result<T, CacheError>
    where
        F: Fn(Arc<dyn CacheNode>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, CacheError>> + Send,
        T: Send,
    {
        let node = self.nodes.get(index).cloned().ok_or(CacheError::NoNodes)?;
        let address = node.address().to_string();
        match tokio::time::timeout(self.operation_timeout, op(node)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::timeout(address, self.operation_timeout)),
        }
    }

    /// Validates the key, picks the node(s) and applies the failure mode.
    async fn execute<T, F, Fut>(&self, command: &'static str, key: &str, op: F) -> Result<T, CacheError>
    where
        F: Fn(Arc<dyn CacheNode>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, CacheError>> + Send,
        T: Send,
    {
        validate_key(key)?;

        let sequence = self.locator.sequence(key);
        let Some(&primary) = sequence.first() else {
            return Err(CacheError::NoNodes);
        };

        let attempts: Vec<usize> = match self.failure_mode {
            FailureMode::Cancel => vec![primary],
            FailureMode::Redistribute => sequence,
            FailureMode::Retry => {
                let tries = usize::try_from(self.max_retries).unwrap_or(usize::MAX);
                std::iter::repeat_n(primary, tries.saturating_add(1)).collect()
            }
        };

        let mut last_error = None;
        for (attempt, &index) in attempts.iter().enumerate() {
            match self.call(index, &op).await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(
                            command,
                            key = %redact_id(key),
                            attempt,
                            "cache operation succeeded after failover"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if e.is_node_failure() => {
                    tracing::warn!(
                        command,
                        key = %redact_id(key),
                        failure_mode = %self.failure_mode,
                        error = %e,
                        "Cache node failure"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let last_error = last_error.unwrap_or(CacheError::NoNodes);
        match self.failure_mode {
            FailureMode::Redistribute if attempts.len() > 1 => {
                Err(CacheError::AllNodesUnavailable {
                    attempts: attempts.len(),
                    last_error: last_error.to_string(),
                })
            }
            _ => Err(last_error),
        }
    }
}

#[async_trait]
impl CacheClient for ClusterClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.execute("get", key, move |node| async move { node.get(key).await })
            .await
    }

    async fn put(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), CacheError> {
        self.execute("set", key, move |node| async move {
            node.set(key, value, ttl_secs).await
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.execute("delete", key, move |node| async move { node.delete(key).await })
            .await
    }

    async fn touch(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError> {
        self.execute("touch", key, move |node| async move {
            node.touch(key, ttl_secs).await
        })
        .await
    }
}
