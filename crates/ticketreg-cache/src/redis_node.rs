//! Redis-backed cache node.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;
use ticketreg_core::ConfigError;

use crate::error::CacheError;
use crate::node::CacheNode;

/// One Redis server with its own connection pool.
///
/// Servers are independent: no Redis Cluster slots, no replication awareness.
/// Placement across servers is decided by the client-side locator.
#[derive(Clone)]
pub struct RedisNode {
    address: String,
    pool: Pool,
}

impl std::fmt::Debug for RedisNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisNode")
            .field("address", &self.address)
            .field("pool", &self.pool.status())
            .finish()
    }
}

impl RedisNode {
    /// Creates a node for `address` (`host:port` or a `redis://` URL).
    ///
    /// No connection is opened until the first command.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the pool cannot be built from
    /// the address.
    pub fn new(address: &str, pool_size: usize, timeout: Duration) -> Result<Self, ConfigError> {
        let url = if address.starts_with("redis://") || address.starts_with("rediss://") {
            address.to_string()
        } else {
            format!("redis://{address}")
        };

        let mut pool_config = deadpool_redis::PoolConfig::new(pool_size);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let mut redis_config = deadpool_redis::Config::from_url(url);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| {
                ConfigError::invalid_value(format!("cache server '{address}': {e}"))
            })?;

        tracing::debug!(address = %address, pool_size, "Created Redis node");

        Ok(Self {
            address: address.to_string(),
            pool,
        })
    }

    async fn connection(&self) -> Result<Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::node_unavailable(&self.address, e.to_string()))
    }

    fn command_error(&self, e: &redis::RedisError) -> CacheError {
        CacheError::node_unavailable(&self.address, e.to_string())
    }
}

#[async_trait]
impl CacheNode for RedisNode {
    fn address(&self) -> &str {
        &self.address
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|e| self.command_error(&e))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let result = if ttl_secs == 0 {
            conn.set::<_, _, ()>(key, value).await
        } else {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs).await
        };
        result.map_err(|e| self.command_error(&e))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(key).await.map_err(|e| self.command_error(&e))?;
        Ok(removed > 0)
    }

    async fn touch(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        if ttl_secs == 0 {
            // PERSIST answers 0 both for a missing key and for a key without
            // a TTL, so existence is checked separately.
            let exists: bool = conn.exists(key).await.map_err(|e| self.command_error(&e))?;
            if exists {
                conn.persist::<_, ()>(key)
                    .await
                    .map_err(|e| self.command_error(&e))?;
            }
            Ok(exists)
        } else {
            let seconds = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
            conn.expire::<_, bool>(key, seconds)
                .await
                .map_err(|e| self.command_error(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_accepts_host_port_and_url() {
        let timeout = Duration::from_millis(100);
        let node = RedisNode::new("cache1.example.org:6379", 4, timeout).unwrap();
        assert_eq!(node.address(), "cache1.example.org:6379");

        let node = RedisNode::new("redis://cache2.example.org:6380/1", 4, timeout).unwrap();
        assert_eq!(node.address(), "redis://cache2.example.org:6380/1");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_node_failure() {
        // Nothing listens on port 1
        let node = RedisNode::new("127.0.0.1:1", 1, Duration::from_millis(200)).unwrap();
        let err = node.get("key").await.unwrap_err();
        assert!(err.is_node_failure());
    }
}
