//! A single cache server.

use std::fmt;

use async_trait::async_trait;

use crate::error::CacheError;

/// One independent cache server.
///
/// Nodes know nothing about each other; placement and failover live in
/// [`ClusterClient`](crate::ClusterClient). A TTL of 0 means no expiry.
#[async_trait]
pub trait CacheNode: Send + Sync + fmt::Debug {
    /// Address identifying the node. Also used to place it on the continuum.
    fn address(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), CacheError>;

    /// Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Replaces the TTL of an existing key. Returns `true` if the key existed.
    async fn touch(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError>;
}
