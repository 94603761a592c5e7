//! Cache client error types.

use std::time::Duration;

/// Errors raised by cache nodes and the cluster client.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A node could not be reached or rejected the command.
    #[error("Cache node {node} unavailable: {message}")]
    NodeUnavailable { node: String, message: String },

    /// A node did not answer within the operation timeout.
    #[error("Cache node {node} timed out after {timeout:?}")]
    Timeout { node: String, timeout: Duration },

    /// Every node in the fallback order failed.
    #[error("All cache nodes unavailable after {attempts} attempts: {last_error}")]
    AllNodesUnavailable { attempts: usize, last_error: String },

    /// The cluster has no nodes configured.
    #[error("No cache nodes configured")]
    NoNodes,

    /// The key cannot be stored by the cache protocol.
    #[error("Invalid cache key: {message}")]
    InvalidKey { message: String },
}

impl CacheError {
    /// Creates a new `NodeUnavailable` error.
    #[must_use]
    pub fn node_unavailable(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeUnavailable {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(node: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            node: node.into(),
            timeout,
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if the error means the storage could not be reached.
    ///
    /// These errors trigger failover and map to "storage unavailable" at the
    /// registry boundary.
    #[must_use]
    pub fn is_node_failure(&self) -> bool {
        matches!(
            self,
            Self::NodeUnavailable { .. }
                | Self::Timeout { .. }
                | Self::AllNodesUnavailable { .. }
                | Self::NoNodes
        )
    }

    /// Returns `true` if the caller supplied a bad request.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidKey { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(CacheError::node_unavailable("a:1", "refused").is_node_failure());
        assert!(CacheError::timeout("a:1", Duration::from_millis(5)).is_node_failure());
        assert!(CacheError::NoNodes.is_node_failure());
        assert!(!CacheError::invalid_key("bad").is_node_failure());
        assert!(CacheError::invalid_key("bad").is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = CacheError::node_unavailable("cache1:6379", "connection refused");
        assert_eq!(
            err.to_string(),
            "Cache node cache1:6379 unavailable: connection refused"
        );
    }
}
