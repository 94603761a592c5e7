//! Registry error types.

use ticketreg_cache::CacheError;
use ticketreg_codec::CodecError;
use ticketreg_core::ConfigError;

/// Errors surfaced by the ticket registry.
///
/// Payload corruption is deliberately absent: a payload that fails
/// authentication or decoding is reported as a missing ticket.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The cache cluster could not serve the request.
    #[error("Ticket storage unavailable: {message}")]
    StorageUnavailable { message: String },

    /// The ticket cannot be stored (for example an empty id).
    #[error("Invalid ticket: {message}")]
    InvalidTicket { message: String },

    /// The registry was built from an invalid configuration.
    #[error("Registry configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The ticket could not be serialized or protected.
    #[error("Ticket encode error: {message}")]
    Encode { message: String },
}

impl RegistryError {
    /// Creates a new `StorageUnavailable` error.
    #[must_use]
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidTicket` error.
    #[must_use]
    pub fn invalid_ticket(message: impl Into<String>) -> Self {
        Self::InvalidTicket {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}

impl From<CacheError> for RegistryError {
    fn from(err: CacheError) -> Self {
        if err.is_client_error() {
            Self::invalid_ticket(err.to_string())
        } else {
            Self::storage_unavailable(err.to_string())
        }
    }
}

impl From<CodecError> for RegistryError {
    fn from(err: CodecError) -> Self {
        Self::Encode {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cache_errors_map_to_storage_unavailable() {
        let err: RegistryError = CacheError::timeout("cache1:6379", Duration::from_secs(1)).into();
        assert!(matches!(err, RegistryError::StorageUnavailable { .. }));
        assert!(err.is_transient());

        let err: RegistryError = CacheError::NoNodes.into();
        assert!(matches!(err, RegistryError::StorageUnavailable { .. }));

        let err: RegistryError = CacheError::invalid_key("too long").into();
        assert!(matches!(err, RegistryError::InvalidTicket { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: RegistryError = ConfigError::missing("crypto.key").into();
        assert!(matches!(err, RegistryError::Configuration(ConfigError::Missing(_))));
    }
}
