//! Ticket id to cache key mapping.

use sha2::{Digest, Sha512};
use ticketreg_cache::is_valid_key;

/// Builds `namespace:<id>` cache keys.
///
/// The raw id is replaced by the hex SHA-512 of the id when payloads are
/// encrypted, so the cache never sees a usable ticket id, and whenever the
/// raw key would not be accepted by the cache protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketKeyStrategy {
    namespace: String,
    digest_ids: bool,
}

impl TicketKeyStrategy {
    #[must_use]
    pub fn new(namespace: impl Into<String>, digest_ids: bool) -> Self {
        Self {
            namespace: namespace.into(),
            digest_ids,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the cache key for a ticket id.
    #[must_use]
    pub fn key(&self, ticket_id: &str) -> String {
        if !self.digest_ids {
            let key = format!("{}:{ticket_id}", self.namespace);
            if is_valid_key(&key) {
                return key;
            }
        }
        format!("{}:{}", self.namespace, hex::encode(Sha512::digest(ticket_id)))
    }
}
