//! Ticket registry backed by the cache cluster.
//!
//! Write path: ticket -> transcoder -> protector -> cache (with TTL).
//! Read path: cache -> protector -> transcoder -> id check -> ticket.
//!
//! The cluster enforces expiry through the TTL computed from the ticket's
//! expiration policy. Reads do not re-check expiry: a touch only replaces the
//! TTL, so the usage state inside a stored payload may lag behind the TTL.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use ticketreg_cache::{CacheClient, ClusterClient};
use ticketreg_codec::{TicketCodec, TicketTranscoder, build_protector};
use ticketreg_core::{Ticket, redact_id};
use time::OffsetDateTime;

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::key::TicketKeyStrategy;

// =============================================================================
// Registry Trait
// =============================================================================

/// Storage for issued tickets, keyed by ticket id.
#[async_trait]
pub trait TicketRegistry: Send + Sync {
    /// Stores a ticket with a TTL derived from its expiration policy.
    async fn add_ticket(&self, ticket: &Ticket) -> Result<(), RegistryError>;

    /// Fetches a ticket. Missing, expired and unreadable entries are `None`.
    async fn get_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>, RegistryError>;

    /// Rewrites a ticket after a state change (use count, granted services).
    async fn update_ticket(&self, ticket: &Ticket) -> Result<(), RegistryError>;

    /// Recomputes the TTL and applies it without rewriting the payload.
    /// Returns `false` if the entry no longer exists.
    async fn update_ticket_expiration(&self, ticket: &Ticket) -> Result<bool, RegistryError>;

    /// Removes a ticket. Returns `false` if it did not exist.
    async fn delete_ticket(&self, ticket_id: &str) -> Result<bool, RegistryError>;

    /// Removes a ticket and every ticket granted from it, recursively.
    /// Returns the number of entries removed.
    async fn delete_ticket_tree(&self, ticket_id: &str) -> Result<usize, RegistryError>;
}

// =============================================================================
// Statistics
// =============================================================================

/// Snapshot of registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries that failed authentication, decoding or the id check.
    pub corrupt: u64,
    pub writes: u64,
    pub deletes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    corrupt: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl Counters {
    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RegistryStats {
        RegistryStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// TTL
// =============================================================================

/// Store-side TTL in seconds for a remaining lifetime.
///
/// `None` (never expires) maps to 0. Anything else is rounded up to whole
/// seconds with a floor of 1, so an already expired ticket still gets a
/// short TTL instead of none.
#[must_use]
pub fn ttl_seconds(remaining: Option<Duration>) -> u64 {
    match remaining {
        None => 0,
        Some(d) => {
            let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
            secs.max(1)
        }
    }
}

// =============================================================================
// Cache Ticket Registry
// =============================================================================

/// [`TicketRegistry`] over a [`CacheClient`].
pub struct CacheTicketRegistry {
    client: Arc<dyn CacheClient>,
    codec: TicketCodec,
    keys: TicketKeyStrategy,
    counters: Counters,
}

impl std::fmt::Debug for CacheTicketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTicketRegistry")
            .field("codec", &self.codec)
            .field("keys", &self.keys)
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl CacheTicketRegistry {
    /// Creates a registry from its parts.
    ///
    /// Ticket ids are digested in cache keys whenever the codec encrypts.
    #[must_use]
    pub fn new(client: Arc<dyn CacheClient>, codec: TicketCodec, namespace: &str) -> Self {
        let keys = TicketKeyStrategy::new(namespace, codec.is_protected());
        Self {
            client,
            codec,
            keys,
            counters: Counters::default(),
        }
    }

    /// Builds the cluster client, the codec and the registry from
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Configuration` if the configuration is
    /// invalid, including missing key material while encryption is enabled.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let client = ClusterClient::from_config(&config.cache)?;
        Self::with_client(config, Arc::new(client))
    }

    /// Builds the codec from configuration and uses `client` for storage.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Configuration` if any section is invalid,
    /// including the namespace and the cipher settings.
    pub fn with_client(
        config: &RegistryConfig,
        client: Arc<dyn CacheClient>,
    ) -> Result<Self, RegistryError> {
        config.validate()?;
        let protector = build_protector(&config.crypto)?;
        let transcoder = TicketTranscoder::with_compression_threshold(config.compression());
        let codec = TicketCodec::new(transcoder, protector);

        tracing::info!(
            namespace = %config.namespace,
            encrypted = codec.is_protected(),
            compression_threshold = ?config.compression(),
            "Ticket registry initialized"
        );

        Ok(Self::new(client, codec, &config.namespace))
    }

    /// Cache key used for `ticket_id`.
    #[must_use]
    pub fn cache_key(&self, ticket_id: &str) -> String {
        self.keys.key(ticket_id)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.counters.snapshot()
    }

    async fn write(&self, ticket: &Ticket) -> Result<(), RegistryError> {
        let id = ticket.id();
        if id.is_empty() {
            return Err(RegistryError::invalid_ticket("ticket id is empty"));
        }

        let ttl = ttl_seconds(ticket.time_to_live(OffsetDateTime::now_utc()));
        let payload = self.codec.encode(ticket)?;
        let key = self.keys.key(id);

        self.client.put(&key, &payload, ttl).await?;
        Counters::incr(&self.counters.writes);
        tracing::debug!(
            ticket = %redact_id(id),
            kind = %ticket.kind(),
            ttl_secs = ttl,
            bytes = payload.len(),
            "ticket stored"
        );
        Ok(())
    }

    fn corrupt(&self, ticket_id: &str, kind: &str, error: &dyn std::fmt::Display) {
        Counters::incr(&self.counters.corrupt);
        tracing::warn!(
            ticket = %redact_id(ticket_id),
            error_kind = kind,
            error = %error,
            "StorageCorruption: stored ticket payload is unreadable, treating as missing"
        );
    }
}

#[async_trait]
impl TicketRegistry for CacheTicketRegistry {
    async fn add_ticket(&self, ticket: &Ticket) -> Result<(), RegistryError> {
        self.write(ticket).await
    }

    async fn get_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>, RegistryError> {
        let key = self.keys.key(ticket_id);
        let Some(payload) = self.client.get(&key).await? else {
            Counters::incr(&self.counters.misses);
            tracing::debug!(ticket = %redact_id(ticket_id), "ticket not found");
            return Ok(None);
        };

        let ticket = match self.codec.decode(&payload) {
            Ok(ticket) => ticket,
            Err(e) => {
                self.corrupt(ticket_id, e.kind(), &e);
                return Ok(None);
            }
        };

        if ticket.id() != ticket_id {
            self.corrupt(
                ticket_id,
                "id_mismatch",
                &format!("entry holds {}", redact_id(ticket.id())),
            );
            return Ok(None);
        }

        Counters::incr(&self.counters.hits);
        tracing::debug!(ticket = %redact_id(ticket_id), kind = %ticket.kind(), "ticket found");
        Ok(Some(ticket))
    }

    async fn update_ticket(&self, ticket: &Ticket) -> Result<(), RegistryError> {
        self.write(ticket).await
    }

    async fn update_ticket_expiration(&self, ticket: &Ticket) -> Result<bool, RegistryError> {
        let ttl = ttl_seconds(ticket.time_to_live(OffsetDateTime::now_utc()));
        let key = self.keys.key(ticket.id());
        let touched = self.client.touch(&key, ttl).await?;
        tracing::debug!(
            ticket = %redact_id(ticket.id()),
            ttl_secs = ttl,
            touched,
            "ticket expiration updated"
        );
        Ok(touched)
    }

    async fn delete_ticket(&self, ticket_id: &str) -> Result<bool, RegistryError> {
        let key = self.keys.key(ticket_id);
        let deleted = self.client.delete(&key).await?;
        if deleted {
            Counters::incr(&self.counters.deletes);
        }
        tracing::debug!(ticket = %redact_id(ticket_id), deleted, "ticket deleted");
        Ok(deleted)
    }

    async fn delete_ticket_tree(&self, ticket_id: &str) -> Result<usize, RegistryError> {
        // Depth-first over granted tickets; the root goes last so a partial
        // failure leaves it in place for a retry.
        let mut removed = 0;
        let mut visited = HashSet::new();
        let mut pending = vec![(ticket_id.to_string(), false)];
        while let Some((id, expanded)) = pending.pop() {
            if expanded {
                if self.delete_ticket(&id).await? {
                    removed += 1;
                }
                continue;
            }

            if !visited.insert(id.clone()) {
                continue;
            }
            pending.push((id.clone(), true));
            if let Some(ticket) = self.get_ticket(&id).await? {
                pending.extend(ticket.descendant_ids().into_iter().map(|child| (child, false)));
            }
        }

        tracing::debug!(ticket = %redact_id(ticket_id), removed, "ticket tree deleted");
        Ok(removed)
    }
}
