//! In-process cache node.
//!
//! Used for local single-instance deployments and as a test double. Expiry
//! follows `tokio::time`, so paused-clock tests can advance past a TTL
//! without sleeping.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::CacheError;
use crate::node::CacheNode;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

fn expiry(ttl_secs: u64) -> Option<Instant> {
    if ttl_secs == 0 {
        return None;
    }
    Instant::now().checked_add(Duration::from_secs(ttl_secs))
}

/// A cache node backed by a `DashMap`.
#[derive(Debug)]
pub struct MemoryNode {
    address: String,
    entries: DashMap<String, MemoryEntry>,
    reachable: AtomicBool,
    latency_ms: AtomicU64,
    calls: AtomicU64,
}

impl MemoryNode {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            entries: DashMap::new(),
            reachable: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    /// Makes every subsequent call fail with `NodeUnavailable` (or succeed
    /// again).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delays every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of calls received, including failed ones.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `key` holds a live entry. Does not count as a call.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remaining TTL of `key`; `Some(None)` for an entry without expiry.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at.map(|at| at - now))
    }

    /// Overwrites the raw bytes of an existing entry, keeping its TTL.
    /// Returns `false` if the key is absent.
    pub fn corrupt(&self, key: &str, f: impl FnOnce(&mut Vec<u8>)) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                f(&mut entry.value);
                true
            }
            None => false,
        }
    }

    async fn enter(&self) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::node_unavailable(
                &self.address,
                "node marked unreachable",
            ))
        }
    }

    /// Removes the entry if it has expired, returning whether a live entry
    /// remains.
    fn evict_expired(&self, key: &str, now: Instant) -> bool {
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl CacheNode for MemoryNode {
    fn address(&self) -> &str {
        &self.address
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.enter().await?;
        let now = Instant::now();
        if !self.evict_expired(key, now) {
            return Ok(None);
        }
        Ok(self.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), CacheError> {
        self.enter().await?;
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at: expiry(ttl_secs),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.enter().await?;
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn touch(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError> {
        self.enter().await?;
        let now = Instant::now();
        if !self.evict_expired(key, now) {
            return Ok(false);
        }
        Ok(match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = expiry(ttl_secs);
                true
            }
            None => false,
        })
    }
}
