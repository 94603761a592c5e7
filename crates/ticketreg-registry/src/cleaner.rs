//! Registry cleaner.
//!
//! Backends without a key enumeration primitive cannot sweep expired
//! tickets; the cache cluster expires them on its own through the TTL set on
//! every write. [`CacheRegistryCleaner`] therefore reports itself as
//! unsupported and never touches the cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::config::CleanerConfig;

/// Cleaner lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanerState {
    Idle,
    Sweeping,
}

/// Guards the `Idle -> Sweeping -> Idle` transition.
#[derive(Debug, Default)]
pub struct SweepLock {
    sweeping: AtomicBool,
}

impl SweepLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> CleanerState {
        if self.sweeping.load(Ordering::Acquire) {
            CleanerState::Sweeping
        } else {
            CleanerState::Idle
        }
    }

    /// Enters `Sweeping`, or returns `None` if a sweep is already running.
    /// The returned guard moves back to `Idle` when dropped.
    #[must_use]
    pub fn try_begin(&self) -> Option<SweepGuard<'_>> {
        self.sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepGuard { lock: self })
    }
}

/// Held for the duration of a sweep.
#[derive(Debug)]
pub struct SweepGuard<'a> {
    lock: &'a SweepLock,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.lock.sweeping.store(false, Ordering::Release);
    }
}

/// Removes expired tickets from a registry.
#[async_trait]
pub trait RegistryCleaner: Send + Sync {
    /// Whether periodic cleaning does anything for this backend.
    fn is_cleaner_supported(&self) -> bool;

    /// Runs one sweep and returns the number of tickets removed.
    /// A call while a sweep is in progress is skipped and returns 0.
    async fn clean(&self) -> usize;
}

/// Cleaner for [`CacheTicketRegistry`](crate::CacheTicketRegistry).
/// A no-op by construction, so it holds no registry handle.
#[derive(Debug, Default)]
pub struct CacheRegistryCleaner {
    lock: SweepLock,
}

impl CacheRegistryCleaner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> CleanerState {
        self.lock.state()
    }
}

#[async_trait]
impl RegistryCleaner for CacheRegistryCleaner {
    fn is_cleaner_supported(&self) -> bool {
        false
    }

    async fn clean(&self) -> usize {
        let Some(_guard) = self.lock.try_begin() else {
            tracing::debug!("ticket registry sweep already running, skipping");
            return 0;
        };
        tracing::trace!("cache cluster expires tickets by TTL, nothing to sweep");
        0
    }
}

/// Starts a periodic sweep when `cleaner` supports it.
///
/// Returns `None`, and spawns nothing, for unsupported cleaners. The sweep
/// runs on its own task and never blocks registry operations.
pub fn spawn_cleaner(
    cleaner: Arc<dyn RegistryCleaner>,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if !cleaner.is_cleaner_supported() {
        tracing::info!("Ticket registry cleaner not supported by backend, not scheduling");
        return None;
    }

    tracing::info!(interval = ?interval, "Scheduling ticket registry cleaner");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = cleaner.clean().await;
            if removed > 0 {
                tracing::debug!(removed, "Ticket registry cleanup completed");
            }
        }
    }))
}

/// Schedules `cleaner` according to the `[cleaner]` configuration section.
///
/// Nothing is spawned when the section is disabled or the backend does not
/// support sweeping.
pub fn schedule_cleaner(
    config: &CleanerConfig,
    cleaner: Arc<dyn RegistryCleaner>,
) -> Option<JoinHandle<()>> {
    if !config.enabled {
        tracing::info!("Ticket registry cleaner disabled by configuration");
        return None;
    }
    spawn_cleaner(cleaner, config.interval)
}

/// Builds the cleaner for the cache-backed registry and schedules it.
///
/// Always `None` in practice: the cluster expires entries by TTL.
pub fn start_cache_cleaner(config: &CleanerConfig) -> Option<JoinHandle<()>> {
    schedule_cleaner(config, Arc::new(CacheRegistryCleaner::new()))
}
