//! # ticketreg-registry
//!
//! A ticket registry backed by a distributed cache cluster, so that a ticket
//! issued on one node of a horizontally scaled authentication service is
//! valid on every other node.
//!
//! ## Layers
//!
//! ```text
//! CacheTicketRegistry
//!     -> TicketCodec (transcoder + optional AES-256-GCM protector)
//!     -> ClusterClient (locator, failure mode, operation timeout)
//!     -> CacheNode (Redis server or in-process map)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use ticketreg_registry::{CacheTicketRegistry, TicketRegistry, config::loader};
//!
//! let config = loader::load_config(None)?;
//! let registry = CacheTicketRegistry::from_config(&config)?;
//! let _cleaner = ticketreg_registry::start_cache_cleaner(&config.cleaner);
//! registry.add_ticket(&ticket).await?;
//! let found = registry.get_ticket(ticket.id()).await?;
//! ```

pub mod cleaner;
pub mod config;
pub mod error;
pub mod key;
pub mod observability;
pub mod registry;

pub use cleaner::{
    CacheRegistryCleaner, CleanerState, RegistryCleaner, SweepGuard, SweepLock, schedule_cleaner,
    spawn_cleaner, start_cache_cleaner,
};
pub use config::{CleanerConfig, LoggingConfig, RegistryConfig};
pub use error::RegistryError;
pub use key::TicketKeyStrategy;
pub use registry::{CacheTicketRegistry, RegistryStats, TicketRegistry, ttl_seconds};
