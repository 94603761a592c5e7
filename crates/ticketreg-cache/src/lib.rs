//! # ticketreg-cache
//!
//! Client-side adapter over a cluster of independent cache servers.
//!
//! The cache protocol itself is handled by `redis` and `deadpool-redis`.
//! This crate adds what a memcached-style client does on top of it:
//!
//! - [`NodeLocator`] - ketama consistent hashing or array-mod placement
//! - [`HashAlgorithm`] - CRC, FNV-1/FNV-1a (32 and 64 bit) and ketama key hashes
//! - [`FailureMode`] - cancel, redistribute or retry when a node fails
//! - [`ClusterClient`] - the [`CacheClient`] used by the registry, with a
//!   per-node operation timeout
//!
//! ## Example
//!
//! ```ignore
//! use ticketreg_cache::{CacheClient, CacheClusterConfig, ClusterClient};
//!
//! let client = ClusterClient::from_config(&CacheClusterConfig::default())?;
//! client.put("cas:TGT-1-abc", b"payload", 7200).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod failure;
pub mod hash;
pub mod locator;
pub mod memory;
pub mod node;
pub mod redis_node;

pub use client::{CacheClient, ClusterClient, MAX_KEY_LEN, is_valid_key};
pub use config::{CacheClusterConfig, NodeBackend};
pub use error::CacheError;
pub use failure::FailureMode;
pub use hash::HashAlgorithm;
pub use locator::{KETAMA_POINTS_PER_NODE, LocatorType, NodeLocator};
pub use memory::MemoryNode;
pub use node::CacheNode;
pub use redis_node::RedisNode;
