//! Key to node placement.
//!
//! Two strategies, both client-side and deterministic:
//!
//! - **Consistent**: ketama continuum with 160 points per node. Adding or
//!   removing a node only moves the keys that hashed to its points.
//! - **ArrayMod**: `hash(key) % node_count`. Cheap, but a membership change
//!   remaps almost every key.
//!
//! Both expose the full fallback order for a key, used by the
//! redistribute failure mode.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ticketreg_core::ConfigError;

use crate::hash::{HashAlgorithm, ketama_point};

/// Points placed on the continuum for every node.
pub const KETAMA_POINTS_PER_NODE: usize = 160;

/// Node placement strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LocatorType {
    /// Ketama consistent hashing.
    Consistent,
    /// Modulo over the node array.
    #[default]
    ArrayMod,
}

impl LocatorType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Consistent => "consistent",
            Self::ArrayMod => "array-mod",
        }
    }
}

impl fmt::Display for LocatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocatorType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "consistent" | "ketama" => Ok(Self::Consistent),
            "array-mod" | "arraymod" => Ok(Self::ArrayMod),
            _ => Err(ConfigError::invalid_value(format!(
                "unknown locator type '{s}' (expected consistent or array-mod)"
            ))),
        }
    }
}

impl TryFrom<String> for LocatorType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LocatorType> for String {
    fn from(value: LocatorType) -> Self {
        value.as_str().to_string()
    }
}

// =============================================================================
// Node Locator
// =============================================================================

/// Maps keys to node indices.
#[derive(Debug, Clone)]
pub struct NodeLocator {
    locator: LocatorType,
    hash: HashAlgorithm,
    node_count: usize,
    continuum: BTreeMap<u32, usize>,
}

impl NodeLocator {
    /// Builds a locator over `nodes`, identified by their addresses.
    ///
    /// The node order matters for `ArrayMod` and must be the same on every
    /// client. The continuum depends only on the addresses.
    #[must_use]
    pub fn new<S: AsRef<str>>(locator: LocatorType, hash: HashAlgorithm, nodes: &[S]) -> Self {
        let continuum = match locator {
            LocatorType::Consistent => build_continuum(hash, nodes),
            LocatorType::ArrayMod => BTreeMap::new(),
        };
        Self {
            locator,
            hash,
            node_count: nodes.len(),
            continuum,
        }
    }

    #[must_use]
    pub fn locator_type(&self) -> LocatorType {
        self.locator
    }

    #[must_use]
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Returns the primary node for `key`, or `None` without nodes.
    #[must_use]
    pub fn primary(&self, key: &str) -> Option<usize> {
        if self.node_count == 0 {
            return None;
        }
        let hash = self.hash.hash(key.as_bytes());
        match self.locator {
            LocatorType::ArrayMod => Some(hash as usize % self.node_count),
            LocatorType::Consistent => self
                .continuum
                .range(hash..)
                .next()
                .or_else(|| self.continuum.iter().next())
                .map(|(_, &node)| node),
        }
    }

    /// Returns every node index in the order they should be tried for `key`.
    ///
    /// The first entry is the primary node; each node appears exactly once.
    #[must_use]
    pub fn sequence(&self, key: &str) -> Vec<usize> {
        if self.node_count == 0 {
            return Vec::new();
        }
        let hash = self.hash.hash(key.as_bytes());
        match self.locator {
            LocatorType::ArrayMod => {
                let start = hash as usize % self.node_count;
                (0..self.node_count)
                    .map(|offset| (start + offset) % self.node_count)
                    .collect()
            }
            LocatorType::Consistent => {
                // Walk the continuum clockwise, keeping the first occurrence
                // of every node.
                let mut seen = vec![false; self.node_count];
                let mut order = Vec::with_capacity(self.node_count);
                let clockwise = self
                    .continuum
                    .range(hash..)
                    .chain(self.continuum.range(..hash));
                for (_, &node) in clockwise {
                    if !seen[node] {
                        seen[node] = true;
                        order.push(node);
                        if order.len() == self.node_count {
                            break;
                        }
                    }
                }
                order
            }
        }
    }
}

fn build_continuum<S: AsRef<str>>(hash: HashAlgorithm, nodes: &[S]) -> BTreeMap<u32, usize> {
    let mut continuum = BTreeMap::new();
    for (index, node) in nodes.iter().enumerate() {
        let node = node.as_ref();
        if hash == HashAlgorithm::Ketama {
            // Four points per MD5 digest
            for repetition in 0..KETAMA_POINTS_PER_NODE / 4 {
                let digest = md5::compute(format!("{node}-{repetition}")).0;
                for n in 0..4 {
                    continuum.insert(ketama_point(&digest, n), index);
                }
            }
        } else {
            for repetition in 0..KETAMA_POINTS_PER_NODE {
                let point = hash.hash(format!("{node}-{repetition}").as_bytes());
                continuum.insert(point, index);
            }
        }
    }
    continuum
}
