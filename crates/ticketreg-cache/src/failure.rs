//! Policy applied when a cache node fails.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ticketreg_core::ConfigError;

/// What the cluster client does when the node owning a key fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FailureMode {
    /// Surface the first node error.
    Cancel,
    /// Try the next node in the locator's fallback order.
    ///
    /// Writes and deletes land on whichever node answers. A delete issued
    /// while the primary is down reaches a fallback node only, so the entry
    /// on the primary (a logged-out granting ticket, say) is readable again
    /// once that node recovers and until its TTL runs out.
    #[default]
    Redistribute,
    /// Retry the primary node up to `max_retries` more times.
    Retry,
}

impl FailureMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::Redistribute => "redistribute",
            Self::Retry => "retry",
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cancel" => Ok(Self::Cancel),
            "redistribute" => Ok(Self::Redistribute),
            "retry" => Ok(Self::Retry),
            _ => Err(ConfigError::invalid_value(format!(
                "unknown failure mode '{s}' (expected cancel, redistribute or retry)"
            ))),
        }
    }
}

impl TryFrom<String> for FailureMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FailureMode> for String {
    fn from(value: FailureMode) -> Self {
        value.as_str().to_string()
    }
}
