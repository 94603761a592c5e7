//! Ticket expiration policies.
//!
//! A policy turns the ticket's usage state and the wall clock into a remaining
//! time-to-live. The registry recomputes it on every write or touch, because
//! sliding policies extend the lifetime each time the ticket is used.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use ticketreg_core::{ExpirationPolicy, TicketState};
//! use time::OffsetDateTime;
//!
//! let now = OffsetDateTime::now_utc();
//! let state = TicketState::new(now);
//! let policy = ExpirationPolicy::HardTimeout {
//!     time_to_kill: Duration::from_secs(10),
//! };
//!
//! assert!(!policy.is_expired(&state, now));
//! assert_eq!(policy.time_to_live(&state, now), Some(Duration::from_secs(10)));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ticket::TicketState;

/// Expiration policy attached to every ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationPolicy {
    /// The ticket never expires on its own. Stored without a TTL.
    NeverExpires,

    /// Fixed lifetime measured from creation.
    HardTimeout {
        #[serde(with = "humantime_serde")]
        time_to_kill: Duration,
    },

    /// Sliding idle timeout measured from the last use.
    Timeout {
        #[serde(with = "humantime_serde")]
        time_to_kill: Duration,
    },

    /// Expires after `max_uses` uses or `time_to_live` from creation,
    /// whichever comes first. Typical for service and proxy tickets.
    MultiTimeUseOrTimeout {
        max_uses: u32,
        #[serde(with = "humantime_serde")]
        time_to_live: Duration,
    },

    /// Sliding idle timeout bounded by an absolute maximum lifetime.
    /// Typical for ticket-granting tickets.
    SlidingWithHardLimit {
        #[serde(with = "humantime_serde")]
        max_time_to_live: Duration,
        #[serde(with = "humantime_serde")]
        time_to_kill: Duration,
    },
}

impl ExpirationPolicy {
    /// Returns the instant after which the ticket is expired, or `None` if
    /// the policy has no time bound.
    ///
    /// A bound past the largest representable date counts as no bound.
    #[must_use]
    pub fn deadline(&self, state: &TicketState) -> Option<OffsetDateTime> {
        match self {
            Self::NeverExpires => None,
            Self::HardTimeout { time_to_kill } => offset(state.created_at, *time_to_kill),
            Self::Timeout { time_to_kill } => offset(state.last_used_at, *time_to_kill),
            Self::MultiTimeUseOrTimeout { time_to_live, .. } => {
                offset(state.created_at, *time_to_live)
            }
            Self::SlidingWithHardLimit {
                max_time_to_live,
                time_to_kill,
            } => {
                let hard = offset(state.created_at, *max_time_to_live);
                let idle = offset(state.last_used_at, *time_to_kill);
                match (hard, idle) {
                    (Some(hard), Some(idle)) => Some(hard.min(idle)),
                    (hard, idle) => hard.or(idle),
                }
            }
        }
    }

    /// Returns `true` if a ticket in `state` is expired at `now`.
    #[must_use]
    pub fn is_expired(&self, state: &TicketState, now: OffsetDateTime) -> bool {
        if state.expired || self.uses_exhausted(state) {
            return true;
        }
        self.deadline(state).is_some_and(|deadline| now >= deadline)
    }

    /// Remaining time-to-live at `now`.
    ///
    /// `None` means the ticket does not expire. An expired ticket yields
    /// `Some(Duration::ZERO)`.
    #[must_use]
    pub fn time_to_live(&self, state: &TicketState, now: OffsetDateTime) -> Option<Duration> {
        if state.expired || self.uses_exhausted(state) {
            return Some(Duration::ZERO);
        }
        let deadline = self.deadline(state)?;
        let remaining = deadline - now;
        if remaining.is_positive() {
            Some(remaining.unsigned_abs())
        } else {
            Some(Duration::ZERO)
        }
    }

    /// Returns `true` for policies whose lifetime is extended by use.
    #[must_use]
    pub fn is_sliding(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::SlidingWithHardLimit { .. }
        )
    }

    fn uses_exhausted(&self, state: &TicketState) -> bool {
        match self {
            Self::MultiTimeUseOrTimeout { max_uses, .. } => state.use_count >= *max_uses,
            _ => false,
        }
    }
}

fn offset(at: OffsetDateTime, by: Duration) -> Option<OffsetDateTime> {
    time::Duration::try_from(by)
        .ok()
        .and_then(|by| at.checked_add(by))
}

impl Default for ExpirationPolicy {
    /// Eight hour hard limit with a two hour idle timeout.
    fn default() -> Self {
        Self::SlidingWithHardLimit {
            max_time_to_live: Duration::from_secs(8 * 3600),
            time_to_kill: Duration::from_secs(2 * 3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn state_at(created: OffsetDateTime) -> TicketState {
        TicketState::new(created)
    }

    #[test]
    fn test_never_expires_has_no_ttl() {
        let now = datetime!(2024-01-01 12:00 UTC);
        let state = state_at(now);
        let policy = ExpirationPolicy::NeverExpires;

        assert!(!policy.is_expired(&state, now + Duration::from_secs(365 * 86400)));
        assert_eq!(policy.time_to_live(&state, now), None);
    }

    #[test]
    fn test_hard_timeout_counts_from_creation() {
        let created = datetime!(2024-01-01 12:00 UTC);
        let mut state = state_at(created);
        let policy = ExpirationPolicy::HardTimeout {
            time_to_kill: Duration::from_secs(60),
        };

        // Use does not extend a hard timeout
        state.record_use(created + Duration::from_secs(50));

        let at = created + Duration::from_secs(30);
        assert_eq!(policy.time_to_live(&state, at), Some(Duration::from_secs(30)));
        assert!(policy.is_expired(&state, created + Duration::from_secs(60)));
    }

    #[test]
    fn test_sliding_timeout_extends_on_use() {
        let created = datetime!(2024-01-01 12:00 UTC);
        let mut state = state_at(created);
        let policy = ExpirationPolicy::Timeout {
            time_to_kill: Duration::from_secs(60),
        };
        assert!(policy.is_sliding());

        let later = created + Duration::from_secs(50);
        state.record_use(later);

        let at = created + Duration::from_secs(90);
        assert!(!policy.is_expired(&state, at));
        assert_eq!(policy.time_to_live(&state, at), Some(Duration::from_secs(20)));
    }

    #[test]
    fn test_multi_use_expires_when_budget_spent() {
        let created = datetime!(2024-01-01 12:00 UTC);
        let mut state = state_at(created);
        let policy = ExpirationPolicy::MultiTimeUseOrTimeout {
            max_uses: 1,
            time_to_live: Duration::from_secs(10),
        };

        assert!(!policy.is_expired(&state, created));
        state.record_use(created + Duration::from_secs(1));
        assert!(policy.is_expired(&state, created + Duration::from_secs(1)));
        assert_eq!(
            policy.time_to_live(&state, created + Duration::from_secs(1)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_sliding_with_hard_limit_caps_lifetime() {
        let created = datetime!(2024-01-01 12:00 UTC);
        let mut state = state_at(created);
        let policy = ExpirationPolicy::SlidingWithHardLimit {
            max_time_to_live: Duration::from_secs(100),
            time_to_kill: Duration::from_secs(30),
        };

        // Idle timeout dominates early on
        assert_eq!(
            policy.time_to_live(&state, created),
            Some(Duration::from_secs(30))
        );

        // Near the hard limit, the remaining lifetime is capped
        state.record_use(created + Duration::from_secs(90));
        assert_eq!(
            policy.time_to_live(&state, created + Duration::from_secs(90)),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_explicitly_expired_state() {
        let now = datetime!(2024-01-01 12:00 UTC);
        let mut state = state_at(now);
        state.mark_expired();

        let policy = ExpirationPolicy::NeverExpires;
        assert!(policy.is_expired(&state, now));
        assert_eq!(policy.time_to_live(&state, now), Some(Duration::ZERO));
    }

    #[test]
    fn test_ttl_never_negative() {
        let created = datetime!(2024-01-01 12:00 UTC);
        let state = state_at(created);
        let policy = ExpirationPolicy::HardTimeout {
            time_to_kill: Duration::from_secs(5),
        };
        assert_eq!(
            policy.time_to_live(&state, created + Duration::from_secs(3600)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_unrepresentable_deadline_is_unbounded() {
        let created = datetime!(2024-01-01 12:00 UTC);
        let state = state_at(created);
        let ten_thousand_years = Duration::from_secs(10_000 * 365 * 86_400);

        let policy = ExpirationPolicy::HardTimeout {
            time_to_kill: ten_thousand_years,
        };
        assert_eq!(policy.deadline(&state), None);
        assert_eq!(policy.time_to_live(&state, created), None);
        assert!(!policy.is_expired(&state, created));

        let policy = ExpirationPolicy::Timeout {
            time_to_kill: Duration::MAX,
        };
        assert_eq!(policy.time_to_live(&state, created), None);
    }

    #[test]
    fn test_sliding_limit_keeps_representable_bound() {
        let created = datetime!(2024-01-01 12:00 UTC);
        let state = state_at(created);
        let policy = ExpirationPolicy::SlidingWithHardLimit {
            max_time_to_live: Duration::MAX,
            time_to_kill: Duration::from_secs(30),
        };
        assert_eq!(
            policy.time_to_live(&state, created),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_policy_serde_uses_humantime() {
        let policy = ExpirationPolicy::HardTimeout {
            time_to_kill: Duration::from_secs(7200),
        };
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(json, r#"{"hard_timeout":{"time_to_kill":"2h"}}"#);

        let parsed: ExpirationPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, policy);
    }
}
