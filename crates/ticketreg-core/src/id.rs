//! Ticket id generation and redaction.
//!
//! Ids have the form `PREFIX-counter-random-suffix`:
//!
//! - `PREFIX` identifies the ticket kind (`TGT`, `ST`, `PGT`, `PT`)
//! - `counter` is a per-generator sequence number
//! - `random` is 256 bits of OS randomness, base64url without padding
//! - `suffix` identifies the issuing node
//!
//! Ticket ids are bearer credentials. Never log them in full; use
//! [`redact_id`].

use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

use crate::ticket::TicketKind;

/// Number of random bytes in a generated id.
const RANDOM_BYTES: usize = 32;

/// Generates unique ticket ids.
#[derive(Debug)]
pub struct TicketIdGenerator {
    suffix: String,
    counter: AtomicU64,
}

impl TicketIdGenerator {
    /// Creates a generator whose ids end with `suffix` (usually the node name).
    #[must_use]
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            counter: AtomicU64::new(1),
        }
    }

    /// Generates a new id for a ticket of `kind`.
    #[must_use]
    pub fn generate(&self, kind: TicketKind) -> String {
        let mut bytes = [0u8; RANDOM_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);

        if self.suffix.is_empty() {
            format!(
                "{}-{}-{}",
                kind.prefix(),
                sequence,
                URL_SAFE_NO_PAD.encode(bytes)
            )
        } else {
            format!(
                "{}-{}-{}-{}",
                kind.prefix(),
                sequence,
                URL_SAFE_NO_PAD.encode(bytes),
                self.suffix
            )
        }
    }
}

impl Default for TicketIdGenerator {
    fn default() -> Self {
        Self::new("")
    }
}

/// Redacts a ticket id for logging, keeping only the prefix and counter.
///
/// ```
/// use ticketreg_core::redact_id;
///
/// assert_eq!(redact_id("TGT-12-secretpart-node1"), "TGT-12-***");
/// assert_eq!(redact_id("opaque"), "***");
/// ```
#[must_use]
pub fn redact_id(id: &str) -> String {
    let mut parts = id.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(prefix), Some(counter), Some(_)) => format!("{prefix}-{counter}-***"),
        _ => "***".to_string(),
    }
}
