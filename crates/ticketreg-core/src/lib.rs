//! # ticketreg-core
//!
//! Core types for the cache-backed ticket registry.
//!
//! This crate provides:
//! - The [`Ticket`] model (granting, service, proxy-granting and proxy tickets)
//! - [`ExpirationPolicy`] and the time-to-live computation used for store-side expiry
//! - Ticket id generation and redaction for logs
//! - The [`ConfigError`] shared by every configuration section
//!
//! It performs no I/O.

pub mod error;
pub mod expiration;
pub mod id;
pub mod ticket;

pub use error::ConfigError;
pub use expiration::ExpirationPolicy;
pub use id::{TicketIdGenerator, redact_id};
pub use ticket::{
    Authentication, ProxyGrantingTicket, ProxyTicket, ServiceTicket, Ticket,
    TicketGrantingTicket, TicketKind, TicketState,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use ticketreg_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::ConfigError;
    pub use crate::expiration::ExpirationPolicy;
    pub use crate::id::{TicketIdGenerator, redact_id};
    pub use crate::ticket::{
        Authentication, ProxyGrantingTicket, ProxyTicket, ServiceTicket, Ticket,
        TicketGrantingTicket, TicketKind, TicketState,
    };
}
