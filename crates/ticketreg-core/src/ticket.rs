//! Ticket types.
//!
//! Tickets are a closed set of variants sharing an id, a usage state and an
//! expiration policy. The kind of a ticket is also encoded in its id prefix
//! (`TGT-`, `ST-`, `PGT-`, `PT-`).
//!
//! # Lifecycle
//!
//! 1. A ticket-granting ticket is created after the user authenticates
//! 2. Service tickets are granted from it, one per service access
//! 3. Proxy-granting tickets may be issued to services that proxy further
//! 4. Every use updates the ticket state; sliding policies extend the TTL
//! 5. The cache cluster evicts the entry once its TTL elapses

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::expiration::ExpirationPolicy;

// =============================================================================
// Ticket Kind
// =============================================================================

/// Discriminant of a ticket variant.
///
/// The numeric tag is part of the serialized payload header and must never be
/// reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    /// Ticket-granting ticket (the SSO session).
    TicketGranting,
    /// Service ticket granted for one service access.
    Service,
    /// Proxy-granting ticket issued to a proxying service.
    ProxyGranting,
    /// Proxy ticket granted from a proxy-granting ticket.
    Proxy,
}

impl TicketKind {
    /// All ticket kinds.
    pub const ALL: [TicketKind; 4] = [
        Self::TicketGranting,
        Self::Service,
        Self::ProxyGranting,
        Self::Proxy,
    ];

    /// Returns the payload tag for this kind.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::TicketGranting => 1,
            Self::Service => 2,
            Self::ProxyGranting => 3,
            Self::Proxy => 4,
        }
    }

    /// Resolves a payload tag.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::TicketGranting),
            2 => Some(Self::Service),
            3 => Some(Self::ProxyGranting),
            4 => Some(Self::Proxy),
            _ => None,
        }
    }

    /// Returns the id prefix for this kind.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::TicketGranting => "TGT",
            Self::Service => "ST",
            Self::ProxyGranting => "PGT",
            Self::Proxy => "PT",
        }
    }

    /// Infers the kind from a ticket id prefix.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        let prefix = id.split('-').next()?;
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }

    /// Returns `true` for kinds that own descendant tickets.
    #[must_use]
    pub const fn is_granting(self) -> bool {
        matches!(self, Self::TicketGranting | Self::ProxyGranting)
    }

    /// Returns the kind name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TicketGranting => "ticket_granting",
            Self::Service => "service",
            Self::ProxyGranting => "proxy_granting",
            Self::Proxy => "proxy",
        }
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Ticket State
// =============================================================================

/// Usage state shared by all ticket variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketState {
    /// When the ticket was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the ticket was last used (equals `created_at` until first use).
    #[serde(with = "time::serde::rfc3339")]
    pub last_used_at: OffsetDateTime,

    /// When the ticket was used before the last use.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub previous_used_at: Option<OffsetDateTime>,

    /// Number of times the ticket has been used.
    pub use_count: u32,

    /// Set when the ticket was explicitly expired (e.g. logout).
    #[serde(default)]
    pub expired: bool,
}

impl TicketState {
    /// Creates the state of a freshly issued ticket.
    #[must_use]
    pub fn new(created_at: OffsetDateTime) -> Self {
        Self {
            created_at,
            last_used_at: created_at,
            previous_used_at: None,
            use_count: 0,
            expired: false,
        }
    }

    /// Records a use of the ticket at `now`.
    pub fn record_use(&mut self, now: OffsetDateTime) {
        self.previous_used_at = Some(self.last_used_at);
        self.last_used_at = now;
        self.use_count = self.use_count.saturating_add(1);
    }

    /// Marks the ticket as explicitly expired.
    pub fn mark_expired(&mut self) {
        self.expired = true;
    }
}

// =============================================================================
// Ticket Variants
// =============================================================================

/// Result of a primary authentication, carried by granting tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    /// Authenticated principal identifier.
    pub principal: String,

    /// Principal attributes (multi-valued).
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,

    /// When the authentication happened.
    #[serde(with = "time::serde::rfc3339")]
    pub authenticated_at: OffsetDateTime,
}

impl Authentication {
    /// Creates an authentication for `principal` without attributes.
    #[must_use]
    pub fn new(principal: impl Into<String>, authenticated_at: OffsetDateTime) -> Self {
        Self {
            principal: principal.into(),
            attributes: BTreeMap::new(),
            authenticated_at,
        }
    }

    /// Adds an attribute value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }
}

/// Ticket-granting ticket: the single sign-on session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketGrantingTicket {
    pub id: String,
    pub state: TicketState,
    pub expiration_policy: ExpirationPolicy,
    pub authentication: Authentication,

    /// Service tickets granted from this ticket (ticket id -> service).
    #[serde(default)]
    pub services: BTreeMap<String, String>,

    /// Proxy-granting tickets descending from this ticket.
    #[serde(default)]
    pub proxy_granting_tickets: BTreeSet<String>,
}

impl TicketGrantingTicket {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        authentication: Authentication,
        expiration_policy: ExpirationPolicy,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            state: TicketState::new(now),
            expiration_policy,
            authentication,
            services: BTreeMap::new(),
            proxy_granting_tickets: BTreeSet::new(),
        }
    }

    /// Grants a service ticket, recording it as a descendant and counting a
    /// use of this ticket.
    pub fn grant_service_ticket(
        &mut self,
        id: impl Into<String>,
        service: impl Into<String>,
        expiration_policy: ExpirationPolicy,
        now: OffsetDateTime,
    ) -> ServiceTicket {
        let id = id.into();
        let service = service.into();
        let from_new_login = self.state.use_count == 0;

        self.state.record_use(now);
        self.services.insert(id.clone(), service.clone());

        ServiceTicket {
            id,
            state: TicketState::new(now),
            expiration_policy,
            granting_ticket_id: self.id.clone(),
            service,
            from_new_login,
        }
    }
}

/// Service ticket granted for a single service access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTicket {
    pub id: String,
    pub state: TicketState,
    pub expiration_policy: ExpirationPolicy,

    /// Id of the ticket-granting ticket this ticket was granted from.
    pub granting_ticket_id: String,

    /// Service the ticket was issued for.
    pub service: String,

    /// Whether the ticket was issued right after a fresh login.
    #[serde(default)]
    pub from_new_login: bool,
}

/// Proxy-granting ticket issued to a service that proxies authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyGrantingTicket {
    pub id: String,
    pub state: TicketState,
    pub expiration_policy: ExpirationPolicy,

    /// Id of the parent granting ticket.
    pub granting_ticket_id: String,

    /// Service (callback) the ticket was issued to.
    pub proxied_by: String,

    pub authentication: Authentication,

    /// Proxy tickets granted from this ticket (ticket id -> service).
    #[serde(default)]
    pub services: BTreeMap<String, String>,
}

impl ProxyGrantingTicket {
    /// Grants a proxy ticket, recording it as a descendant.
    pub fn grant_proxy_ticket(
        &mut self,
        id: impl Into<String>,
        service: impl Into<String>,
        expiration_policy: ExpirationPolicy,
        now: OffsetDateTime,
    ) -> ProxyTicket {
        let id = id.into();
        let service = service.into();

        self.state.record_use(now);
        self.services.insert(id.clone(), service.clone());

        ProxyTicket {
            id,
            state: TicketState::new(now),
            expiration_policy,
            granting_ticket_id: self.id.clone(),
            service,
        }
    }
}

/// Proxy ticket granted from a proxy-granting ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTicket {
    pub id: String,
    pub state: TicketState,
    pub expiration_policy: ExpirationPolicy,

    /// Id of the proxy-granting ticket this ticket was granted from.
    pub granting_ticket_id: String,

    /// Service the ticket was issued for.
    pub service: String,
}

// =============================================================================
// Ticket
// =============================================================================

/// A ticket of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Ticket {
    TicketGranting(TicketGrantingTicket),
    Service(ServiceTicket),
    ProxyGranting(ProxyGrantingTicket),
    Proxy(ProxyTicket),
}

impl Ticket {
    /// Returns the ticket id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::TicketGranting(t) => &t.id,
            Self::Service(t) => &t.id,
            Self::ProxyGranting(t) => &t.id,
            Self::Proxy(t) => &t.id,
        }
    }

    /// Returns the ticket kind.
    #[must_use]
    pub fn kind(&self) -> TicketKind {
        match self {
            Self::TicketGranting(_) => TicketKind::TicketGranting,
            Self::Service(_) => TicketKind::Service,
            Self::ProxyGranting(_) => TicketKind::ProxyGranting,
            Self::Proxy(_) => TicketKind::Proxy,
        }
    }

    #[must_use]
    pub fn state(&self) -> &TicketState {
        match self {
            Self::TicketGranting(t) => &t.state,
            Self::Service(t) => &t.state,
            Self::ProxyGranting(t) => &t.state,
            Self::Proxy(t) => &t.state,
        }
    }

    pub fn state_mut(&mut self) -> &mut TicketState {
        match self {
            Self::TicketGranting(t) => &mut t.state,
            Self::Service(t) => &mut t.state,
            Self::ProxyGranting(t) => &mut t.state,
            Self::Proxy(t) => &mut t.state,
        }
    }

    #[must_use]
    pub fn expiration_policy(&self) -> &ExpirationPolicy {
        match self {
            Self::TicketGranting(t) => &t.expiration_policy,
            Self::Service(t) => &t.expiration_policy,
            Self::ProxyGranting(t) => &t.expiration_policy,
            Self::Proxy(t) => &t.expiration_policy,
        }
    }

    pub fn set_expiration_policy(&mut self, policy: ExpirationPolicy) {
        match self {
            Self::TicketGranting(t) => t.expiration_policy = policy,
            Self::Service(t) => t.expiration_policy = policy,
            Self::ProxyGranting(t) => t.expiration_policy = policy,
            Self::Proxy(t) => t.expiration_policy = policy,
        }
    }

    /// Records a use of the ticket at `now`.
    pub fn record_use(&mut self, now: OffsetDateTime) {
        self.state_mut().record_use(now);
    }

    /// Marks the ticket as explicitly expired.
    pub fn mark_expired(&mut self) {
        self.state_mut().mark_expired();
    }

    /// Returns `true` if the ticket is expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expiration_policy().is_expired(self.state(), now)
    }

    /// Remaining time-to-live at `now`; `None` means no expiry.
    #[must_use]
    pub fn time_to_live(&self, now: OffsetDateTime) -> Option<Duration> {
        self.expiration_policy().time_to_live(self.state(), now)
    }

    /// Ids of the tickets granted directly from this ticket.
    #[must_use]
    pub fn descendant_ids(&self) -> Vec<String> {
        match self {
            Self::TicketGranting(t) => t
                .services
                .keys()
                .chain(t.proxy_granting_tickets.iter())
                .cloned()
                .collect(),
            Self::ProxyGranting(t) => t.services.keys().cloned().collect(),
            Self::Service(_) | Self::Proxy(_) => Vec::new(),
        }
    }
}

impl From<TicketGrantingTicket> for Ticket {
    fn from(t: TicketGrantingTicket) -> Self {
        Self::TicketGranting(t)
    }
}

impl From<ServiceTicket> for Ticket {
    fn from(t: ServiceTicket) -> Self {
        Self::Service(t)
    }
}

impl From<ProxyGrantingTicket> for Ticket {
    fn from(t: ProxyGrantingTicket) -> Self {
        Self::ProxyGranting(t)
    }
}

impl From<ProxyTicket> for Ticket {
    fn from(t: ProxyTicket) -> Self {
        Self::Proxy(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn tgt(now: OffsetDateTime) -> TicketGrantingTicket {
        TicketGrantingTicket::new(
            "TGT-1-abc-node1",
            Authentication::new("casuser", now).with_attribute("memberOf", "staff"),
            ExpirationPolicy::default(),
            now,
        )
    }

    #[test]
    fn test_kind_tags_roundtrip() {
        for kind in TicketKind::ALL {
            assert_eq!(TicketKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(TicketKind::from_tag(0), None);
        assert_eq!(TicketKind::from_tag(99), None);
    }

    #[test]
    fn test_kind_from_id() {
        assert_eq!(
            TicketKind::from_id("TGT-1-abc-node1"),
            Some(TicketKind::TicketGranting)
        );
        assert_eq!(TicketKind::from_id("ST-2-xyz"), Some(TicketKind::Service));
        assert_eq!(
            TicketKind::from_id("PGT-3-xyz"),
            Some(TicketKind::ProxyGranting)
        );
        assert_eq!(TicketKind::from_id("PT-4-xyz"), Some(TicketKind::Proxy));
        assert_eq!(TicketKind::from_id("LT-1-xyz"), None);
    }

    #[test]
    fn test_grant_service_ticket_records_descendant() {
        let now = datetime!(2024-01-01 12:00 UTC);
        let mut granting = tgt(now);

        let st = granting.grant_service_ticket(
            "ST-1-a",
            "https://app.example.com",
            ExpirationPolicy::MultiTimeUseOrTimeout {
                max_uses: 1,
                time_to_live: Duration::from_secs(10),
            },
            now,
        );

        assert!(st.from_new_login);
        assert_eq!(st.granting_ticket_id, granting.id);
        assert_eq!(granting.state.use_count, 1);
        assert_eq!(
            granting.services.get("ST-1-a").map(String::as_str),
            Some("https://app.example.com")
        );

        let second = granting.grant_service_ticket(
            "ST-2-b",
            "https://other.example.com",
            ExpirationPolicy::default(),
            now,
        );
        assert!(!second.from_new_login);
    }

    #[test]
    fn test_descendant_ids() {
        let now = datetime!(2024-01-01 12:00 UTC);
        let mut granting = tgt(now);
        granting.grant_service_ticket("ST-1-a", "svc", ExpirationPolicy::default(), now);
        granting
            .proxy_granting_tickets
            .insert("PGT-1-p".to_string());

        let ticket = Ticket::from(granting);
        let mut ids = ticket.descendant_ids();
        ids.sort();
        assert_eq!(ids, vec!["PGT-1-p".to_string(), "ST-1-a".to_string()]);
    }

    #[test]
    fn test_ticket_accessors() {
        let now = datetime!(2024-01-01 12:00 UTC);
        let mut ticket = Ticket::from(tgt(now));

        assert_eq!(ticket.id(), "TGT-1-abc-node1");
        assert_eq!(ticket.kind(), TicketKind::TicketGranting);
        assert!(!ticket.is_expired(now));

        ticket.record_use(now + Duration::from_secs(5));
        assert_eq!(ticket.state().use_count, 1);
        assert_eq!(ticket.state().previous_used_at, Some(now));

        ticket.mark_expired();
        assert!(ticket.is_expired(now));
    }

    #[test]
    fn test_ticket_json_is_tagged() {
        let now = datetime!(2024-01-01 12:00 UTC);
        let ticket = Ticket::Service(ServiceTicket {
            id: "ST-1-a".into(),
            state: TicketState::new(now),
            expiration_policy: ExpirationPolicy::NeverExpires,
            granting_ticket_id: "TGT-1-a".into(),
            service: "svc".into(),
            from_new_login: true,
        });

        let json = serde_json::to_value(&ticket).unwrap();
        assert_eq!(json["kind"], "service");
        assert_eq!(json["service"], "svc");

        let parsed: Ticket = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, ticket);
    }
}
