//! Property tests for the payload pipeline.
//!
//! Any ticket that goes through encode and decode must come back equal,
//! whatever the compression threshold and whether protection is enabled.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use ticketreg_codec::{
    AuthenticatedEncryptionProtector, CodecError, KeyMaterial, NoOpProtector, PayloadProtector,
    TicketCodec, TicketTranscoder,
};
use ticketreg_core::{
    Authentication, ExpirationPolicy, ProxyGrantingTicket, Ticket, TicketGrantingTicket,
};
use time::OffsetDateTime;
use time::macros::datetime;

const EPOCH: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

fn policy_strategy() -> impl Strategy<Value = ExpirationPolicy> {
    prop_oneof![
        Just(ExpirationPolicy::NeverExpires),
        (1u64..86_400).prop_map(|s| ExpirationPolicy::HardTimeout {
            time_to_kill: Duration::from_secs(s)
        }),
        (1u64..86_400).prop_map(|s| ExpirationPolicy::Timeout {
            time_to_kill: Duration::from_secs(s)
        }),
        (1u32..10, 1u64..600).prop_map(|(uses, s)| ExpirationPolicy::MultiTimeUseOrTimeout {
            max_uses: uses,
            time_to_live: Duration::from_secs(s)
        }),
        (1u64..86_400, 1u64..7_200).prop_map(|(max, idle)| {
            ExpirationPolicy::SlidingWithHardLimit {
                max_time_to_live: Duration::from_secs(max),
                time_to_kill: Duration::from_secs(idle),
            }
        }),
    ]
}

fn authentication_strategy() -> impl Strategy<Value = Authentication> {
    (
        "[a-z]{1,12}",
        prop::collection::btree_map("[a-z]{1,8}", prop::collection::vec(".{0,24}", 1..3), 0..6),
        0i64..1_000_000,
    )
        .prop_map(|(principal, attributes, offset)| {
            let mut auth =
                Authentication::new(principal, EPOCH + time::Duration::seconds(offset));
            auth.attributes = attributes;
            auth
        })
}

/// A granting ticket with its descendants, flattened into a list.
fn ticket_family_strategy() -> impl Strategy<Value = Vec<Ticket>> {
    (
        authentication_strategy(),
        policy_strategy(),
        policy_strategy(),
        prop::collection::vec("https://[a-z]{1,10}\\.example\\.org/[a-z]{0,8}", 0..20),
        any::<bool>(),
    )
        .prop_map(|(auth, tgt_policy, st_policy, services, with_proxy)| {
            let mut tgt = TicketGrantingTicket::new(
                "TGT-1-abcdefghijklmnopqrstuvwxyz-node1",
                auth.clone(),
                tgt_policy.clone(),
                EPOCH,
            );

            let mut tickets = Vec::new();
            for (n, service) in services.iter().enumerate() {
                let at = EPOCH + time::Duration::seconds(n as i64);
                let st = tgt.grant_service_ticket(
                    format!("ST-{}-random-node1", n + 2),
                    service.clone(),
                    st_policy.clone(),
                    at,
                );
                tickets.push(Ticket::from(st));
            }

            if with_proxy {
                let mut pgt = ProxyGrantingTicket {
                    id: "PGT-99-random-node1".to_string(),
                    state: ticketreg_core::TicketState::new(EPOCH),
                    expiration_policy: tgt_policy,
                    granting_ticket_id: tgt.id.clone(),
                    proxied_by: "https://proxy.example.org/cb".to_string(),
                    authentication: auth,
                    services: Default::default(),
                };
                tgt.proxy_granting_tickets.insert(pgt.id.clone());
                let pt = pgt.grant_proxy_ticket(
                    "PT-100-random-node1",
                    "https://backend.example.org",
                    st_policy,
                    EPOCH,
                );
                tickets.push(Ticket::from(pgt));
                tickets.push(Ticket::from(pt));
            }

            tickets.insert(0, Ticket::from(tgt));
            tickets
        })
}

fn encrypting_protector() -> Arc<dyn PayloadProtector> {
    let key = KeyMaterial::generate("prop").unwrap();
    Arc::new(AuthenticatedEncryptionProtector::new(&key))
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn plain_payloads_round_trip(
        tickets in ticket_family_strategy(),
        threshold in prop::option::of(0usize..4096),
    ) {
        let codec = TicketCodec::new(
            TicketTranscoder::with_compression_threshold(threshold),
            Arc::new(NoOpProtector),
        );
        for ticket in &tickets {
            let bytes = codec.encode(ticket).unwrap();
            prop_assert_eq!(&codec.decode(&bytes).unwrap(), ticket);
        }
    }

    #[test]
    fn protected_payloads_round_trip(tickets in ticket_family_strategy()) {
        let codec = TicketCodec::new(TicketTranscoder::new(), encrypting_protector());
        prop_assert!(codec.is_protected());
        for ticket in &tickets {
            let bytes = codec.encode(ticket).unwrap();
            prop_assert_eq!(&codec.decode(&bytes).unwrap(), ticket);
        }
    }

    #[test]
    fn truncated_payloads_never_decode(
        tickets in ticket_family_strategy(),
        cut in any::<prop::sample::Index>(),
        protected in any::<bool>(),
    ) {
        let protector = if protected { encrypting_protector() } else { Arc::new(NoOpProtector) };
        let codec = TicketCodec::new(TicketTranscoder::new(), protector);

        let bytes = codec.encode(&tickets[0]).unwrap();
        let len = cut.index(bytes.len());
        let err = codec.decode(&bytes[..len]).unwrap_err();
        prop_assert!(err.is_decode_error());
        if protected {
            let is_integrity = matches!(err, CodecError::IntegrityViolation { .. });
            prop_assert!(is_integrity);
        }
    }
}

#[test]
fn compression_is_transparent_for_large_tickets() {
    let mut auth = Authentication::new("alice", EPOCH);
    for n in 0..2_000 {
        auth = auth.with_attribute("memberOf", format!("cn=group-{n},ou=groups,dc=example,dc=org"));
    }
    let ticket = Ticket::from(TicketGrantingTicket::new(
        "TGT-1-large-node1",
        auth,
        ExpirationPolicy::default(),
        EPOCH,
    ));

    let compressed = TicketTranscoder::new().encode(&ticket).unwrap();
    let uncompressed = TicketTranscoder::with_compression_threshold(None)
        .encode(&ticket)
        .unwrap();
    assert!(compressed.len() < uncompressed.len());

    // Either transcoder reads either payload
    let reader = TicketTranscoder::with_compression_threshold(None);
    assert_eq!(reader.decode(&compressed).unwrap(), ticket);
    assert_eq!(TicketTranscoder::new().decode(&uncompressed).unwrap(), ticket);
}
