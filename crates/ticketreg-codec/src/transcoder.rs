//! Ticket transcoder.
//!
//! Converts a [`Ticket`] into a self-describing byte payload and back. The
//! payload layout is:
//!
//! ```text
//! ┌────────┬─────────┬──────────┬───────┬──────────────────────────────┐
//! │ "TK"   │ version │ kind tag │ flags │ MessagePack body (maybe      │
//! │ 2 bytes│ 1 byte  │ 1 byte   │ 1 byte│ deflate-compressed)          │
//! └────────┴─────────┴──────────┴───────┴──────────────────────────────┘
//! ```
//!
//! The kind tag selects the body type, so the body only carries the fields
//! of that variant. Bodies use named MessagePack fields so that optional
//! fields can be added without bumping the schema version.
//!
//! Encoding is deterministic: maps are ordered and compression uses a fixed
//! level.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use ticketreg_core::{Ticket, TicketKind};

use crate::error::CodecError;

/// Schema version written by this build.
pub const SCHEMA_VERSION: u8 = 1;

/// Bodies larger than this are compressed by default.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 16 * 1024;

const MAGIC: [u8; 2] = *b"TK";
const HEADER_LEN: usize = 5;
const FLAG_COMPRESSED: u8 = 0b0000_0001;
const KNOWN_FLAGS: u8 = FLAG_COMPRESSED;

/// Upper bound for a decompressed body. Protects against deflate bombs.
const MAX_BODY_LEN: usize = 8 * 1024 * 1024;

/// Serializes tickets to payloads and back. Stateless and cheap to clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketTranscoder {
    compression_threshold: Option<usize>,
}

impl Default for TicketTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketTranscoder {
    /// Creates a transcoder compressing bodies above
    /// [`DEFAULT_COMPRESSION_THRESHOLD`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            compression_threshold: Some(DEFAULT_COMPRESSION_THRESHOLD),
        }
    }

    /// Creates a transcoder with a custom compression threshold.
    /// `None` disables compression.
    #[must_use]
    pub fn with_compression_threshold(threshold: Option<usize>) -> Self {
        Self {
            compression_threshold: threshold,
        }
    }

    /// Encodes a ticket into a payload.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if the ticket cannot be serialized.
    pub fn encode(&self, ticket: &Ticket) -> Result<Vec<u8>, CodecError> {
        let body = match ticket {
            Ticket::TicketGranting(t) => encode_body(t)?,
            Ticket::Service(t) => encode_body(t)?,
            Ticket::ProxyGranting(t) => encode_body(t)?,
            Ticket::Proxy(t) => encode_body(t)?,
        };

        let (flags, body) = match self.compression_threshold {
            Some(threshold) if body.len() > threshold => {
                let compressed = compress(&body)?;
                if compressed.len() < body.len() {
                    (FLAG_COMPRESSED, compressed)
                } else {
                    (0, body)
                }
            }
            _ => (0, body),
        };

        let mut payload = Vec::with_capacity(HEADER_LEN + body.len());
        payload.extend_from_slice(&MAGIC);
        payload.push(SCHEMA_VERSION);
        payload.push(ticket.kind().tag());
        payload.push(flags);
        payload.extend_from_slice(&body);
        Ok(payload)
    }

    /// Decodes a payload into a ticket.
    ///
    /// # Errors
    ///
    /// - `CodecError::CorruptPayload` if the payload is truncated, has a bad
    ///   magic, an unknown kind tag, unknown flags or an undecodable body
    /// - `CodecError::SchemaMismatch` if the schema version is not supported
    pub fn decode(&self, payload: &[u8]) -> Result<Ticket, CodecError> {
        if payload.len() < HEADER_LEN {
            return Err(CodecError::corrupt(format!(
                "payload of {} bytes is shorter than the {HEADER_LEN} byte header",
                payload.len()
            )));
        }

        let (header, body) = payload.split_at(HEADER_LEN);
        if header[..2] != MAGIC {
            return Err(CodecError::corrupt("bad magic"));
        }

        let version = header[2];
        if version != SCHEMA_VERSION {
            return Err(CodecError::SchemaMismatch {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }

        let kind = TicketKind::from_tag(header[3])
            .ok_or_else(|| CodecError::corrupt(format!("unknown kind tag {}", header[3])))?;

        let flags = header[4];
        if flags & !KNOWN_FLAGS != 0 {
            return Err(CodecError::corrupt(format!("unknown flags {flags:#010b}")));
        }

        let decompressed;
        let body = if flags & FLAG_COMPRESSED != 0 {
            decompressed = decompress(body)?;
            decompressed.as_slice()
        } else {
            body
        };

        let ticket = match kind {
            TicketKind::TicketGranting => Ticket::TicketGranting(decode_body(body)?),
            TicketKind::Service => Ticket::Service(decode_body(body)?),
            TicketKind::ProxyGranting => Ticket::ProxyGranting(decode_body(body)?),
            TicketKind::Proxy => Ticket::Proxy(decode_body(body)?),
        };
        Ok(ticket)
    }
}

fn encode_body<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    rmp_serde::to_vec_named(value)
        .map_err(|e| CodecError::encode(format!("Failed to serialize ticket: {e}")))
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, CodecError> {
    let mut reader = body;
    let value = rmp_serde::from_read(&mut reader)
        .map_err(|e| CodecError::corrupt(format!("undecodable body: {e}")))?;

    if !reader.is_empty() {
        return Err(CodecError::corrupt(format!(
            "{} trailing bytes after body",
            reader.len()
        )));
    }
    Ok(value)
}

fn compress(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(body)
        .map_err(|e| CodecError::encode(format!("Compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| CodecError::encode(format!("Compression failed: {e}")))
}

fn decompress(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    DeflateDecoder::new(body)
        .take(MAX_BODY_LEN as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| CodecError::corrupt(format!("bad compressed body: {e}")))?;

    if out.len() > MAX_BODY_LEN {
        return Err(CodecError::corrupt("decompressed body exceeds size limit"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use ticketreg_core::{
        Authentication, ExpirationPolicy, ProxyGrantingTicket, ProxyTicket, ServiceTicket,
        TicketGrantingTicket, TicketState,
    };
    use time::macros::datetime;

    fn granting() -> Ticket {
        let now = datetime!(2024-03-01 09:30:15.123456789 UTC);
        let mut tgt = TicketGrantingTicket::new(
            "TGT-1-abc-node1",
            Authentication::new("casuser", now)
                .with_attribute("memberOf", "staff")
                .with_attribute("memberOf", "faculty"),
            ExpirationPolicy::default(),
            now,
        );
        tgt.grant_service_ticket("ST-1-a", "https://app.example.com", ExpirationPolicy::NeverExpires, now);
        tgt.proxy_granting_tickets.insert("PGT-1-p".to_string());
        Ticket::from(tgt)
    }

    fn all_kinds() -> Vec<Ticket> {
        let now = datetime!(2024-03-01 09:30 UTC);
        let single_use = ExpirationPolicy::MultiTimeUseOrTimeout {
            max_uses: 1,
            time_to_live: Duration::from_secs(10),
        };
        vec![
            granting(),
            Ticket::from(ServiceTicket {
                id: "ST-2-b".into(),
                state: TicketState::new(now),
                expiration_policy: single_use.clone(),
                granting_ticket_id: "TGT-1-abc-node1".into(),
                service: "https://app.example.com".into(),
                from_new_login: true,
            }),
            Ticket::from(ProxyGrantingTicket {
                id: "PGT-1-p".into(),
                state: TicketState::new(now),
                expiration_policy: ExpirationPolicy::Timeout {
                    time_to_kill: Duration::from_secs(7200),
                },
                granting_ticket_id: "TGT-1-abc-node1".into(),
                proxied_by: "https://proxy.example.com/callback".into(),
                authentication: Authentication::new("casuser", now),
                services: [("PT-1-x".to_string(), "https://backend".to_string())].into(),
            }),
            Ticket::from(ProxyTicket {
                id: "PT-1-x".into(),
                state: TicketState::new(now),
                expiration_policy: single_use,
                granting_ticket_id: "PGT-1-p".into(),
                service: "https://backend".into(),
            }),
        ]
    }

    #[test]
    fn test_roundtrip_all_kinds() {
        let transcoder = TicketTranscoder::new();
        for ticket in all_kinds() {
            let payload = transcoder.encode(&ticket).unwrap();
            assert_eq!(payload[3], ticket.kind().tag());
            let decoded = transcoder.decode(&payload).unwrap();
            assert_eq!(decoded, ticket);
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let transcoder = TicketTranscoder::new();
        let ticket = granting();
        assert_eq!(
            transcoder.encode(&ticket).unwrap(),
            transcoder.encode(&ticket).unwrap()
        );
    }

    #[test]
    fn test_large_ticket_is_compressed() {
        let transcoder = TicketTranscoder::with_compression_threshold(Some(256));
        let mut ticket = granting();
        if let Ticket::TicketGranting(tgt) = &mut ticket {
            for i in 0..200 {
                tgt.services
                    .insert(format!("ST-{i}-x"), "https://app.example.com".to_string());
            }
        }

        let payload = transcoder.encode(&ticket).unwrap();
        assert_eq!(payload[4] & FLAG_COMPRESSED, FLAG_COMPRESSED);
        assert_eq!(transcoder.decode(&payload).unwrap(), ticket);

        let uncompressed = TicketTranscoder::with_compression_threshold(None)
            .encode(&ticket)
            .unwrap();
        assert!(payload.len() < uncompressed.len());
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let transcoder = TicketTranscoder::new();
        let payload = transcoder.encode(&granting()).unwrap();

        for len in [0, 1, 4, payload.len() / 2, payload.len() - 1] {
            let err = transcoder.decode(&payload[..len]).unwrap_err();
            assert!(
                matches!(err, CodecError::CorruptPayload { .. }),
                "length {len} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let transcoder = TicketTranscoder::new();
        let mut payload = transcoder.encode(&granting()).unwrap();
        payload[0] = b'X';
        assert!(matches!(
            transcoder.decode(&payload),
            Err(CodecError::CorruptPayload { .. })
        ));
    }

    #[test]
    fn test_unsupported_version_is_schema_mismatch() {
        let transcoder = TicketTranscoder::new();
        let mut payload = transcoder.encode(&granting()).unwrap();
        payload[2] = SCHEMA_VERSION + 1;
        assert!(matches!(
            transcoder.decode(&payload),
            Err(CodecError::SchemaMismatch { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn test_unknown_kind_tag_is_corrupt() {
        let transcoder = TicketTranscoder::new();
        let mut payload = transcoder.encode(&granting()).unwrap();
        payload[3] = 42;
        assert!(matches!(
            transcoder.decode(&payload),
            Err(CodecError::CorruptPayload { .. })
        ));
    }

    #[test]
    fn test_wrong_kind_tag_is_corrupt() {
        // A granting body read as a proxy ticket lacks required fields
        let transcoder = TicketTranscoder::new();
        let mut payload = transcoder.encode(&granting()).unwrap();
        payload[3] = TicketKind::Proxy.tag();
        assert!(matches!(
            transcoder.decode(&payload),
            Err(CodecError::CorruptPayload { .. })
        ));
    }

    #[test]
    fn test_unknown_flags_are_corrupt() {
        let transcoder = TicketTranscoder::new();
        let mut payload = transcoder.encode(&granting()).unwrap();
        payload[4] = 0b1000_0000;
        assert!(matches!(
            transcoder.decode(&payload),
            Err(CodecError::CorruptPayload { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_are_corrupt() {
        let transcoder = TicketTranscoder::new();
        let mut payload = transcoder.encode(&granting()).unwrap();
        payload.extend_from_slice(&[0xc0, 0xc0]);
        assert!(matches!(
            transcoder.decode(&payload),
            Err(CodecError::CorruptPayload { .. })
        ));
    }
}
