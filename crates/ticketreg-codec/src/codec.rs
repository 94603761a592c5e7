//! Transcoder and protector combined into the payload pipeline used by the
//! registry.

use std::sync::Arc;

use ticketreg_core::Ticket;

use crate::cipher::{NoOpProtector, PayloadProtector};
use crate::error::CodecError;
use crate::transcoder::TicketTranscoder;

/// Encodes tickets into stored payloads and back.
///
/// Writes serialize then protect. Reads unprotect then deserialize, so a
/// tampered payload never reaches the deserializer.
#[derive(Debug, Clone)]
pub struct TicketCodec {
    transcoder: TicketTranscoder,
    protector: Arc<dyn PayloadProtector>,
}

impl Default for TicketCodec {
    fn default() -> Self {
        Self::new(TicketTranscoder::new(), Arc::new(NoOpProtector))
    }
}

impl TicketCodec {
    #[must_use]
    pub fn new(transcoder: TicketTranscoder, protector: Arc<dyn PayloadProtector>) -> Self {
        Self {
            transcoder,
            protector,
        }
    }

    /// Returns `true` if payloads are encrypted.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.protector.is_enabled()
    }

    /// Encodes and protects a ticket.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization or sealing fails.
    pub fn encode(&self, ticket: &Ticket) -> Result<Vec<u8>, CodecError> {
        let payload = self.transcoder.encode(ticket)?;
        self.protector.protect(&payload)
    }

    /// Verifies and decodes a stored payload.
    ///
    /// # Errors
    ///
    /// Returns a decode-side `CodecError` if the payload fails
    /// authentication or cannot be deserialized.
    pub fn decode(&self, payload: &[u8]) -> Result<Ticket, CodecError> {
        let payload = self.protector.unprotect(payload)?;
        self.transcoder.decode(&payload)
    }
}
