//! Codec error types.
//!
//! Every decode-side error (`CorruptPayload`, `SchemaMismatch`,
//! `IntegrityViolation`) is collapsed into "ticket not found" at the registry
//! boundary. The distinct variants only exist so that operators can tell them
//! apart in logs.

/// Errors produced by the transcoder and the cipher layer.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload is malformed or truncated.
    #[error("Corrupt payload: {message}")]
    CorruptPayload {
        /// Description of what is wrong with the payload.
        message: String,
    },

    /// The payload was written with an unsupported schema version.
    #[error("Schema mismatch: payload version {found}, supported version {supported}")]
    SchemaMismatch {
        /// Version found in the payload header.
        found: u8,
        /// Version this build can read.
        supported: u8,
    },

    /// Authentication of a protected payload failed.
    #[error("Integrity violation: {message}")]
    IntegrityViolation {
        /// Description of the failed check.
        message: String,
    },

    /// A ticket could not be serialized or protected.
    #[error("Encode error: {message}")]
    Encode {
        /// Description of the encode failure.
        message: String,
    },
}

impl CodecError {
    /// Creates a new `CorruptPayload` error.
    #[must_use]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptPayload {
            message: message.into(),
        }
    }

    /// Creates a new `IntegrityViolation` error.
    #[must_use]
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            message: message.into(),
        }
    }

    /// Creates a new `Encode` error.
    #[must_use]
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Stable identifier of the error kind for structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CorruptPayload { .. } => "corrupt_payload",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::IntegrityViolation { .. } => "integrity_violation",
            Self::Encode { .. } => "encode",
        }
    }

    /// Returns `true` for errors raised while reading a stored payload.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        !matches!(self, Self::Encode { .. })
    }
}
