//! # ticketreg-codec
//!
//! Converts tickets to the bytes stored in the cache cluster.
//!
//! - [`TicketTranscoder`] - versioned binary serialization with optional compression
//! - [`PayloadProtector`] - optional AES-256-GCM encryption with key rotation
//! - [`TicketCodec`] - both stages combined, in the order the registry needs
//!
//! ## Example
//!
//! ```ignore
//! use ticketreg_codec::{CipherConfig, TicketCodec, TicketTranscoder, build_protector};
//!
//! let protector = build_protector(&CipherConfig::default())?;
//! let codec = TicketCodec::new(TicketTranscoder::new(), protector);
//! let bytes = codec.encode(&ticket)?;
//! let decoded = codec.decode(&bytes)?;
//! ```

pub mod cipher;
pub mod codec;
pub mod error;
pub mod transcoder;

pub use cipher::{
    AuthenticatedEncryptionProtector, CipherConfig, KeyMaterial, NoOpProtector,
    PayloadProtector, RetiredKeyConfig, build_protector,
};
pub use codec::TicketCodec;
pub use error::CodecError;
pub use transcoder::{DEFAULT_COMPRESSION_THRESHOLD, SCHEMA_VERSION, TicketTranscoder};
