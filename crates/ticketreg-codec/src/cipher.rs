//! Payload protection using AES-256-GCM.
//!
//! Protection is optional and selected once at construction:
//!
//! - [`NoOpProtector`] passes payloads through unchanged
//! - [`AuthenticatedEncryptionProtector`] encrypts and authenticates them
//!
//! # Protected payload layout
//!
//! ```text
//! ┌─────────┬────────────┬────────┬──────────┬─────────────────────────┐
//! │ version │ key id len │ key id │ nonce    │ ciphertext + GCM tag     │
//! │ 1 byte  │ 1 byte     │ n bytes│ 12 bytes │                          │
//! └─────────┴────────────┴────────┴──────────┴─────────────────────────┘
//! ```
//!
//! The version and key id are bound as associated data, so altering any
//! byte of the protected payload fails authentication. Authentication always
//! happens before the plaintext is handed to the transcoder.
//!
//! # Key rotation
//!
//! New payloads are always sealed with the current key. Retired keys are kept
//! in the keyring for opening only, so tickets written before a rotation stay
//! readable until they expire.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use ticketreg_core::ConfigError;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CodecError;

/// Key size for AES-256 (256 bits)
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Protected payload format version.
const FORMAT_VERSION: u8 = 1;

/// Default key identifier.
pub const DEFAULT_KEY_ID: &str = "primary";

// =============================================================================
// Protector Trait
// =============================================================================

/// Wraps transcoded payloads before they leave the process.
pub trait PayloadProtector: Send + Sync + fmt::Debug {
    /// Protects a payload for storage.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if the payload cannot be sealed.
    fn protect(&self, payload: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Verifies and opens a stored payload.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::IntegrityViolation` if the payload was altered,
    /// truncated, or sealed with an unknown key.
    fn unprotect(&self, payload: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Returns `true` if payloads are actually encrypted.
    fn is_enabled(&self) -> bool;
}

/// Pass-through protector used when encryption is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProtector;

impl PayloadProtector for NoOpProtector {
    fn protect(&self, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(payload.to_vec())
    }

    fn unprotect(&self, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(payload.to_vec())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

// =============================================================================
// Key Material
// =============================================================================

/// A named 256-bit key. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    key_id: String,
    key: [u8; KEY_SIZE],
}

impl KeyMaterial {
    /// Creates key material from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the key id is empty, longer
    /// than 255 bytes, or not printable ASCII.
    pub fn new(key_id: impl Into<String>, key: [u8; KEY_SIZE]) -> Result<Self, ConfigError> {
        let key_id = key_id.into();
        validate_key_id(&key_id)?;
        Ok(Self { key_id, key })
    }

    /// Parses key material from a hex or base64 string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the string is not a valid
    /// 32-byte key in either encoding.
    pub fn parse(key_id: impl Into<String>, encoded: &str) -> Result<Self, ConfigError> {
        let key = parse_key(encoded)?;
        Self::new(key_id, key)
    }

    /// Generates a new random key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the key id is invalid.
    pub fn generate(key_id: impl Into<String>) -> Result<Self, ConfigError> {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(key_id, key)
    }

    /// Returns the key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns the key encoded as base64, suitable for configuration files.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.key)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(&self.key.into())
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_id", &self.key_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn validate_key_id(key_id: &str) -> Result<(), ConfigError> {
    if key_id.is_empty() {
        return Err(ConfigError::invalid_value("key id must not be empty"));
    }
    if key_id.len() > usize::from(u8::MAX) {
        return Err(ConfigError::invalid_value(format!(
            "key id must be at most {} bytes, got {}",
            u8::MAX,
            key_id.len()
        )));
    }
    if !key_id.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(ConfigError::invalid_value(
            "key id must be printable ASCII without spaces",
        ));
    }
    Ok(())
}

/// Parse a key from a hex or base64 string
fn parse_key(key_str: &str) -> Result<[u8; KEY_SIZE], ConfigError> {
    let key_str = key_str.trim();

    // Try hex first
    if key_str.len() == KEY_SIZE * 2 {
        if let Ok(bytes) = hex::decode(key_str) {
            let mut key = [0u8; KEY_SIZE];
            key.copy_from_slice(&bytes);
            return Ok(key);
        }
    }

    let bytes = BASE64
        .decode(key_str)
        .map_err(|e| ConfigError::invalid_value(format!("Invalid base64 key: {e}")))?;

    if bytes.len() != KEY_SIZE {
        return Err(ConfigError::invalid_value(format!(
            "Key must be {} bytes, got {}",
            KEY_SIZE,
            bytes.len()
        )));
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

// =============================================================================
// Authenticated Encryption
// =============================================================================

/// AES-256-GCM protector with a keyring for rotation.
pub struct AuthenticatedEncryptionProtector {
    current_key_id: String,
    keyring: HashMap<String, Aes256Gcm>,
}

impl AuthenticatedEncryptionProtector {
    /// Creates a protector sealing with `current`.
    #[must_use]
    pub fn new(current: &KeyMaterial) -> Self {
        let mut keyring = HashMap::new();
        keyring.insert(current.key_id().to_string(), current.cipher());
        Self {
            current_key_id: current.key_id().to_string(),
            keyring,
        }
    }

    /// Adds a retired key that is accepted for opening only.
    ///
    /// A retired key with the current key id is ignored.
    #[must_use]
    pub fn with_retired_key(mut self, key: &KeyMaterial) -> Self {
        if key.key_id() != self.current_key_id {
            self.keyring
                .insert(key.key_id().to_string(), key.cipher());
        }
        self
    }

    /// Returns the id of the key used for sealing.
    #[must_use]
    pub fn current_key_id(&self) -> &str {
        &self.current_key_id
    }

    fn header(key_id: &str) -> Vec<u8> {
        let mut header = Vec::with_capacity(2 + key_id.len());
        header.push(FORMAT_VERSION);
        // Key ids are validated to fit in a byte
        header.push(key_id.len() as u8);
        header.extend_from_slice(key_id.as_bytes());
        header
    }
}

impl PayloadProtector for AuthenticatedEncryptionProtector {
    fn protect(&self, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        let cipher = self.keyring.get(&self.current_key_id).ok_or_else(|| {
            CodecError::encode(format!("Current key '{}' not found", self.current_key_id))
        })?;

        let header = Self::header(&self.current_key_id);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: payload,
                    aad: &header,
                },
            )
            .map_err(|e| CodecError::encode(format!("Encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(header.len() + NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn unprotect(&self, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        let (&version, rest) = payload
            .split_first()
            .ok_or_else(|| CodecError::integrity("empty payload"))?;
        if version != FORMAT_VERSION {
            return Err(CodecError::integrity(format!(
                "unsupported protection format {version}"
            )));
        }

        let (&id_len, rest) = rest
            .split_first()
            .ok_or_else(|| CodecError::integrity("truncated header"))?;
        let id_len = usize::from(id_len);
        if rest.len() < id_len + NONCE_SIZE {
            return Err(CodecError::integrity("truncated header"));
        }

        let (key_id, rest) = rest.split_at(id_len);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

        let key_id = std::str::from_utf8(key_id)
            .map_err(|_| CodecError::integrity("malformed key id"))?;
        let cipher = self
            .keyring
            .get(key_id)
            .ok_or_else(|| CodecError::integrity("unknown key id"))?;

        let header_len = 2 + id_len;
        cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: &payload[..header_len],
                },
            )
            .map_err(|_| CodecError::integrity("authentication tag mismatch"))
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

impl fmt::Debug for AuthenticatedEncryptionProtector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedEncryptionProtector")
            .field("current_key_id", &self.current_key_id)
            .field("keyring_size", &self.keyring.len())
            .finish()
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Payload protection configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [crypto]
/// enabled = true
/// key_env = "TICKETREG_TICKET_KEY"
/// key_id = "2024-06"
///
/// [[crypto.retired_keys]]
/// key_id = "2024-01"
/// key = "3q2+7w..."
/// ```
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CipherConfig {
    /// Encrypt and authenticate stored payloads.
    pub enabled: bool,

    /// Inline key, hex or base64.
    pub key: Option<String>,

    /// Name of an environment variable holding the key.
    pub key_env: Option<String>,

    /// Identifier written into every protected payload.
    pub key_id: String,

    /// Keys accepted for opening only.
    pub retired_keys: Vec<RetiredKeyConfig>,
}

/// A retired key kept for opening payloads sealed before a rotation.
#[derive(Clone, Deserialize, Serialize)]
pub struct RetiredKeyConfig {
    pub key_id: String,
    pub key: String,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key: None,
            key_env: None,
            key_id: DEFAULT_KEY_ID.to_string(),
            retired_keys: Vec::new(),
        }
    }
}

impl fmt::Debug for CipherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherConfig")
            .field("enabled", &self.enabled)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("key_env", &self.key_env)
            .field("key_id", &self.key_id)
            .field("retired_keys", &self.retired_keys.len())
            .finish()
    }
}

impl CipherConfig {
    /// Validates the configuration, resolving key material when enabled.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if encryption is enabled without key
    /// material, and `ConfigError::InvalidValue` for malformed keys or key ids.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolve_keys().map(|_| ())
    }

    /// Resolves the current key and retired keys.
    ///
    /// Returns `None` when encryption is disabled.
    ///
    /// # Errors
    ///
    /// See [`CipherConfig::validate`].
    pub fn resolve_keys(&self) -> Result<Option<(KeyMaterial, Vec<KeyMaterial>)>, ConfigError> {
        if !self.enabled {
            return Ok(None);
        }

        let encoded = match (&self.key, &self.key_env) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::invalid_value(
                    "crypto.key and crypto.key_env are mutually exclusive",
                ));
            }
            (Some(key), None) => key.clone(),
            (None, Some(var)) => match std::env::var(var) {
                Ok(value) => value,
                Err(std::env::VarError::NotPresent) => {
                    return Err(ConfigError::missing(format!(
                        "crypto.key_env: environment variable {var} is not set"
                    )));
                }
                Err(e) => {
                    return Err(ConfigError::invalid_value(format!(
                        "Failed to read {var}: {e}"
                    )));
                }
            },
            (None, None) => {
                return Err(ConfigError::missing(
                    "crypto.key or crypto.key_env (encryption is enabled)",
                ));
            }
        };

        let current = KeyMaterial::parse(self.key_id.clone(), &encoded)?;
        let retired = self
            .retired_keys
            .iter()
            .map(|retired| KeyMaterial::parse(retired.key_id.clone(), &retired.key))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some((current, retired)))
    }
}

/// Builds the protector selected by the configuration.
///
/// # Errors
///
/// Returns a `ConfigError` if encryption is enabled and key material is
/// missing or malformed.
pub fn build_protector(config: &CipherConfig) -> Result<Arc<dyn PayloadProtector>, ConfigError> {
    match config.resolve_keys()? {
        None => Ok(Arc::new(NoOpProtector)),
        Some((current, retired)) => {
            let protector = retired.iter().fold(
                AuthenticatedEncryptionProtector::new(&current),
                AuthenticatedEncryptionProtector::with_retired_key,
            );
            tracing::info!(
                key_id = %protector.current_key_id(),
                retired_keys = retired.len(),
                "Ticket payload encryption enabled"
            );
            Ok(Arc::new(protector))
        }
    }
}
