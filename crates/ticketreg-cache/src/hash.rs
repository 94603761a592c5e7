//! Key hash algorithms used for node placement.
//!
//! Values are computed the way memcached clients compute them, truncated to
//! 32 bits, so that every node in a mixed deployment places a given key on
//! the same server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ticketreg_core::ConfigError;

const FNV_64_INIT: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_64_PRIME: u64 = 0x0000_0100_0000_01b3;
const FNV_32_INIT: u32 = 0x811c_9dc5;
const FNV_32_PRIME: u32 = 0x0100_0193;

/// Hash algorithm applied to cache keys.
///
/// Variant names follow the memcached client constants (`FNV1A_64_HASH`).
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HashAlgorithm {
    /// Upper bits of CRC-32, masked to 15 bits.
    Crc,
    /// FNV-1 64-bit.
    #[default]
    Fnv1_64,
    /// FNV-1a 64-bit.
    Fnv1a_64,
    /// FNV-1 32-bit.
    Fnv1_32,
    /// FNV-1a 32-bit.
    Fnv1a_32,
    /// First four bytes of the MD5 digest, little endian.
    Ketama,
}

impl HashAlgorithm {
    pub const ALL: [Self; 6] = [
        Self::Crc,
        Self::Fnv1_64,
        Self::Fnv1a_64,
        Self::Fnv1_32,
        Self::Fnv1a_32,
        Self::Ketama,
    ];

    /// Hashes `key` to a 32-bit placement value.
    #[must_use]
    pub fn hash(self, key: &[u8]) -> u32 {
        match self {
            Self::Crc => (crc32fast::hash(key) >> 16) & 0x7fff,
            Self::Fnv1_64 => {
                let mut rv = FNV_64_INIT;
                for &b in key {
                    rv = rv.wrapping_mul(FNV_64_PRIME);
                    rv ^= u64::from(b);
                }
                rv as u32
            }
            Self::Fnv1a_64 => {
                let mut rv = FNV_64_INIT;
                for &b in key {
                    rv ^= u64::from(b);
                    rv = rv.wrapping_mul(FNV_64_PRIME);
                }
                rv as u32
            }
            Self::Fnv1_32 => {
                let mut rv = FNV_32_INIT;
                for &b in key {
                    rv = rv.wrapping_mul(FNV_32_PRIME);
                    rv ^= u32::from(b);
                }
                rv
            }
            Self::Fnv1a_32 => {
                let mut rv = FNV_32_INIT;
                for &b in key {
                    rv ^= u32::from(b);
                    rv = rv.wrapping_mul(FNV_32_PRIME);
                }
                rv
            }
            Self::Ketama => ketama_point(&md5::compute(key).0, 0),
        }
    }

    /// Canonical name, as written in configuration files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crc => "crc",
            Self::Fnv1_64 => "fnv1-64",
            Self::Fnv1a_64 => "fnv1a-64",
            Self::Fnv1_32 => "fnv1-32",
            Self::Fnv1a_32 => "fnv1a-32",
            Self::Ketama => "ketama",
        }
    }
}

/// Extracts the `n`th 32-bit point from an MD5 digest.
pub(crate) fn ketama_point(digest: &[u8; 16], n: usize) -> u32 {
    let b = &digest[n * 4..n * 4 + 4];
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ConfigError;

    /// Accepts canonical names and memcached client spellings
    /// (`FNV1A_64_HASH`, `KETAMA_HASH`, ...), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let normalized = normalized.strip_suffix("-hash").unwrap_or(&normalized);
        match normalized {
            "crc" => Ok(Self::Crc),
            "fnv1-64" => Ok(Self::Fnv1_64),
            "fnv1a-64" => Ok(Self::Fnv1a_64),
            "fnv1-32" => Ok(Self::Fnv1_32),
            "fnv1a-32" => Ok(Self::Fnv1a_32),
            "ketama" => Ok(Self::Ketama),
            _ => Err(ConfigError::invalid_value(format!(
                "unknown hash algorithm '{s}' (expected one of crc, fnv1-64, fnv1a-64, fnv1-32, fnv1a-32, ketama)"
            ))),
        }
    }
}

impl TryFrom<String> for HashAlgorithm {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HashAlgorithm> for String {
    fn from(value: HashAlgorithm) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_values() {
        // Published FNV test vectors, truncated to 32 bits
        assert_eq!(HashAlgorithm::Fnv1_32.hash(b""), 0x811c_9dc5);
        assert_eq!(HashAlgorithm::Fnv1_32.hash(b"a"), 0x050c_5d7e);
        assert_eq!(HashAlgorithm::Fnv1a_32.hash(b"a"), 0xe40c_292c);
        assert_eq!(HashAlgorithm::Fnv1a_32.hash(b"foobar"), 0xbf9c_f968);
        assert_eq!(HashAlgorithm::Fnv1_64.hash(b"a"), 0x8601_b7be);
        assert_eq!(HashAlgorithm::Fnv1a_64.hash(b"a"), 0x8601_ec8c);
        assert_eq!(HashAlgorithm::Fnv1a_64.hash(b"foobar"), 0xf739_67e8);
        assert_eq!(HashAlgorithm::Fnv1_64.hash(b"foobar"), 0xa4dd_a9c2);

        // crc32("a") = 0xe8b7be43
        assert_eq!(HashAlgorithm::Crc.hash(b"a"), 0x68b7);

        // md5("a") = 0cc175b9...
        assert_eq!(HashAlgorithm::Ketama.hash(b"a"), 0xb975_c10c);
    }

    #[test]
    fn test_parse_memcached_spellings() {
        assert_eq!(
            "FNV1_64_HASH".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Fnv1_64
        );
        assert_eq!(
            "FNV1A_32_HASH".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Fnv1a_32
        );
        assert_eq!(
            "KETAMA_HASH".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Ketama
        );
        assert_eq!("CRC_HASH".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Crc);
        assert_eq!(
            "fnv1a-64".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Fnv1a_64
        );
        assert!("NATIVE_HASH".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_name_round_trip() {
        for alg in HashAlgorithm::ALL {
            assert_eq!(alg.as_str().parse::<HashAlgorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn test_serde_uses_names() {
        let json = serde_json::to_string(&HashAlgorithm::Fnv1a_64).unwrap();
        assert_eq!(json, "\"fnv1a-64\"");
        let parsed: HashAlgorithm = serde_json::from_str("\"KETAMA_HASH\"").unwrap();
        assert_eq!(parsed, HashAlgorithm::Ketama);
        assert!(serde_json::from_str::<HashAlgorithm>("\"sha1\"").is_err());
    }
}
