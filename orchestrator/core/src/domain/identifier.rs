// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gear Identity
//!
//! Validated value types naming a gear and a client public key. Everything
//! the host stores about a gear is addressed from these two values.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Identifier validation, unit naming, fingerprint short names

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Accepted shape of a gear identifier.
pub const IDENTIFIER_PATTERN: &str = r"\A[a-fA-F0-9]{4,32}\z";

static ALLOWED_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IDENTIFIER_PATTERN).expect("identifier pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Gear identifier may not be empty")]
    Empty,
    #[error("Gear identifier must match {pattern}")]
    Malformed { pattern: &'static str },
}

/// Opaque token identifying one gear.
///
/// Construction is the only validation point: a value of this type always
/// matches [`IDENTIFIER_PATTERN`], which also guarantees at least two
/// characters for directory sharding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if value.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if !ALLOWED_IDENTIFIER.is_match(&value) {
            return Err(IdentifierError::Malformed {
                pattern: IDENTIFIER_PATTERN,
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the long-running service unit backing this gear.
    pub fn unit_name(&self) -> String {
        format!("gear-{}.service", self.0)
    }

    /// Name of the transient unit used by administrative jobs on this gear.
    pub fn job_unit_name(&self) -> String {
        format!("job-{}.service", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

/// Digest of a client public key, supplied already computed.
///
/// No validation happens here; entropy is the producer's concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a hex-encoded digest, as operators usually paste them.
    pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(value.trim()).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// URL-safe base64 of the digest with padding removed.
    pub fn to_short_name(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }
}

impl From<Vec<u8>> for Fingerprint {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_hex_identifiers() {
        for value in ["abcd", "ABCDEF0123456789", "0a1B", &"f".repeat(32)] {
            let id = Identifier::new(value).unwrap();
            assert_eq!(id.as_str(), value);
        }
    }

    #[test]
    fn test_empty_identifier_is_distinct_error() {
        assert_eq!(Identifier::new(""), Err(IdentifierError::Empty));
    }

    #[test]
    fn test_malformed_identifiers() {
        for value in ["abc", "ghij", "abcd-1234", &"a".repeat(33), " abcd", "abcd\n"] {
            let err = Identifier::new(value).unwrap_err();
            assert!(
                matches!(err, IdentifierError::Malformed { .. }),
                "expected malformed for {value:?}"
            );
        }
        assert!(Identifier::new("zz")
            .unwrap_err()
            .to_string()
            .contains(IDENTIFIER_PATTERN));
    }

    #[test]
    fn test_unit_names() {
        let id: Identifier = "abcd1234".parse().unwrap();
        assert_eq!(id.unit_name(), "gear-abcd1234.service");
        assert_eq!(id.job_unit_name(), "job-abcd1234.service");
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Identifier = serde_json::from_str("\"beef\"").unwrap();
        assert_eq!(ok.as_str(), "beef");
        assert!(serde_json::from_str::<Identifier>("\"nope\"").is_err());
    }

    #[test]
    fn test_short_name_strips_padding() {
        // three bytes encode without padding
        let fp = Fingerprint::new(vec![0x01, 0xb0, 0xb5]);
        assert_eq!(fp.to_short_name(), "AbC1");

        // padded form is "AbA="
        let two = Fingerprint::new(vec![0x01, 0xb0]);
        assert_eq!(two.to_short_name(), "AbA");

        // padded form is "_w=="
        let padded = Fingerprint::new(vec![0xff]);
        assert_eq!(padded.to_short_name(), "_w");
        assert!(!padded.to_short_name().contains('='));
    }

    #[test]
    fn test_fingerprint_from_hex() {
        let fp = Fingerprint::from_hex("01b0b5").unwrap();
        assert_eq!(fp.as_bytes(), &[0x01, 0xb0, 0xb5]);
        assert!(Fingerprint::from_hex("xyz").is_err());
    }
}
