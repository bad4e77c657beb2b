//! Address-style identities derived from secp256k1 public keys.
//!
//! An identity is the last 20 bytes of the Keccak-256 hash of the
//! uncompressed public key (without the `0x04` tag), rendered as `0x` +
//! 40 hex characters with the EIP-55 mixed-case checksum:
//!
//! ```text
//! 0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf
//! ```
//!
//! Parsing accepts any letter case and always normalizes to the checksummed
//! form, so two identities compare equal iff their hex digits match.

use std::fmt;

use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use super::error::{CryptoError, CryptoResult};

/// Length of a rendered identity: `0x` + 40 hex characters.
pub const IDENTITY_LEN: usize = 42;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Derive the identity of a public key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let hash = Keccak256::digest(&point.as_bytes()[1..]);
        Self(checksum_encode(&hash[12..]))
    }

    /// Parse an address string, normalizing it to its checksummed form.
    pub fn parse(value: &str) -> CryptoResult<Self> {
        let invalid = |reason: &str| CryptoError::InvalidIdentity {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .ok_or_else(|| invalid("missing 0x prefix"))?;
        if digits.len() != IDENTITY_LEN - 2 {
            return Err(invalid("expected 40 hex characters"));
        }
        let bytes = hex::decode(digits).map_err(|e| invalid(&e.to_string()))?;
        Ok(Self(checksum_encode(&bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// EIP-55: uppercase every hex letter whose nibble in keccak(lowercase hex) is >= 8.
fn checksum_encode(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = Keccak256::digest(lower.as_bytes());

    let mut out = String::with_capacity(IDENTITY_LEN);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = CryptoError;

    fn try_from(value: String) -> CryptoResult<Self> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl std::str::FromStr for Identity {
    type Err = CryptoError;

    fn from_str(s: &str) -> CryptoResult<Self> {
        Self::parse(s)
    }
}
