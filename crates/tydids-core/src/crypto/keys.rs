//! Ephemeral secp256k1 key material and personal-message signatures.

use std::fmt;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use super::error::{CryptoError, CryptoResult};
use super::identity::Identity;

/// Length of a rendered signature: `0x` + hex(r || s || v).
pub const SIGNATURE_LEN: usize = 132;

const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Signing capability used by records.
///
/// Records never touch a concrete key type at their signing call sites; an
/// account holder can be any implementation (software key, wallet adapter).
pub trait Signer: Send + Sync {
    /// The address this signer's signatures recover to.
    fn identity(&self) -> &Identity;

    /// Sign the exact string content, returning a 132-char `0x` signature.
    fn sign_message(&self, message: &str) -> CryptoResult<String>;
}

/// A keypair with its derived identity.
///
/// Owned by exactly one record at a time; deliberately not `Clone`. The
/// secret scalar is zeroized when the key is dropped.
pub struct KeyMaterial {
    signing_key: SigningKey,
    identity: Identity,
}

impl KeyMaterial {
    /// Mint a fresh random keypair from the OS entropy source.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Restore key material from a `0x`-prefixed (or bare) 32-byte hex secret.
    pub fn from_private_key(private_key: &str) -> CryptoResult<Self> {
        let digits = private_key.strip_prefix("0x").unwrap_or(private_key);
        let bytes = Zeroizing::new(hex::decode(digits).map_err(|e| {
            CryptoError::InvalidPrivateKey {
                reason: e.to_string(),
            }
        })?);
        Self::from_secret_bytes(&bytes)
    }

    pub(crate) fn from_secret_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidPrivateKey {
                reason: format!("expected 32 bytes, got {}", bytes.len()),
            });
        }
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|e| CryptoError::InvalidPrivateKey {
                reason: e.to_string(),
            })?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let identity = Identity::from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            identity,
        }
    }

    /// The `0x`-prefixed hex secret. Only for disclosure and export.
    pub fn private_key_hex(&self) -> Zeroizing<String> {
        let secret = self.secret_bytes();
        Zeroizing::new(format!("0x{}", hex::encode(secret.as_slice())))
    }

    pub(crate) fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }
}

impl Signer for KeyMaterial {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn sign_message(&self, message: &str) -> CryptoResult<String> {
        let digest = personal_message_digest(message);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| CryptoError::Signing {
                reason: e.to_string(),
            })?;

        let mut raw = Vec::with_capacity(65);
        raw.extend_from_slice(&signature.to_bytes());
        raw.push(27 + recovery_id.to_byte());
        Ok(format!("0x{}", hex::encode(raw)))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("identity", &self.identity)
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}

/// Keccak-256 of the EIP-191 personal message envelope for `message`.
pub fn personal_message_digest(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX.as_bytes());
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Recover the identity that produced `signature` over `message`.
pub fn recover_signer(message: &str, signature: &str) -> CryptoResult<Identity> {
    let invalid = |reason: String| CryptoError::InvalidSignature { reason };

    let digits = signature
        .strip_prefix("0x")
        .ok_or_else(|| invalid("missing 0x prefix".to_string()))?;
    let raw = hex::decode(digits).map_err(|e| invalid(e.to_string()))?;
    if raw.len() != 65 {
        return Err(invalid(format!("expected 65 bytes, got {}", raw.len())));
    }

    let v = match raw[64] {
        v @ (27 | 28) => v - 27,
        v @ (0 | 1) => v,
        other => return Err(invalid(format!("unsupported recovery byte {other}"))),
    };
    let recovery_id =
        RecoveryId::from_byte(v).ok_or_else(|| invalid(format!("bad recovery id {v}")))?;
    let signature = Signature::from_slice(&raw[..64]).map_err(|e| invalid(e.to_string()))?;

    let digest = personal_message_digest(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id).map_err(
        |e| CryptoError::Recovery {
            reason: e.to_string(),
        },
    )?;
    Ok(Identity::from_verifying_key(&key))
}
