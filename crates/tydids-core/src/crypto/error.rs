//! Error types for key material and signature handling.

use thiserror::Error;

/// Result type for signing and recovery operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Private key material is not a valid secp256k1 scalar.
    #[error("invalid private key: {reason}")]
    InvalidPrivateKey { reason: String },

    /// Signature string is not a 65-byte `0x`-prefixed r||s||v value.
    #[error("invalid signature: {reason}")]
    InvalidSignature { reason: String },

    /// Identity string is not a 20-byte `0x`-prefixed address.
    #[error("invalid identity '{value}': {reason}")]
    InvalidIdentity { value: String, reason: String },

    #[error("signing failed: {reason}")]
    Signing { reason: String },

    /// Signature is well-formed but no public key can be recovered from it.
    #[error("signer recovery failed: {reason}")]
    Recovery { reason: String },
}

impl CryptoError {
    /// Returns true if the failure concerns untrusted input rather than local keys.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature { .. } | Self::InvalidIdentity { .. } | Self::Recovery { .. }
        )
    }
}
