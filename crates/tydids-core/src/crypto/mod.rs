//! Key material, identities and signature recovery.
//!
//! Signatures follow the Ethereum personal-message convention so that any
//! wallet able to `signMessage` can act as a [`Signer`]:
//!
//! | Item       | Format                                              |
//! |------------|-----------------------------------------------------|
//! | Identity   | `0x` + 40 hex, EIP-55 checksum (42 chars)           |
//! | Signature  | `0x` + hex(r ‖ s ‖ v), v ∈ {27, 28} (132 chars)     |
//! | Digest     | keccak256("\x19Ethereum Signed Message:\n" ‖ len ‖ m) |
//!
//! Signing is RFC 6979 deterministic: re-signing the same message with the
//! same key yields the identical signature.

pub mod error;
pub mod identity;
pub mod keys;

pub use error::{CryptoError, CryptoResult};
pub use identity::{Identity, IDENTITY_LEN};
pub use keys::{personal_message_digest, recover_signer, KeyMaterial, Signer, SIGNATURE_LEN};
