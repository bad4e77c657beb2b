//! Record-level error taxonomy.
//!
//! Every failing record operation leaves the record exactly as it was before
//! the call.

use thiserror::Error;

use crate::attachment::AttachmentError;
use crate::crypto::{CryptoError, Identity};
use crate::keystore::KeystoreError;
use crate::ledger::LedgerError;

pub type RecordResult<T> = Result<T, RecordError>;

/// Structural problems with record input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    #[error("{field} not specified")]
    MissingField { field: String },

    #[error("field '{field}' is not allowed in a validation object")]
    UnexpectedField { field: String },

    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("validation fields must be a JSON object")]
    NotAnObject,

    #[error("no account signer attached")]
    NoSigner,

    #[error("no validation object set")]
    NoValidationObject,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationIssue),

    /// A recovered signer differs from the identity the record claims.
    #[error("{field} signature broken: claims {claimed}, signed by {recovered}")]
    SignatureMismatch {
        field: String,
        claimed: String,
        recovered: String,
    },

    #[error("record is immutable: cannot {operation}")]
    ImmutableState { operation: String },

    #[error("secure element does not match validation: expected {expected}, got {actual}")]
    KeyMismatch { expected: Identity, actual: Identity },

    /// The record holds a disposable key, not the one behind its validationID.
    #[error("record does not hold the validation key for {validation_id}: cannot {operation}")]
    NotAuthority {
        validation_id: Identity,
        operation: String,
    },

    #[error("decode failed: {reason}")]
    Decode { reason: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Keystore(#[from] KeystoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Attachment(#[from] AttachmentError),
}

impl RecordError {
    pub(crate) fn decode(err: anyhow::Error) -> Self {
        Self::Decode {
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        Self::Validation(ValidationIssue::MissingField {
            field: field.to_string(),
        })
    }

    pub(crate) fn immutable(operation: &str) -> Self {
        Self::ImmutableState {
            operation: operation.to_string(),
        }
    }

    /// Returns true if the input was cryptographically inconsistent.
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(self, Self::SignatureMismatch { .. })
    }

    /// Suggested exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::Decode { .. } => 2,
            Self::SignatureMismatch { .. } | Self::KeyMismatch { .. } => 5,
            Self::ImmutableState { .. } | Self::NotAuthority { .. } => 6,
            Self::Ledger(e) => e.exit_code(),
            _ => 1,
        }
    }
}
