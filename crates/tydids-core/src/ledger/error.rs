//! Error types for ledger operations.

use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger refused the transaction.
    #[error("transaction rejected: {reason}")]
    Rejected { reason: String },

    /// The ledger could not be reached or its state is unusable.
    #[error("ledger unavailable: {reason}")]
    Unavailable { reason: String },

    /// No confirmation arrived within the caller's deadline.
    #[error("ledger call timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("voter index {index} out of range ({len} voters)")]
    IndexOutOfRange { index: u64, len: u64 },
}

impl LedgerError {
    /// Returns true if retrying the same call later might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }

    /// Suggested exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Rejected { .. } => 3,
            Self::Unavailable { .. } | Self::Timeout { .. } => 4,
            Self::IndexOutOfRange { .. } => 2,
        }
    }
}
