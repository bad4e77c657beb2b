//! Ephemeral consent identities and co-signed validation records.
//!
//! - [`ConsentRecord`]: payload signed by a one-shot identity that is
//!   disclosed once via [`ConsentRecord::reveal`] and then rotated.
//! - [`ValidationRecord`]: authority-signed object co-signed by an account
//!   holder, transportable as a [`ValidationBundle`] and verifiable offline.
//! - [`StatusQuery`]: publish/revoke timestamps for a bare identity.
//! - [`Ledger`]: the external append-only ledger, with [`MemoryLedger`] as
//!   an in-process implementation.

pub mod attachment;
pub mod canonical;
pub mod config;
pub mod consent;
pub mod crypto;
pub mod error;
pub mod keystore;
pub mod ledger;
pub mod ssi;
pub mod status;
pub mod validation;

// Convenience re-exports
pub use attachment::{AttachmentAnnouncer, AttachmentError, Sha256Announcer};
pub use config::{ConfigError, KdfSettings, OpenLimits, OpenLimitsOverrides, TydidsConfig};
pub use consent::{ConsentRecord, Consensus, Disclosure, Payload};
pub use crypto::{recover_signer, CryptoError, Identity, KeyMaterial, Signer};
pub use error::{RecordError, RecordResult, ValidationIssue};
pub use keystore::{KeystoreError, SecureElement};
pub use ledger::{
    with_deadline, Ledger, LedgerAction, LedgerError, MemoryLedger, Receipt, VoteCounts, VoteKind,
    VoterList,
};
pub use ssi::SelfSovereignIdentity;
pub use status::{GrantReport, GrantStatus, StatusQuery};
pub use validation::{AccountData, ValidationBundle, ValidationRecord};
