//! External ledger interface for grant lifecycle and voting.
//!
//! The ledger is append-only and externally ordered and timestamped. The
//! core never implements consensus; it only needs the calls below. Every
//! mutating call resolves once the transaction is confirmed, so a caller
//! that observes `Ok` may immediately query the new state.
//!
//! | Call            | Keyed by          | Returns                  |
//! |-----------------|-------------------|--------------------------|
//! | `publish`       | signer identity   | [`Receipt`]              |
//! | `published_at`  | identity          | Unix seconds, 0 = never  |
//! | `revoke`        | signer identity   | [`Receipt`]              |
//! | `revoked_at`    | identity          | Unix seconds, 0 = never  |
//! | `upvote`        | target identity   | [`Receipt`]              |
//! | `downvote`      | target identity   | [`Receipt`]              |
//! | `vote_counts`   | target identity   | [`VoteCounts`]           |
//! | `voter`         | target + index    | voter identity           |
//!
//! No retries or timeouts happen here. Wrap a call in [`with_deadline`]
//! to bound it.

pub mod error;
pub mod memory;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::{Identity, Signer};

pub use error::{LedgerError, LedgerResult};
pub use memory::MemoryLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    Publish,
    Revoke,
    Upvote,
    Downvote,
}

impl fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Publish => "publish",
            Self::Revoke => "revoke",
            Self::Upvote => "upvote",
            Self::Downvote => "downvote",
        })
    }
}

/// Confirmation of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_id: String,
    /// Transaction sender.
    pub from: Identity,
    pub action: LedgerAction,
    pub block: u64,
    pub confirmed_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    pub upvotes: u64,
    pub downvotes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterList {
    pub upvoters: Vec<Identity>,
    pub downvoters: Vec<Identity>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Announce the signer's identity.
    async fn publish(&self, signer: &dyn Signer) -> LedgerResult<Receipt>;

    /// Publication timestamp for `identity`, or 0 if never published.
    async fn published_at(&self, identity: &Identity) -> LedgerResult<u64>;

    async fn revoke(&self, signer: &dyn Signer) -> LedgerResult<Receipt>;

    /// Revocation timestamp for `identity`, or 0 if never revoked.
    async fn revoked_at(&self, identity: &Identity) -> LedgerResult<u64>;

    async fn upvote(&self, voter: &dyn Signer, target: &Identity) -> LedgerResult<Receipt>;

    async fn downvote(&self, voter: &dyn Signer, target: &Identity) -> LedgerResult<Receipt>;

    async fn vote_counts(&self, target: &Identity) -> LedgerResult<VoteCounts>;

    /// The `index`-th voter of the given kind for `target`.
    async fn voter(&self, target: &Identity, kind: VoteKind, index: u64) -> LedgerResult<Identity>;

    /// Current height, reported alongside status answers.
    async fn block_height(&self) -> LedgerResult<u64>;
}

/// Enumerate all voters of `target` by sequential index.
pub async fn list_voters(ledger: &dyn Ledger, target: &Identity) -> LedgerResult<VoterList> {
    let counts = ledger.vote_counts(target).await?;
    let mut list = VoterList::default();
    for index in 0..counts.upvotes {
        list.upvoters
            .push(ledger.voter(target, VoteKind::Up, index).await?);
    }
    for index in 0..counts.downvotes {
        list.downvoters
            .push(ledger.voter(target, VoteKind::Down, index).await?);
    }
    Ok(list)
}

/// Bound a ledger call by `deadline`, mapping expiry to [`LedgerError::Timeout`].
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> LedgerResult<T>
where
    F: Future<Output = LedgerResult<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout {
            after_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
