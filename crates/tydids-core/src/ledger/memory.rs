//! In-process ledger for offline use and tests.
//!
//! Mirrors the contract semantics records rely on:
//! - publish/revoke keep the first confirmed timestamp per identity
//! - one vote per (voter, target); an opposite vote replaces the earlier one
//! - voter lists keep confirmation order
//! - every mutating call advances the block height by one

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{Ledger, LedgerAction, LedgerError, LedgerResult, Receipt, VoteCounts, VoteKind};
use crate::crypto::{Identity, Signer};

#[derive(Debug, Default)]
struct TargetVotes {
    upvoters: Vec<Identity>,
    downvoters: Vec<Identity>,
}

#[derive(Debug, Default)]
struct LedgerState {
    published: HashMap<Identity, u64>,
    revoked: HashMap<Identity, u64>,
    votes: HashMap<Identity, TargetVotes>,
    block: u64,
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    confirmation_delay: Option<Duration>,
    offline: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every mutating call before confirmation, as a remote ledger would.
    pub fn with_confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = Some(delay);
        self
    }

    /// Simulate losing the connection: every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, LedgerState>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable {
                reason: "ledger offline".to_string(),
            });
        }
        self.state.lock().map_err(|_| LedgerError::Unavailable {
            reason: "ledger state lock poisoned".to_string(),
        })
    }

    async fn await_confirmation(&self) {
        if let Some(delay) = self.confirmation_delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn commit<F>(&self, from: &Identity, action: LedgerAction, apply: F) -> LedgerResult<Receipt>
    where
        F: FnOnce(&mut LedgerState, u64) + Send,
    {
        // Reject early so an offline ledger fails without waiting.
        drop(self.lock()?);
        self.await_confirmation().await;

        let mut state = self.lock()?;
        state.block += 1;
        let block = state.block;
        let now = unix_now();
        apply(&mut *state, now);

        let receipt = Receipt {
            transaction_id: transaction_id(action, from, block),
            from: from.clone(),
            action,
            block,
            confirmed_at: now,
        };
        tracing::debug!(
            action = %action,
            from = %from,
            block,
            "ledger transaction confirmed"
        );
        Ok(receipt)
    }

    fn cast(state: &mut LedgerState, voter: &Identity, target: &Identity, kind: VoteKind) {
        let votes = state.votes.entry(target.clone()).or_default();
        let (same, opposite) = match kind {
            VoteKind::Up => (&mut votes.upvoters, &mut votes.downvoters),
            VoteKind::Down => (&mut votes.downvoters, &mut votes.upvoters),
        };
        opposite.retain(|v| v != voter);
        if !same.contains(voter) {
            same.push(voter.clone());
        }
    }
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

fn transaction_id(action: LedgerAction, from: &Identity, block: u64) -> String {
    let digest = Sha256::digest(format!("{action}:{from}:{block}").as_bytes());
    format!("0x{}", hex::encode(digest))
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn publish(&self, signer: &dyn Signer) -> LedgerResult<Receipt> {
        let from = signer.identity().clone();
        let key = from.clone();
        self.commit(&from, LedgerAction::Publish, move |state, now| {
            state.published.entry(key).or_insert(now);
        })
        .await
    }

    async fn published_at(&self, identity: &Identity) -> LedgerResult<u64> {
        Ok(self.lock()?.published.get(identity).copied().unwrap_or(0))
    }

    async fn revoke(&self, signer: &dyn Signer) -> LedgerResult<Receipt> {
        let from = signer.identity().clone();
        let key = from.clone();
        self.commit(&from, LedgerAction::Revoke, move |state, now| {
            state.revoked.entry(key).or_insert(now);
        })
        .await
    }

    async fn revoked_at(&self, identity: &Identity) -> LedgerResult<u64> {
        Ok(self.lock()?.revoked.get(identity).copied().unwrap_or(0))
    }

    async fn upvote(&self, voter: &dyn Signer, target: &Identity) -> LedgerResult<Receipt> {
        let from = voter.identity().clone();
        let (who, target) = (from.clone(), target.clone());
        self.commit(&from, LedgerAction::Upvote, move |state, _| {
            Self::cast(state, &who, &target, VoteKind::Up);
        })
        .await
    }

    async fn downvote(&self, voter: &dyn Signer, target: &Identity) -> LedgerResult<Receipt> {
        let from = voter.identity().clone();
        let (who, target) = (from.clone(), target.clone());
        self.commit(&from, LedgerAction::Downvote, move |state, _| {
            Self::cast(state, &who, &target, VoteKind::Down);
        })
        .await
    }

    async fn vote_counts(&self, target: &Identity) -> LedgerResult<VoteCounts> {
        let state = self.lock()?;
        Ok(state
            .votes
            .get(target)
            .map(|v| VoteCounts {
                upvotes: v.upvoters.len() as u64,
                downvotes: v.downvoters.len() as u64,
            })
            .unwrap_or_default())
    }

    async fn voter(&self, target: &Identity, kind: VoteKind, index: u64) -> LedgerResult<Identity> {
        let state = self.lock()?;
        let empty = Vec::new();
        let list = match (state.votes.get(target), kind) {
            (Some(v), VoteKind::Up) => &v.upvoters,
            (Some(v), VoteKind::Down) => &v.downvoters,
            (None, _) => &empty,
        };
        usize::try_from(index)
            .ok()
            .and_then(|i| list.get(i))
            .cloned()
            .ok_or(LedgerError::IndexOutOfRange {
                index,
                len: list.len() as u64,
            })
    }

    async fn block_height(&self) -> LedgerResult<u64> {
        Ok(self.lock()?.block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyMaterial;
    use crate::ledger::{list_voters, with_deadline};

    #[tokio::test]
    async fn test_publish_keeps_first_timestamp() {
        let ledger = MemoryLedger::new();
        let key = KeyMaterial::generate();
        assert_eq!(ledger.published_at(key.identity()).await.unwrap(), 0);

        let first = ledger.publish(&key).await.unwrap();
        let at = ledger.published_at(key.identity()).await.unwrap();
        assert_eq!(at, first.confirmed_at);
        assert_eq!(first.block, 1);

        let second = ledger.publish(&key).await.unwrap();
        assert_eq!(second.block, 2);
        assert_ne!(first.transaction_id, second.transaction_id);
        assert_eq!(ledger.published_at(key.identity()).await.unwrap(), at);
    }

    #[tokio::test]
    async fn test_revoke_is_independent_of_publish() {
        let ledger = MemoryLedger::new();
        let key = KeyMaterial::generate();
        ledger.revoke(&key).await.unwrap();
        assert!(ledger.revoked_at(key.identity()).await.unwrap() > 0);
        assert_eq!(ledger.published_at(key.identity()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_vote_switching() {
        let ledger = MemoryLedger::new();
        let voter = KeyMaterial::generate();
        let target = KeyMaterial::generate();
        let target = target.identity();

        ledger.upvote(&voter, target).await.unwrap();
        ledger.upvote(&voter, target).await.unwrap();
        assert_eq!(
            ledger.vote_counts(target).await.unwrap(),
            VoteCounts {
                upvotes: 1,
                downvotes: 0
            }
        );

        ledger.downvote(&voter, target).await.unwrap();
        assert_eq!(
            ledger.vote_counts(target).await.unwrap(),
            VoteCounts {
                upvotes: 0,
                downvotes: 1
            }
        );
    }

    #[tokio::test]
    async fn test_list_voters_in_order() {
        let ledger = MemoryLedger::new();
        let target = KeyMaterial::generate();
        let a = KeyMaterial::generate();
        let b = KeyMaterial::generate();
        let c = KeyMaterial::generate();

        ledger.upvote(&a, target.identity()).await.unwrap();
        ledger.upvote(&b, target.identity()).await.unwrap();
        ledger.downvote(&c, target.identity()).await.unwrap();

        let list = list_voters(&ledger, target.identity()).await.unwrap();
        assert_eq!(
            list.upvoters,
            vec![a.identity().clone(), b.identity().clone()]
        );
        assert_eq!(list.downvoters, vec![c.identity().clone()]);

        let err = ledger
            .voter(target.identity(), VoteKind::Down, 1)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::IndexOutOfRange { index: 1, len: 1 });
    }

    #[tokio::test]
    async fn test_offline_propagates() {
        let ledger = MemoryLedger::new();
        let key = KeyMaterial::generate();
        ledger.set_offline(true);
        let err = ledger.publish(&key).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(ledger.block_height().await.unwrap_err(), err);

        ledger.set_offline(false);
        assert_eq!(ledger.block_height().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deadline_expires_before_confirmation() {
        let ledger = MemoryLedger::new().with_confirmation_delay(Duration::from_millis(500));
        let key = KeyMaterial::generate();

        let err = with_deadline(Duration::from_millis(20), ledger.publish(&key))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Timeout { after_ms: 20 });
        assert_eq!(ledger.published_at(key.identity()).await.unwrap(), 0);

        let ok = with_deadline(Duration::from_secs(5), ledger.publish(&key)).await;
        assert!(ok.is_ok());
    }
}
