//! Self-sovereign identity restored from a consent disclosure.
//!
//! After [`ConsentRecord::reveal`](crate::consent::ConsentRecord::reveal) the
//! data subject holds the private key of the identity their consent was
//! signed with. Restoring it here lets them revoke that grant later.

use crate::consent::Disclosure;
use crate::crypto::{Identity, KeyMaterial, Signer};
use crate::error::{RecordError, RecordResult};
use crate::ledger::{Ledger, Receipt};

#[derive(Debug)]
pub struct SelfSovereignIdentity {
    key: KeyMaterial,
}

impl SelfSovereignIdentity {
    pub fn from_private_key(private_key: &str) -> RecordResult<Self> {
        Ok(Self {
            key: KeyMaterial::from_private_key(private_key)?,
        })
    }

    /// Restore from a disclosure, checking the key matches the disclosed identity.
    pub fn from_disclosure(disclosure: &Disclosure) -> RecordResult<Self> {
        let ssi = Self::from_private_key(&disclosure.private_key_material)?;
        if ssi.identity() != &disclosure.identity {
            return Err(RecordError::KeyMismatch {
                expected: disclosure.identity.clone(),
                actual: ssi.identity().clone(),
            });
        }
        Ok(ssi)
    }

    pub fn identity(&self) -> &Identity {
        self.key.identity()
    }

    pub fn signer(&self) -> &dyn Signer {
        &self.key
    }

    pub async fn publish(&self, ledger: &dyn Ledger) -> RecordResult<Receipt> {
        Ok(ledger.publish(&self.key).await?)
    }

    pub async fn revoke(&self, ledger: &dyn Ledger) -> RecordResult<Receipt> {
        let receipt = ledger.revoke(&self.key).await?;
        tracing::info!(identity = %self.identity(), block = receipt.block, "grant revoked by subject");
        Ok(receipt)
    }

    pub async fn is_published_at(&self, ledger: &dyn Ledger) -> RecordResult<u64> {
        Ok(ledger.published_at(self.identity()).await?)
    }

    pub async fn is_revoked_at(&self, ledger: &dyn Ledger) -> RecordResult<u64> {
        Ok(ledger.revoked_at(self.identity()).await?)
    }
}
