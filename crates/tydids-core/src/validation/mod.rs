//! Two-party co-signed validation records.
//!
//! A validation authority signs a small structured object; an account
//! holder then signs a derivative object that references the authority's
//! signature. Either side can ship the result as a [`ValidationBundle`] and
//! a counterparty can reconstruct and verify it without any private key.
//!
//! # Signed material
//!
//! ```text
//! validationObject = {key_1?, value_1?, key_2?, value_2?, account, validationID, iat}
//! validationData   = encode(jcs(validationObject))      signed by validationID
//! accountData      = {validationSignature, validationID, account}
//! encode(jcs(accountData))                               signed by account
//! ```
//!
//! # States
//!
//! | State          | `is_mutable` | `is_signed` | Reached by                              |
//! |----------------|--------------|-------------|-----------------------------------------|
//! | Owned          | true         | false       | [`ValidationRecord::new`], any new object |
//! | Owned, signed  | true         | true        | [`ValidationRecord::sign_account_data`]   |
//! | Reconstructed  | false        | false       | [`ValidationRecord::open_fields`] / `open_json` |
//!
//! A reconstructed record becomes owned again only through
//! [`ValidationRecord::attach_secure_element`] with the authority's own key.

mod custody;
mod open;
pub mod wire;

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::attachment::AttachmentAnnouncer;
use crate::canonical;
use crate::config::TydidsConfig;
use crate::crypto::{Identity, KeyMaterial, Signer};
use crate::error::{RecordError, RecordResult, ValidationIssue};
use crate::ledger::{self, Ledger, Receipt, VoteCounts, VoterList};

pub use wire::{AccountData, ValidationBundle, UNBOUND_ACCOUNT, WHITELIST};
use wire::{is_whitelisted, FIELD_ACCOUNT, FIELD_ISSUED_AT, FIELD_VALIDATION_ID};

/// Cryptographic material derived from one validation object.
#[derive(Debug, Clone)]
struct Sealed {
    object: Map<String, Value>,
    validation_data: String,
    validation_signature: String,
    account_data: AccountData,
    /// The exact `accountData` text the account signature covers.
    account_text: String,
}

pub struct ValidationRecord {
    authority: KeyMaterial,
    /// False while `authority` is a disposable key of a reconstructed record.
    owns_authority: bool,
    validation_id: Identity,
    signer: Option<Arc<dyn Signer>>,
    account: Option<Identity>,
    sealed: Option<Sealed>,
    account_signature: Option<String>,
    is_mutable: bool,
    is_signed: bool,
    config: TydidsConfig,
}

impl fmt::Debug for ValidationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRecord")
            .field("validation_id", &self.validation_id)
            .field("account", &self.account)
            .field("owns_authority", &self.owns_authority)
            .field("has_signer", &self.signer.is_some())
            .field("validation_signature", &self.validation_signature())
            .field("account_signature", &self.account_signature)
            .field("is_mutable", &self.is_mutable)
            .field("is_signed", &self.is_signed)
            .finish()
    }
}

impl Default for ValidationRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationRecord {
    /// A fresh, mutable record with a newly minted validation authority.
    pub fn new() -> Self {
        Self::with_config(TydidsConfig::default())
    }

    pub fn with_config(config: TydidsConfig) -> Self {
        let authority = KeyMaterial::generate();
        let validation_id = authority.identity().clone();
        tracing::debug!(validation_id = %validation_id, "minted validation authority");
        Self {
            authority,
            owns_authority: true,
            validation_id,
            signer: None,
            account: None,
            sealed: None,
            account_signature: None,
            is_mutable: true,
            is_signed: false,
            config,
        }
    }

    pub fn validation_id(&self) -> &Identity {
        &self.validation_id
    }

    pub fn account(&self) -> Option<&Identity> {
        self.account.as_ref()
    }

    /// The `account` value embedded in validation objects.
    pub fn account_claim(&self) -> String {
        self.account
            .as_ref()
            .map_or_else(|| UNBOUND_ACCOUNT.to_string(), Identity::to_string)
    }

    pub fn is_mutable(&self) -> bool {
        self.is_mutable
    }

    pub fn is_signed(&self) -> bool {
        self.is_signed
    }

    /// True if this record holds the key behind its `validation_id`.
    pub fn holds_validation_key(&self) -> bool {
        self.owns_authority
    }

    pub fn validation_object(&self) -> Option<&Map<String, Value>> {
        self.sealed.as_ref().map(|s| &s.object)
    }

    pub fn issued_at(&self) -> Option<u64> {
        self.validation_object()
            .and_then(|o| o.get(FIELD_ISSUED_AT))
            .and_then(Value::as_u64)
    }

    pub fn validation_signature(&self) -> Option<&str> {
        self.sealed.as_ref().map(|s| s.validation_signature.as_str())
    }

    pub fn account_data(&self) -> Option<&AccountData> {
        self.sealed.as_ref().map(|s| &s.account_data)
    }

    pub fn account_signature(&self) -> Option<&str> {
        self.account_signature.as_deref()
    }

    /// Replace the validation object and all signatures derived from it.
    ///
    /// Keys outside [`WHITELIST`] are dropped; `account`, `validationID` and
    /// `iat` are injected. Any account signature is discarded.
    pub fn set_validation_object(&mut self, fields: &Value) -> RecordResult<()> {
        if !self.is_mutable {
            return Err(RecordError::immutable("set validation object"));
        }
        let fields = fields.as_object().ok_or(ValidationIssue::NotAnObject)?;

        let mut object = Map::new();
        for (key, value) in fields {
            if is_whitelisted(key) {
                object.insert(key.clone(), value.clone());
            }
        }
        let dropped = fields.len() - object.len();
        if dropped > 0 {
            tracing::debug!(dropped, "ignored non-whitelisted validation fields");
        }

        let sealed = self.seal(object)?;
        self.commit_sealed(sealed);
        Ok(())
    }

    /// Inject claims into `object`, sign it and derive the account data.
    fn seal(&self, mut object: Map<String, Value>) -> RecordResult<Sealed> {
        let account = self.account_claim();
        object.insert(FIELD_ACCOUNT.to_string(), Value::String(account.clone()));
        object.insert(
            FIELD_VALIDATION_ID.to_string(),
            Value::String(self.validation_id.to_string()),
        );
        object.insert(FIELD_ISSUED_AT.to_string(), json!(unix_now()));

        // Keep the object as a counterparty will decode it: JCS normalizes
        // numbers, so the signed values may differ from the caller's.
        let canonical_text =
            canonical::to_canonical_string(&object).map_err(RecordError::decode)?;
        let object: Map<String, Value> =
            serde_json::from_str(&canonical_text).map_err(|e| RecordError::Decode {
                reason: format!("canonical validation object: {e}"),
            })?;
        let validation_data = canonical::encode_component(&canonical_text);
        let validation_signature = self.authority.sign_message(&validation_data)?;
        let account_data = AccountData {
            validation_signature: validation_signature.clone(),
            validation_id: self.validation_id.to_string(),
            account,
        };
        let account_text =
            canonical::encode_canonical(&account_data).map_err(RecordError::decode)?;
        Ok(Sealed {
            object,
            validation_data,
            validation_signature,
            account_data,
            account_text,
        })
    }

    fn commit_sealed(&mut self, sealed: Sealed) {
        tracing::debug!(
            validation_id = %self.validation_id,
            account = %sealed.account_data.account,
            "validation object sealed"
        );
        self.sealed = Some(sealed);
        self.account_signature = None;
        self.is_signed = false;
    }

    /// Bind the account holder that will co-sign this record.
    ///
    /// An already-set object is re-sealed so its `account` claim names the
    /// new signer.
    pub fn attach_signer(&mut self, signer: Arc<dyn Signer>) -> RecordResult<()> {
        if !self.is_mutable {
            return Err(RecordError::immutable("attach signer"));
        }
        let previous = self.account.replace(signer.identity().clone());
        let resealed = match &self.sealed {
            Some(current) => {
                let mut fields = current.object.clone();
                fields.retain(|key, _| is_whitelisted(key));
                match self.seal(fields) {
                    Ok(sealed) => Some(sealed),
                    Err(err) => {
                        self.account = previous;
                        return Err(err);
                    }
                }
            }
            None => None,
        };

        tracing::info!(
            validation_id = %self.validation_id,
            account = %signer.identity(),
            "account signer attached"
        );
        self.signer = Some(signer);
        if let Some(sealed) = resealed {
            self.commit_sealed(sealed);
        }
        Ok(())
    }

    /// Co-sign the account data with the attached signer.
    pub fn sign_account_data(&mut self) -> RecordResult<String> {
        if !self.is_mutable {
            return Err(RecordError::immutable("sign account data"));
        }
        let signer = self.signer.as_ref().ok_or(ValidationIssue::NoSigner)?;
        let sealed = self
            .sealed
            .as_ref()
            .ok_or(ValidationIssue::NoValidationObject)?;

        let signature = signer.sign_message(&sealed.account_text)?;

        self.account_signature = Some(signature.clone());
        self.is_signed = true;
        tracing::info!(
            validation_id = %self.validation_id,
            account = %signer.identity(),
            "account data signed"
        );
        Ok(signature)
    }

    /// The component-encoded canonical validation object.
    pub fn get_validation_object_to_data(&self) -> RecordResult<String> {
        self.sealed
            .as_ref()
            .map(|s| s.validation_data.clone())
            .ok_or_else(|| ValidationIssue::NoValidationObject.into())
    }

    pub fn get_fields(&self) -> RecordResult<ValidationBundle> {
        let sealed = self
            .sealed
            .as_ref()
            .ok_or(ValidationIssue::NoValidationObject)?;
        Ok(ValidationBundle {
            validation_data: sealed.validation_data.clone(),
            validation_signature: sealed.validation_signature.clone(),
            account_data: sealed.account_text.clone(),
            account_signature: self.account_signature.clone().unwrap_or_default(),
        })
    }

    pub fn to_json(&self) -> RecordResult<String> {
        let bundle = self.get_fields()?;
        serde_json::to_string(&bundle).map_err(|e| RecordError::Decode {
            reason: e.to_string(),
        })
    }

    /// Announce a document and vouch for it as `{Attachment: filename, Hash: hash}`.
    pub async fn add_attachment(
        &mut self,
        announcer: &dyn AttachmentAnnouncer,
        filename: &str,
        content: &[u8],
    ) -> RecordResult<String> {
        if !self.is_mutable {
            return Err(RecordError::immutable("add attachment"));
        }
        let hash = announcer.announce(filename, content).await?;
        self.set_validation_object(&json!({
            "key_1": "Attachment",
            "value_1": filename,
            "key_2": "Hash",
            "value_2": hash,
        }))?;
        Ok(hash)
    }

    fn require_authority(&self, operation: &str) -> RecordResult<()> {
        if self.owns_authority {
            Ok(())
        } else {
            Err(RecordError::NotAuthority {
                validation_id: self.validation_id.clone(),
                operation: operation.to_string(),
            })
        }
    }

    pub async fn publish(&self, ledger: &dyn Ledger) -> RecordResult<Receipt> {
        self.require_authority("publish")?;
        let receipt = ledger.publish(&self.authority).await?;
        tracing::info!(validation_id = %self.validation_id, block = receipt.block, "validation published");
        Ok(receipt)
    }

    pub async fn revoke(&self, ledger: &dyn Ledger) -> RecordResult<Receipt> {
        self.require_authority("revoke")?;
        let receipt = ledger.revoke(&self.authority).await?;
        tracing::info!(validation_id = %self.validation_id, block = receipt.block, "validation revoked");
        Ok(receipt)
    }

    pub async fn is_published_at(&self, ledger: &dyn Ledger) -> RecordResult<u64> {
        Ok(ledger.published_at(&self.validation_id).await?)
    }

    pub async fn is_revoked_at(&self, ledger: &dyn Ledger) -> RecordResult<u64> {
        Ok(ledger.revoked_at(&self.validation_id).await?)
    }

    /// Vote for `target`. The vote is cast by the key this record holds.
    pub async fn upvote(&self, ledger: &dyn Ledger, target: &Identity) -> RecordResult<Receipt> {
        Ok(ledger.upvote(&self.authority, target).await?)
    }

    pub async fn downvote(&self, ledger: &dyn Ledger, target: &Identity) -> RecordResult<Receipt> {
        Ok(ledger.downvote(&self.authority, target).await?)
    }

    /// Tally of votes cast for this record's `validation_id`.
    pub async fn votes(&self, ledger: &dyn Ledger) -> RecordResult<VoteCounts> {
        Ok(ledger.vote_counts(&self.validation_id).await?)
    }

    pub async fn list_votes(&self, ledger: &dyn Ledger) -> RecordResult<VoterList> {
        Ok(ledger::list_voters(ledger, &self.validation_id).await?)
    }
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::recover_signer;

    #[test]
    fn test_new_record_state() {
        let record = ValidationRecord::new();
        assert!(record.is_mutable());
        assert!(!record.is_signed());
        assert!(record.holds_validation_key());
        assert_eq!(record.account_claim(), UNBOUND_ACCOUNT);
        assert!(record.get_fields().is_err());
    }

    #[test]
    fn test_set_filters_and_injects() {
        let mut record = ValidationRecord::new();
        record
            .set_validation_object(&json!({"key_1": "a", "value_1": "b", "evil": 1}))
            .unwrap();

        let object = record.validation_object().unwrap();
        assert!(object.get("evil").is_none());
        assert_eq!(object["key_1"], "a");
        assert_eq!(object["account"], UNBOUND_ACCOUNT);
        assert_eq!(object["validationID"], record.validation_id().as_str());
        assert!(record.issued_at().unwrap() > 0);
    }

    #[test]
    fn test_validation_signature_recovers_to_validation_id() {
        let mut record = ValidationRecord::new();
        record
            .set_validation_object(&json!({"key_1": "k"}))
            .unwrap();
        let data = record.get_validation_object_to_data().unwrap();
        let signer = recover_signer(&data, record.validation_signature().unwrap()).unwrap();
        assert_eq!(&signer, record.validation_id());
    }

    #[test]
    fn test_set_rejects_non_object() {
        let mut record = ValidationRecord::new();
        let err = record.set_validation_object(&json!(["key_1"])).unwrap_err();
        assert!(matches!(
            err,
            RecordError::Validation(ValidationIssue::NotAnObject)
        ));
        assert!(record.validation_object().is_none());
    }

    #[test]
    fn test_resetting_changes_signatures() {
        let mut record = ValidationRecord::new();
        record
            .set_validation_object(&json!({"key_1": "a", "value_1": "b"}))
            .unwrap();
        let first_sig = record.validation_signature().unwrap().to_string();
        let first_data = record.account_data().unwrap().clone();

        record
            .set_validation_object(&json!({"key_1": "a", "value_1": "c"}))
            .unwrap();
        assert_ne!(record.validation_signature().unwrap(), first_sig);
        assert_ne!(record.account_data().unwrap(), &first_data);
        assert!(!record.is_signed());
    }

    #[test]
    fn test_sign_requires_signer_and_object() {
        let mut record = ValidationRecord::new();
        record.set_validation_object(&json!({})).unwrap();
        assert!(matches!(
            record.sign_account_data(),
            Err(RecordError::Validation(ValidationIssue::NoSigner))
        ));

        let mut empty = ValidationRecord::new();
        empty
            .attach_signer(Arc::new(KeyMaterial::generate()))
            .unwrap();
        assert!(matches!(
            empty.sign_account_data(),
            Err(RecordError::Validation(ValidationIssue::NoValidationObject))
        ));
    }

    #[test]
    fn test_attach_signer_reseals_account_claim() {
        let mut record = ValidationRecord::new();
        record
            .set_validation_object(&json!({"key_1": "a"}))
            .unwrap();
        let unbound_sig = record.validation_signature().unwrap().to_string();

        let account = Arc::new(KeyMaterial::generate());
        let account_id = account.identity().clone();
        record.attach_signer(account).unwrap();

        assert_eq!(record.account(), Some(&account_id));
        let object = record.validation_object().unwrap();
        assert_eq!(object["account"], account_id.as_str());
        assert_eq!(object["key_1"], "a");
        assert_ne!(record.validation_signature().unwrap(), unbound_sig);
        assert_eq!(record.account_data().unwrap().account, account_id.as_str());
    }

    #[test]
    fn test_sign_account_data() {
        let mut record = ValidationRecord::new();
        let account = Arc::new(KeyMaterial::generate());
        let account_id = account.identity().clone();
        record.attach_signer(account).unwrap();
        record
            .set_validation_object(&json!({"key_1": "a"}))
            .unwrap();

        let signature = record.sign_account_data().unwrap();
        assert!(record.is_signed());

        let fields = record.get_fields().unwrap();
        assert_eq!(fields.account_signature, signature);
        assert_eq!(
            recover_signer(&fields.account_data, &signature).unwrap(),
            account_id
        );

        record
            .set_validation_object(&json!({"key_1": "b"}))
            .unwrap();
        assert!(!record.is_signed());
        assert!(record.account_signature().is_none());
    }

    #[test]
    fn test_object_reports_signed_numbers() {
        let mut record = ValidationRecord::new();
        record.attach_signer(Arc::new(KeyMaterial::generate())).unwrap();
        record
            .set_validation_object(&json!({"value_1": 12345678901234567891u64, "key_1": 1.0}))
            .unwrap();
        record.sign_account_data().unwrap();

        let object = record.validation_object().unwrap();
        assert_eq!(object["key_1"], json!(1));
        assert_eq!(object["value_1"], json!(12345678901234567000u64));

        let opened = ValidationRecord::open_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(opened.validation_object(), record.validation_object());
    }

    #[tokio::test]
    async fn test_add_attachment() {
        let mut record = ValidationRecord::new();
        let hash = record
            .add_attachment(&crate::attachment::Sha256Announcer, "report.pdf", b"%PDF-1.7")
            .await
            .unwrap();
        let object = record.validation_object().unwrap();
        assert_eq!(object["key_1"], "Attachment");
        assert_eq!(object["value_1"], "report.pdf");
        assert_eq!(object["key_2"], "Hash");
        assert_eq!(object["value_2"], hash.as_str());
    }
}
