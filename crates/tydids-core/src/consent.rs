//! Consent records: a payload bound to a one-shot ephemeral identity.
//!
//! A data subject grants consent over a payload (typically form fields).
//! The record signs the payload with a fresh identity; [`ConsentRecord::reveal`]
//! hands the subject that identity's private key exactly once and rotates
//! the record onto a new identity, so the disclosed key can never sign for
//! a second disclosure event.
//!
//! ```text
//! new(payload) ─► consensus() ─► {payload, signature, identity}
//!                      │
//!                 reveal() ─► Disclosure{privateKeyMaterial, identity, signature, payload}
//!                      └────► record now signs under a brand-new identity
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroize;

use crate::canonical;
use crate::crypto::{recover_signer, Identity, KeyMaterial, Signer};
use crate::error::{RecordError, RecordResult};
use crate::ledger::{Ledger, Receipt};

/// Payload text, classified once at construction.
///
/// The variant is informational for callers inspecting
/// [`ConsentRecord::payload`]. Signing, disclosure and the wire bundles only
/// ever use [`Payload::as_str`], so two payloads with the same text sign
/// identically whatever their variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Canonical JSON of a structured value.
    Structured(String),
    /// A number kept as its decimal string form.
    Numeric(String),
    Opaque(String),
}

impl Payload {
    pub fn from_value(value: &Value) -> RecordResult<Self> {
        Ok(match value {
            Value::Object(_) | Value::Array(_) | Value::Null => Self::Structured(
                canonical::to_canonical_string(value).map_err(RecordError::decode)?,
            ),
            Value::Number(n) => Self::Numeric(n.to_string()),
            Value::String(s) => Self::from_text(s),
            Value::Bool(b) => Self::Opaque(b.to_string()),
        })
    }

    pub fn from_text(text: &str) -> Self {
        let numeric = text.trim().parse::<f64>().is_ok_and(|v| !v.is_nan());
        if numeric {
            Self::Numeric(text.to_string())
        } else {
            Self::Opaque(text.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Structured(s) | Self::Numeric(s) | Self::Opaque(s) => s,
        }
    }
}

/// Output of [`ConsentRecord::consensus`]; also the consent wire bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consensus {
    pub payload: String,
    pub signature: String,
    pub identity: Identity,
}

impl Consensus {
    /// Check that `signature` over `payload` recovers to `identity`.
    pub fn verify(&self) -> RecordResult<()> {
        let recovered = recover_signer(&self.payload, &self.signature)?;
        if recovered != self.identity {
            tracing::warn!(
                claimed = %self.identity,
                recovered = %recovered,
                "consent signature does not match identity"
            );
            return Err(RecordError::SignatureMismatch {
                field: "payload".to_string(),
                claimed: self.identity.to_string(),
                recovered: recovered.to_string(),
            });
        }
        Ok(())
    }
}

/// One-time disclosure of a consent identity, including its private key.
///
/// The key text is wiped when the snapshot is dropped.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disclosure {
    #[serde(alias = "privateKey")]
    pub private_key_material: String,
    pub identity: Identity,
    pub signature: String,
    pub payload: String,
}

impl fmt::Debug for Disclosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disclosure")
            .field("private_key_material", &"[REDACTED]")
            .field("identity", &self.identity)
            .field("signature", &self.signature)
            .field("payload", &self.payload)
            .finish()
    }
}

impl Drop for Disclosure {
    fn drop(&mut self) {
        self.private_key_material.zeroize();
    }
}

#[derive(Debug)]
pub struct ConsentRecord {
    payload: Payload,
    key: KeyMaterial,
    signature: Option<String>,
}

impl ConsentRecord {
    /// Create a consent record over `payload` with a fresh identity.
    pub fn new(payload: &Value) -> RecordResult<Self> {
        Ok(Self::with_payload(Payload::from_value(payload)?))
    }

    pub fn from_text(payload: &str) -> Self {
        Self::with_payload(Payload::from_text(payload))
    }

    fn with_payload(payload: Payload) -> Self {
        let key = KeyMaterial::generate();
        tracing::debug!(identity = %key.identity(), "minted consent identity");
        Self {
            payload,
            key,
            signature: None,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn identity(&self) -> &Identity {
        self.key.identity()
    }

    /// Sign the payload if not yet signed and return the signed triple.
    ///
    /// Repeated calls return the identical triple without re-signing.
    pub fn consensus(&mut self) -> RecordResult<Consensus> {
        let signature = match &self.signature {
            Some(signature) => signature.clone(),
            None => {
                let signature = self.key.sign_message(self.payload.as_str())?;
                self.signature = Some(signature.clone());
                signature
            }
        };
        Ok(Consensus {
            payload: self.payload.as_str().to_string(),
            signature,
            identity: self.key.identity().clone(),
        })
    }

    /// Disclose the current identity once and rotate onto a fresh one.
    ///
    /// The returned snapshot holds the current private key. Afterwards the
    /// record is signed again under a new identity with the same payload.
    /// On error the record is unchanged.
    pub fn reveal(&mut self) -> RecordResult<Disclosure> {
        let current_signature = match &self.signature {
            Some(signature) => signature.clone(),
            None => self.key.sign_message(self.payload.as_str())?,
        };
        let next_key = KeyMaterial::generate();
        let next_signature = next_key.sign_message(self.payload.as_str())?;

        let disclosure = Disclosure {
            private_key_material: self.key.private_key_hex().to_string(),
            identity: self.key.identity().clone(),
            signature: current_signature,
            payload: self.payload.as_str().to_string(),
        };
        self.key = next_key;
        self.signature = Some(next_signature);

        tracing::info!(
            disclosed = %disclosure.identity,
            rotated_to = %self.key.identity(),
            "consent identity revealed and rotated"
        );
        Ok(disclosure)
    }

    pub async fn publish(&self, ledger: &dyn Ledger) -> RecordResult<Receipt> {
        let receipt = ledger.publish(&self.key).await?;
        tracing::info!(identity = %self.identity(), block = receipt.block, "consent published");
        Ok(receipt)
    }

    pub async fn revoke(&self, ledger: &dyn Ledger) -> RecordResult<Receipt> {
        let receipt = ledger.revoke(&self.key).await?;
        tracing::info!(identity = %self.identity(), block = receipt.block, "consent revoked");
        Ok(receipt)
    }

    pub async fn is_published_at(&self, ledger: &dyn Ledger) -> RecordResult<u64> {
        Ok(ledger.published_at(self.identity()).await?)
    }

    pub async fn is_revoked_at(&self, ledger: &dyn Ledger) -> RecordResult<u64> {
        Ok(ledger.revoked_at(self.identity()).await?)
    }
}
