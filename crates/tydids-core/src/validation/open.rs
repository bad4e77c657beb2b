//! Reconstruction and verification of transported validation bundles.

use serde_json::{Map, Value};

use super::wire::{
    is_injected, is_whitelisted, AccountData, ValidationBundle, FIELD_ACCOUNT, FIELD_ISSUED_AT,
    FIELD_VALIDATION_ID,
};
use super::{Sealed, ValidationRecord};
use crate::canonical;
use crate::config::TydidsConfig;
use crate::crypto::{recover_signer, Identity, KeyMaterial};
use crate::error::{RecordError, RecordResult, ValidationIssue};

impl ValidationRecord {
    /// Rebuild a record from its four transported fields.
    ///
    /// Both signatures are recovered before any embedded claim is trusted.
    /// The result is immutable and carries a disposable key.
    pub fn open_fields(
        validation_data: &str,
        validation_signature: &str,
        account_data: &str,
        account_signature: &str,
    ) -> RecordResult<Self> {
        Self::open_fields_with_config(
            validation_data,
            validation_signature,
            account_data,
            account_signature,
            TydidsConfig::default(),
        )
    }

    pub fn open_fields_with_config(
        validation_data: &str,
        validation_signature: &str,
        account_data: &str,
        account_signature: &str,
        config: TydidsConfig,
    ) -> RecordResult<Self> {
        let limits = config.limits;
        for (name, value) in [
            ("validationData", validation_data),
            ("validationSignature", validation_signature),
            ("accountData", account_data),
            ("accountSignature", account_signature),
        ] {
            if value.len() > limits.max_bundle_bytes {
                return Err(RecordError::Decode {
                    reason: format!("{name} exceeds {} bytes", limits.max_bundle_bytes),
                });
            }
        }
        if account_signature.is_empty() {
            return Err(RecordError::missing("accountSignature"));
        }

        let account_consensus = recover_signer(account_data, account_signature)?;

        let decoded = canonical::decode_component(validation_data).map_err(RecordError::decode)?;
        let object = canonical::parse_until_object(&decoded, limits.max_decode_depth)
            .map_err(RecordError::decode)?;
        let reencoded = canonical::encode_canonical(&object).map_err(RecordError::decode)?;
        let validation_consensus = recover_signer(&reencoded, validation_signature)?;

        for field in [FIELD_VALIDATION_ID, FIELD_ISSUED_AT, FIELD_ACCOUNT] {
            if !object.contains_key(field) {
                tracing::warn!(field, "validation object incomplete");
                return Err(RecordError::missing(field));
            }
        }
        if let Some(field) = object
            .keys()
            .find(|key| !is_whitelisted(key) && !is_injected(key))
        {
            return Err(ValidationIssue::UnexpectedField {
                field: field.clone(),
            }
            .into());
        }
        if object.get(FIELD_ISSUED_AT).and_then(Value::as_u64).is_none() {
            return Err(ValidationIssue::InvalidField {
                field: FIELD_ISSUED_AT.to_string(),
                reason: "expected unix seconds".to_string(),
            }
            .into());
        }

        let validation_id = claimed_identity(&object, FIELD_VALIDATION_ID, &validation_consensus)?;
        let account = claimed_identity(&object, FIELD_ACCOUNT, &account_consensus)?;
        ensure_signed_by(FIELD_VALIDATION_ID, &validation_id, &validation_consensus)?;
        ensure_signed_by(FIELD_ACCOUNT, &account, &account_consensus)?;

        let account_text = canonical::decode_component(account_data).map_err(RecordError::decode)?;
        let account_map = canonical::parse_until_object(&account_text, limits.max_decode_depth)
            .map_err(RecordError::decode)?;
        let parsed_account: AccountData = serde_json::from_value(Value::Object(account_map))
            .map_err(|e| RecordError::Decode {
                reason: format!("accountData: {e}"),
            })?;
        ensure_references(&parsed_account, validation_signature, &validation_id, &account)?;

        tracing::info!(
            validation_id = %validation_id,
            account = %account,
            "validation bundle verified"
        );

        Ok(Self {
            authority: KeyMaterial::generate(),
            owns_authority: false,
            validation_id,
            signer: None,
            account: Some(account),
            sealed: Some(Sealed {
                object,
                validation_data: reencoded,
                validation_signature: validation_signature.to_string(),
                account_data: parsed_account,
                account_text: account_data.to_string(),
            }),
            account_signature: Some(account_signature.to_string()),
            is_mutable: false,
            is_signed: false,
            config,
        })
    }

    /// Rebuild a record from a serialized [`ValidationBundle`].
    ///
    /// Accepts bundles that were JSON-encoded more than once.
    pub fn open_json(json: &str) -> RecordResult<Self> {
        Self::open_json_with_config(json, TydidsConfig::default())
    }

    pub fn open_json_with_config(json: &str, config: TydidsConfig) -> RecordResult<Self> {
        // Four capped fields plus framing.
        let cap = config.limits.max_bundle_bytes.saturating_mul(4);
        if json.len() > cap {
            return Err(RecordError::Decode {
                reason: format!("bundle exceeds {cap} bytes"),
            });
        }
        let map = canonical::parse_until_object(json, config.limits.max_decode_depth)
            .map_err(RecordError::decode)?;
        let bundle: ValidationBundle =
            serde_json::from_value(Value::Object(map)).map_err(|e| RecordError::Decode {
                reason: format!("validation bundle: {e}"),
            })?;
        Self::open_bundle_with_config(&bundle, config)
    }

    pub fn open_bundle(bundle: &ValidationBundle) -> RecordResult<Self> {
        Self::open_bundle_with_config(bundle, TydidsConfig::default())
    }

    pub fn open_bundle_with_config(
        bundle: &ValidationBundle,
        config: TydidsConfig,
    ) -> RecordResult<Self> {
        Self::open_fields_with_config(
            &bundle.validation_data,
            &bundle.validation_signature,
            &bundle.account_data,
            &bundle.account_signature,
            config,
        )
    }
}

/// Read an identity claim; an unparseable claim can never match its signer.
fn claimed_identity(
    object: &Map<String, Value>,
    field: &str,
    recovered: &Identity,
) -> RecordResult<Identity> {
    let raw = object
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationIssue::InvalidField {
            field: field.to_string(),
            reason: "expected an address string".to_string(),
        })?;
    Identity::parse(raw).map_err(|_| {
        tracing::warn!(field, claimed = raw, recovered = %recovered, "unparseable identity claim");
        RecordError::SignatureMismatch {
            field: field.to_string(),
            claimed: raw.to_string(),
            recovered: recovered.to_string(),
        }
    })
}

fn ensure_signed_by(field: &str, claimed: &Identity, recovered: &Identity) -> RecordResult<()> {
    if claimed == recovered {
        return Ok(());
    }
    tracing::warn!(field, claimed = %claimed, recovered = %recovered, "signature does not match claim");
    Err(RecordError::SignatureMismatch {
        field: field.to_string(),
        claimed: claimed.to_string(),
        recovered: recovered.to_string(),
    })
}

/// The account holder must have signed a reference to this exact validation.
fn ensure_references(
    data: &AccountData,
    validation_signature: &str,
    validation_id: &Identity,
    account: &Identity,
) -> RecordResult<()> {
    let mismatch = |field: &str, claimed: &str, expected: &str| RecordError::SignatureMismatch {
        field: format!("accountData.{field}"),
        claimed: claimed.to_string(),
        recovered: expected.to_string(),
    };

    if !data
        .validation_signature
        .eq_ignore_ascii_case(validation_signature)
    {
        return Err(mismatch(
            "validationSignature",
            &data.validation_signature,
            validation_signature,
        ));
    }
    if Identity::parse(&data.validation_id).ok().as_ref() != Some(validation_id) {
        return Err(mismatch(
            "validationID",
            &data.validation_id,
            validation_id.as_str(),
        ));
    }
    if Identity::parse(&data.account).ok().as_ref() != Some(account) {
        return Err(mismatch("account", &data.account, account.as_str()));
    }
    Ok(())
}
