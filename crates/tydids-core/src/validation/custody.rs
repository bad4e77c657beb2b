//! Secure element export and re-attachment for validation authorities.

use super::ValidationRecord;
use crate::crypto::Signer;
use crate::error::{RecordError, RecordResult};
use crate::keystore::SecureElement;

impl ValidationRecord {
    /// Export the validation key, sealed under `password`.
    pub fn retrieve_secure_element(&self, password: &str) -> RecordResult<String> {
        self.require_authority("export secure element")?;
        let element = SecureElement::seal(&self.authority, password, &self.config.keystore)?;
        tracing::info!(validation_id = %self.validation_id, "secure element exported");
        Ok(element.to_json()?)
    }

    /// Re-attach the validation key to this record.
    ///
    /// Succeeds only if the decrypted key derives this record's
    /// `validation_id`; on success the record becomes mutable again.
    pub fn attach_secure_element(&mut self, encrypted: &str, password: &str) -> RecordResult<()> {
        let key = SecureElement::from_json(encrypted)?.open(password)?;
        if key.identity() != &self.validation_id {
            tracing::warn!(
                expected = %self.validation_id,
                actual = %key.identity(),
                "secure element does not match validation"
            );
            return Err(RecordError::KeyMismatch {
                expected: self.validation_id.clone(),
                actual: key.identity().clone(),
            });
        }

        self.authority = key;
        self.owns_authority = true;
        self.is_mutable = true;
        tracing::info!(validation_id = %self.validation_id, "secure element attached");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KdfSettings, TydidsConfig};
    use crate::crypto::KeyMaterial;
    use serde_json::json;
    use std::sync::Arc;

    fn fast_config() -> TydidsConfig {
        TydidsConfig {
            keystore: KdfSettings {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            ..TydidsConfig::default()
        }
    }

    fn signed_record() -> ValidationRecord {
        let mut record = ValidationRecord::with_config(fast_config());
        record
            .attach_signer(Arc::new(KeyMaterial::generate()))
            .unwrap();
        record
            .set_validation_object(&json!({"key_1": "k", "value_1": "v"}))
            .unwrap();
        record.sign_account_data().unwrap();
        record
    }

    #[test]
    fn test_reattach_restores_mutability() {
        let record = signed_record();
        let element = record.retrieve_secure_element("pw").unwrap();

        let mut opened = ValidationRecord::open_json(&record.to_json().unwrap()).unwrap();
        assert!(!opened.is_mutable());
        assert!(matches!(
            opened.retrieve_secure_element("pw"),
            Err(RecordError::NotAuthority { .. })
        ));

        opened.attach_secure_element(&element, "pw").unwrap();
        assert!(opened.is_mutable());
        assert!(opened.holds_validation_key());

        opened
            .set_validation_object(&json!({"key_1": "k", "value_1": "w"}))
            .unwrap();
        assert_eq!(
            opened.validation_object().unwrap()["account"],
            record.account().unwrap().as_str()
        );
        let data = opened.get_validation_object_to_data().unwrap();
        let signer =
            crate::crypto::recover_signer(&data, opened.validation_signature().unwrap()).unwrap();
        assert_eq!(&signer, record.validation_id());
    }

    #[test]
    fn test_foreign_element_is_key_mismatch() {
        let record = signed_record();
        let other = ValidationRecord::with_config(fast_config());
        let foreign = other.retrieve_secure_element("pw").unwrap();

        let mut opened = ValidationRecord::open_json(&record.to_json().unwrap()).unwrap();
        let before = opened.get_fields().unwrap();
        let err = opened.attach_secure_element(&foreign, "pw").unwrap_err();
        assert!(matches!(err, RecordError::KeyMismatch { .. }));
        assert!(!opened.is_mutable());
        assert!(!opened.holds_validation_key());
        assert_eq!(opened.get_fields().unwrap(), before);
    }

    #[test]
    fn test_wrong_password_leaves_record_unchanged() {
        let record = signed_record();
        let element = record.retrieve_secure_element("pw").unwrap();
        let mut opened = ValidationRecord::open_json(&record.to_json().unwrap()).unwrap();
        let err = opened.attach_secure_element(&element, "nope").unwrap_err();
        assert!(matches!(err, RecordError::Keystore(_)));
        assert!(!opened.is_mutable());
    }

    #[test]
    fn test_identity_of_exported_element() {
        let record = ValidationRecord::with_config(fast_config());
        let element = record.retrieve_secure_element("pw").unwrap();
        let key = SecureElement::from_json(&element)
            .unwrap()
            .open("pw")
            .unwrap();
        assert_eq!(key.identity(), record.validation_id());
    }
}
