//! Co-signed validation records across a transport boundary.

use std::sync::Arc;

use serde_json::json;
use tydids_core::{
    KdfSettings, KeyMaterial, MemoryLedger, RecordError, Signer, TydidsConfig, ValidationRecord,
    VoteCounts,
};

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

fn issue(fields: serde_json::Value) -> (ValidationRecord, Arc<KeyMaterial>) {
    let account = Arc::new(KeyMaterial::generate());
    let mut record = ValidationRecord::with_config(fast_config());
    record.attach_signer(account.clone()).unwrap();
    record.set_validation_object(&fields).unwrap();
    record.sign_account_data().unwrap();
    (record, account)
}

#[test]
fn test_json_roundtrip_preserves_canonical_form() {
    let (record, account) = issue(json!({"key_1": "certificate", "value_1": "ISO 27001"}));
    let wire = record.to_json().unwrap();

    let opened = ValidationRecord::open_json(&wire).unwrap();
    assert_eq!(
        opened.get_validation_object_to_data().unwrap(),
        record.get_validation_object_to_data().unwrap()
    );
    assert_eq!(opened.account(), Some(account.identity()));
    assert_eq!(opened.to_json().unwrap(), wire);
    assert!(!opened.is_mutable());
    assert!(record.is_mutable());
}

#[test]
fn test_unicode_values_survive_transport() {
    let (record, _) = issue(json!({"key_1": "Straße", "value_1": "日本 & co / ?"}));
    let opened = ValidationRecord::open_json(&record.to_json().unwrap()).unwrap();
    assert_eq!(opened.validation_object().unwrap()["value_1"], "日本 & co / ?");
}

#[test]
fn test_tampered_validation_data_is_rejected() {
    let (record, _) = issue(json!({"key_1": "grade", "value_1": "B"}));
    let mut fields = record.get_fields().unwrap();
    fields.validation_data = fields.validation_data.replace("%22B%22", "%22A%22");

    let err = ValidationRecord::open_bundle(&fields).unwrap_err();
    assert!(err.is_signature_mismatch(), "{err}");
}

#[test]
fn test_account_signature_over_other_validation_is_rejected() {
    let (a, account) = issue(json!({"key_1": "a"}));
    let (b, _) = issue(json!({"key_1": "b"}));
    let fa = a.get_fields().unwrap();
    let fb = b.get_fields().unwrap();

    // Same account holder, but accountData references a different validation.
    let resigned = account.sign_message(&fb.account_data).unwrap();
    let err = ValidationRecord::open_fields(
        &fa.validation_data,
        &fa.validation_signature,
        &fb.account_data,
        &resigned,
    )
    .unwrap_err();
    assert!(err.is_signature_mismatch(), "{err}");
}

#[test]
fn test_custody_handover_between_processes() {
    let (record, _) = issue(json!({"key_1": "status", "value_1": "pending"}));
    let element = record.retrieve_secure_element("correct horse").unwrap();
    let wire = record.to_json().unwrap();
    drop(record);

    let mut restored = ValidationRecord::open_json(&wire).unwrap();
    restored.attach_secure_element(&element, "correct horse").unwrap();
    restored
        .set_validation_object(&json!({"key_1": "status", "value_1": "approved"}))
        .unwrap();
    assert!(!restored.is_signed());

    let other = ValidationRecord::with_config(fast_config());
    let foreign = other.retrieve_secure_element("pw").unwrap();
    let mut victim = ValidationRecord::open_json(&wire).unwrap();
    assert!(matches!(
        victim.attach_secure_element(&foreign, "pw"),
        Err(RecordError::KeyMismatch { .. })
    ));
}

#[tokio::test]
async fn test_publish_and_revoke_lifecycle() {
    let ledger = MemoryLedger::new();
    let (record, _) = issue(json!({"key_1": "x"}));
    let day_ago = u64::try_from(chrono::Utc::now().timestamp() - 86_400).unwrap();

    assert_eq!(record.is_published_at(&ledger).await.unwrap(), 0);
    record.publish(&ledger).await.unwrap();
    assert!(record.is_published_at(&ledger).await.unwrap() > day_ago);

    let opened = ValidationRecord::open_json(&record.to_json().unwrap()).unwrap();
    assert!(matches!(
        opened.revoke(&ledger).await,
        Err(RecordError::NotAuthority { .. })
    ));
    assert!(opened.is_published_at(&ledger).await.unwrap() > day_ago);

    record.revoke(&ledger).await.unwrap();
    assert!(opened.is_revoked_at(&ledger).await.unwrap() > day_ago);
}

#[tokio::test]
async fn test_votes_follow_one_vote_per_voter() {
    let ledger = MemoryLedger::new();
    let (record, _) = issue(json!({"key_1": "x"}));
    let target = record.validation_id().clone();

    record.upvote(&ledger, &target).await.unwrap();
    record.upvote(&ledger, &target).await.unwrap();
    assert_eq!(
        record.votes(&ledger).await.unwrap(),
        VoteCounts {
            upvotes: 1,
            downvotes: 0
        }
    );

    record.downvote(&ledger, &target).await.unwrap();
    assert_eq!(
        record.votes(&ledger).await.unwrap(),
        VoteCounts {
            upvotes: 0,
            downvotes: 1
        }
    );

    // A counterparty votes with its own (disposable) key.
    let opened = ValidationRecord::open_json(&record.to_json().unwrap()).unwrap();
    opened.upvote(&ledger, &target).await.unwrap();

    let list = opened.list_votes(&ledger).await.unwrap();
    assert_eq!(list.upvoters.len(), 1);
    assert_eq!(list.downvoters, vec![target.clone()]);
}
