//! Wire shapes exchanged between validation authority and counterparty.

use serde::{Deserialize, Serialize};

/// Caller-settable keys of a validation object.
pub const WHITELIST: [&str; 4] = ["key_1", "value_1", "key_2", "value_2"];

pub const FIELD_ACCOUNT: &str = "account";
pub const FIELD_VALIDATION_ID: &str = "validationID";
pub const FIELD_ISSUED_AT: &str = "iat";

/// Account claim used until an account signer is attached.
pub const UNBOUND_ACCOUNT: &str = "0x0";

pub(crate) fn is_injected(key: &str) -> bool {
    matches!(key, FIELD_ACCOUNT | FIELD_VALIDATION_ID | FIELD_ISSUED_AT)
}

pub(crate) fn is_whitelisted(key: &str) -> bool {
    WHITELIST.contains(&key)
}

/// What the account holder signs: a reference to the authority's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    #[serde(rename = "validationSignature")]
    pub validation_signature: String,
    #[serde(rename = "validationID")]
    pub validation_id: String,
    pub account: String,
}

/// Transport form of a validation record.
///
/// `validation_data` and `account_data` are component-encoded canonical JSON;
/// both signatures are taken over exactly those strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationBundle {
    pub validation_data: String,
    pub validation_signature: String,
    pub account_data: String,
    #[serde(default)]
    pub account_signature: String,
}
