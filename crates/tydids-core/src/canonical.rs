//! Canonical JSON and URI-component transport encoding.
//!
//! Every signature over a structured record is taken over
//! `encode_component(jcs(value))`. JCS (RFC 8785) fixes key order and number
//! formatting, so a counterparty re-encoding a decoded object reproduces the
//! signed bytes exactly.
//!
//! The component encoding leaves `A-Z a-z 0-9 - _ . ! ~ * ' ( )` untouched
//! and percent-encodes every other UTF-8 byte, matching what browsers
//! produce for `encodeURIComponent`.

use anyhow::{bail, Context, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::{Map, Value};

const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Serialize to JCS canonical JSON.
///
/// ```
/// use tydids_core::canonical;
/// use serde_json::json;
///
/// let s = canonical::to_canonical_string(&json!({"z": 1, "a": 0.42})).unwrap();
/// assert_eq!(s, r#"{"a":0.42,"z":1}"#);
/// ```
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String> {
    serde_jcs::to_string(value).context("failed to serialize canonical json string")
}

pub fn encode_component(text: &str) -> String {
    utf8_percent_encode(text, COMPONENT).to_string()
}

pub fn decode_component(text: &str) -> Result<String> {
    let decoded = percent_decode_str(text)
        .decode_utf8()
        .context("percent-decoded data is not valid UTF-8")?;
    Ok(decoded.into_owned())
}

/// Canonicalize and component-encode in one step. This is the signed form.
pub fn encode_canonical<T: Serialize>(value: &T) -> Result<String> {
    Ok(encode_component(&to_canonical_string(value)?))
}

/// Parse `text` as JSON, unwrapping string layers until an object appears.
///
/// Bundles travel through systems that stringify them again; each extra
/// layer costs one parse. At most `max_depth` parses are performed.
pub fn parse_until_object(text: &str, max_depth: usize) -> Result<Map<String, Value>> {
    let mut current = Value::String(text.to_string());
    for _ in 0..max_depth {
        match current {
            Value::Object(map) => return Ok(map),
            Value::String(encoded) => {
                current = serde_json::from_str(&encoded).context("failed to parse encoded json")?;
            }
            other => bail!("expected a JSON object, found {}", kind(&other)),
        }
    }
    match current {
        Value::Object(map) => Ok(map),
        Value::String(_) => bail!("decode depth limit of {max_depth} exceeded"),
        other => bail!("expected a JSON object, found {}", kind(&other)),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_component_encoding_matches_browser_set() {
        assert_eq!(encode_component("a-b_c.d!e~f*g'h(i)j"), "a-b_c.d!e~f*g'h(i)j");
        assert_eq!(
            encode_component(r#"{"a":"b c"}"#),
            "%7B%22a%22%3A%22b%20c%22%7D"
        );
        assert_eq!(encode_component("ü"), "%C3%BC");
    }

    #[test]
    fn test_component_decode_reverses_encode() {
        let text = r#"{"key_1":"Grüße & co/?","n":0.42}"#;
        assert_eq!(decode_component(&encode_component(text)).unwrap(), text);
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        assert!(decode_component("%FF%FE").is_err());
    }

    #[test]
    fn test_canonical_sorts_keys() {
        let s = to_canonical_string(&json!({"value_1": "b", "key_1": "a", "iat": 1})).unwrap();
        assert_eq!(s, r#"{"iat":1,"key_1":"a","value_1":"b"}"#);
    }

    #[test]
    fn test_parse_until_object_plain_and_wrapped() {
        let inner = r#"{"a":1}"#;
        assert_eq!(parse_until_object(inner, 5).unwrap()["a"], json!(1));

        let twice = serde_json::to_string(inner).unwrap();
        assert_eq!(parse_until_object(&twice, 5).unwrap()["a"], json!(1));
    }

    #[test]
    fn test_parse_until_object_depth_cap() {
        let mut wrapped = r#"{"a":1}"#.to_string();
        for _ in 0..5 {
            wrapped = serde_json::to_string(&wrapped).unwrap();
        }
        // Six parses needed; cap of 5 refuses.
        let err = parse_until_object(&wrapped, 5).unwrap_err();
        assert!(err.to_string().contains("depth limit"));
        assert!(parse_until_object(&wrapped, 6).is_ok());
    }

    #[test]
    fn test_parse_until_object_rejects_non_objects() {
        assert!(parse_until_object("[1,2]", 5).is_err());
        assert!(parse_until_object("42", 5).is_err());
        assert!(parse_until_object("not json", 5).is_err());
    }
}
