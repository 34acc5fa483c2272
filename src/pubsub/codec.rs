// src/pubsub/codec.rs

//! JSON wire format.
//!
//! Payloads are always JSON text. The literal `null` is special-cased on the
//! way in and maps straight to [`Value::Null`].

use serde::Serialize;
use serde_json::Value;

use crate::Result;

const NULL_PAYLOAD: &[u8] = b"null";

/// Encode a message as JSON text.
pub(crate) fn encode<T>(message: &T) -> Result<String>
where
    T: Serialize + ?Sized,
{
    Ok(serde_json::to_string(message)?)
}

/// Decode a raw payload.
pub(crate) fn decode(raw: &[u8]) -> serde_json::Result<Value> {
    if raw == NULL_PAYLOAD {
        return Ok(Value::Null);
    }
    serde_json::from_slice(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn encodes_compact_json() {
        let text = encode(&json!({"foo": "bar"})).unwrap();
        assert_eq!(text, r#"{"foo":"bar"}"#);
    }

    #[test]
    fn encode_rejects_non_string_keys() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], 1);
        assert!(encode(&map).is_err());
    }

    #[test]
    fn null_literal_decodes_to_null() {
        assert_eq!(decode(b"null").unwrap(), Value::Null);
    }

    #[test]
    fn decodes_objects_and_scalars() {
        assert_eq!(decode(br#"{"foo":"bar"}"#).unwrap(), json!({"foo": "bar"}));
        assert_eq!(decode(b"42").unwrap(), json!(42));
        assert_eq!(decode(br#""text""#).unwrap(), json!("text"));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(decode(b"{not json").is_err());
        assert!(decode(b"").is_err());
    }
}
