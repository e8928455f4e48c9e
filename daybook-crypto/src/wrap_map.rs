//! Wrap map codec: the per-record key-id → wrapped-DEK association.
//!
//! Stored as a JSON object on each encrypted row. Only key presence and
//! absence carry meaning; iteration order does not.

use crate::error::{CryptoError, CryptoResult};
use std::collections::BTreeMap;

/// Mapping from key id to base64-encoded wrap blob.
pub type WrapMap = BTreeMap<String, String>;

/// Parses a wrap map from its persisted JSON form.
///
/// Non-object JSON (arrays, strings, numbers, garbage) is rejected. An empty
/// object parses to an empty map — whether that is an error is the caller's
/// decision.
pub fn parse(json: &str) -> CryptoResult<WrapMap> {
    serde_json::from_str::<WrapMap>(json)
        .map_err(|e| CryptoError::Decryption(format!("malformed wrap map: {e}")))
}

/// Serializes a wrap map back to JSON for persistence.
pub fn serialize(map: &WrapMap) -> CryptoResult<String> {
    serde_json::to_string(map)
        .map_err(|e| CryptoError::Encryption(format!("wrap map serialization: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object() {
        let map = parse(r#"{"k1":"abc","k2":"def"}"#).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("k1").unwrap(), "abc");
    }

    #[test]
    fn empty_object_is_valid_and_empty() {
        let map = parse("{}").unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn rejects_non_object_json() {
        assert!(parse("[1,2,3]").is_err());
        assert!(parse("\"k1\"").is_err());
        assert!(parse("42").is_err());
        assert!(parse("not-json").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn round_trip_preserves_mapping() {
        let map = parse(r#"{"b":"2","a":"1"}"#).unwrap();
        let json = serialize(&map).unwrap();
        let reparsed = parse(&json).unwrap();
        assert_eq!(map, reparsed);
    }
}
