//! Canonical byte encodings used for signing and content hashing.
//!
//! Two distinct canonicalisations are used, matching the split in the
//! original router between envelope signing and manifest hashing:
//!
//! - [`to_signing_bytes`]: declaration-order JSON with null fields omitted,
//!   used to build the bytes an envelope's signature covers.
//! - [`canonical_sha256_json`]: sorted-key JSON with `(",", ":")` separators,
//!   used to derive a manifest's `sha256_hash` when one is not supplied.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Serialize `value` with its fields in declaration order (serde_json
/// already preserves struct field order) and nulls omitted by the type's
/// own `#[serde(skip_serializing_if = "Option::is_none")]` attributes.
pub fn to_signing_bytes<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(value)
}

/// Recursively sort a [`serde_json::Value`]'s object keys, producing the
/// canonical form used for content hashing.
fn sort_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<String, serde_json::Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_value).collect())
        }
        other => other.clone(),
    }
}

/// SHA-256 hex digest of `value` serialized with sorted keys and compact
/// separators, mirroring `_canonical_sha256_json` in the original router.
pub fn canonical_sha256_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let json = serde_json::to_value(value)?;
    let sorted = sort_value(&json);
    // serde_json's Value::Object is a BTreeMap (or IndexMap w/ preserve_order
    // feature, not enabled here), so `to_string` already emits sorted,
    // compact-separator output.
    let compact = serde_json::to_string(&sorted)?;
    let mut hasher = Sha256::new();
    hasher.update(compact.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Payload {
        b: i32,
        a: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        z: Option<i32>,
    }

    #[test]
    fn signing_bytes_preserve_declaration_order_and_omit_null() {
        let p = Payload { b: 1, a: 2, z: None };
        let bytes = to_signing_bytes(&p).unwrap();
        let s = String::from_utf8(bytes).unwrap();
        assert_eq!(s, r#"{"b":1,"a":2}"#);
    }

    #[test]
    fn canonical_hash_is_deterministic_regardless_of_key_order() {
        let v1 = serde_json::json!({"b": 1, "a": 2});
        let v2 = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(
            canonical_sha256_json(&v1).unwrap(),
            canonical_sha256_json(&v2).unwrap()
        );
    }
}
