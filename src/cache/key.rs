//! Cache key derivation
//!
//! Keys are the first 128 bits of SHA-256 over the operation name and the
//! canonical JSON of its parameters. Object keys are sorted recursively, so
//! two parameter maps that differ only in insertion order share a key.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::constants::cache::KEY_HEX_LEN;

/// Derive the cache key for `operation` called with `params`
pub fn make_key(operation: &str, params: &Value) -> String {
    let canonical = canonicalize(params).to_string();

    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .take(KEY_HEX_LEN / 2)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Rebuild `value` with every object's keys in sorted order
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_key_shape() {
        let key = make_key("web_search", &json!({"query": "crm tools"}));
        assert_eq!(key.len(), KEY_HEX_LEN);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_nested_order_independent() {
        let a = json!({"q": "x", "opts": {"gl": "us", "hl": "en"}, "n": 20});
        let b = json!({"n": 20, "opts": {"hl": "en", "gl": "us"}, "q": "x"});
        assert_eq!(make_key("web_search", &a), make_key("web_search", &b));
    }

    #[test]
    fn test_operation_and_values_distinguish() {
        let params = json!({"query": "crm"});
        assert_ne!(
            make_key("web_search", &params),
            make_key("google_trends", &params)
        );
        assert_ne!(
            make_key("web_search", &params),
            make_key("web_search", &json!({"query": "erp"}))
        );
    }

    #[test]
    fn test_array_order_is_significant() {
        assert_ne!(
            make_key("op", &json!({"ids": [1, 2]})),
            make_key("op", &json!({"ids": [2, 1]}))
        );
    }

    proptest! {
        #[test]
        fn prop_key_ignores_insertion_order(
            entries in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..12)
        ) {
            let forward: Map<String, Value> =
                entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let reverse: Map<String, Value> =
                entries.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();

            prop_assert_eq!(
                make_key("op", &Value::Object(forward)),
                make_key("op", &Value::Object(reverse))
            );
        }

        #[test]
        fn prop_key_is_deterministic(query in ".{0,64}", limit in 0u32..100) {
            let params = json!({"query": query, "limit": limit});
            prop_assert_eq!(make_key("reddit_search", &params), make_key("reddit_search", &params));
        }
    }
}
