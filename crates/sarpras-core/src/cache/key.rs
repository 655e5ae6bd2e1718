//! Cache key construction.
//!
//! List and detail reads key their cache entries by a prefix plus the query
//! parameters. Parameter order must never split a cache line, so parameters
//! are rendered as canonical JSON with object keys sorted recursively:
//! `{page:1, limit:10}` and `{limit:10, page:1}` produce the same key.

use serde_json::Value;

/// Builds a cache key from a prefix and optional parameters.
///
/// Without parameters the key is the prefix itself; otherwise the canonical
/// JSON of the parameters is appended after a `:` separator.
pub fn cache_key(prefix: &str, params: Option<&Value>) -> String {
    match params {
        None => prefix.to_string(),
        Some(value) => {
            let mut out = String::with_capacity(prefix.len() + 32);
            out.push_str(prefix);
            out.push(':');
            write_canonical(value, &mut out);
            out
        }
    }
}

/// Serializes a JSON value with object keys sorted recursively.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // serde_json handles string escaping
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefix_only() {
        assert_eq!(cache_key("barang:all", None), "barang:all");
    }

    #[test]
    fn test_key_order_is_irrelevant() {
        let a = json!({"page": 1, "limit": 10});
        let b = json!({"limit": 10, "page": 1});
        assert_eq!(cache_key("p", Some(&a)), cache_key("p", Some(&b)));
    }

    #[test]
    fn test_nested_objects_are_canonicalized() {
        let a = json!({"filter": {"status": "submitted", "room": "r1"}, "page": 2});
        let b = json!({"page": 2, "filter": {"room": "r1", "status": "submitted"}});
        assert_eq!(cache_key("q", Some(&a)), cache_key("q", Some(&b)));
    }

    #[test]
    fn test_array_elements_are_canonicalized() {
        let a = json!({"items": [{"b": 2, "a": 1}]});
        let b = json!({"items": [{"a": 1, "b": 2}]});
        assert_eq!(cache_key("q", Some(&a)), cache_key("q", Some(&b)));
    }

    #[test]
    fn test_different_params_differ() {
        let a = json!({"page": 1});
        let b = json!({"page": 2});
        assert_ne!(cache_key("p", Some(&a)), cache_key("p", Some(&b)));
    }

    #[test]
    fn test_string_values_are_escaped() {
        let params = json!({"q": "a\"b"});
        let key = cache_key("p", Some(&params));
        assert!(key.contains("a\\\"b"));
    }
}
