//! Query-string handling shared by `/query` and the legacy `/content/{method}` path.

use serde_json::{Map, Value};

const VERSION_PARAM: &str = "deployedVersionId";
const NO_CACHE_PARAM: &str = "no-cache";

/// Cache controls carried in the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControls {
    pub deployed_version_id: Option<String>,
    pub no_cache: bool,
}

/// Splits cache controls from the remaining pairs.
pub fn split_controls(pairs: Vec<(String, String)>) -> (CacheControls, Vec<(String, String)>) {
    let mut controls = CacheControls::default();
    let mut rest = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        match key.as_str() {
            VERSION_PARAM => controls.deployed_version_id = Some(value),
            NO_CACHE_PARAM => controls.no_cache = flag(&value),
            _ => rest.push((key, value)),
        }
    }
    (controls, rest)
}

/// A bare `no-cache` or any value other than `false`/`0` enables the flag.
fn flag(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "false" | "0")
}

/// Builds resolver params from legacy query pairs.
///
/// JSON-parseable values are parsed, `key[]` pairs collect into an array and
/// everything else stays a string. A later plain `key` overwrites an earlier one.
pub fn coerce_params(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut params = Map::new();
    for (key, raw) in pairs {
        let value = coerce_value(&raw);
        match key.strip_suffix("[]") {
            Some(name) => {
                let slot = params
                    .entry(name.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                match slot {
                    Value::Array(values) => values.push(value),
                    other => *other = Value::Array(vec![other.take(), value]),
                }
            }
            None => {
                params.insert(key, value);
            }
        }
    }
    params
}

fn coerce_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn values_are_parsed_when_json() {
        let params = coerce_params(pairs(&[
            ("slug", "about"),
            ("limit", "10"),
            ("draft", "false"),
            ("filter", r#"{"a":1}"#),
        ]));
        assert_eq!(
            Value::Object(params),
            json!({ "slug": "about", "limit": 10, "draft": false, "filter": { "a": 1 } })
        );
    }

    #[test]
    fn bracket_keys_collect_into_arrays() {
        let params = coerce_params(pairs(&[("tag[]", "a"), ("tag[]", "b"), ("tag[]", "3")]));
        assert_eq!(params["tag"], json!(["a", "b", 3]));
    }

    #[test]
    fn controls_are_split_out() {
        let (controls, rest) = split_controls(pairs(&[
            ("deployedVersionId", "42"),
            ("no-cache", ""),
            ("slug", "home"),
        ]));
        assert_eq!(controls.deployed_version_id.as_deref(), Some("42"));
        assert!(controls.no_cache);
        assert_eq!(rest, pairs(&[("slug", "home")]));

        let (controls, _) = split_controls(pairs(&[("no-cache", "false")]));
        assert!(!controls.no_cache);
    }
}
