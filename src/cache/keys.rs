//! Cache key derivation.
//!
//! A key is `<namespace>[:v<deployedVersionId>]:<hash>` where the hash is a
//! 32-bit rolling hash over `method:<canonical params>`. Canonical params are
//! JSON with object keys sorted at every depth, so key order in the request
//! never changes the key.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::application::query::ContentQuery;

/// Hex digits of the SHA-256 digest kept in an ETag.
const ETAG_HEX_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    /// Full store key.
    pub key: String,
    /// The pre-hash string; stored with the entry to rule out collisions.
    pub fingerprint: String,
}

impl CacheKey {
    pub fn for_query(namespace: &str, query: &ContentQuery) -> Self {
        let fingerprint = fingerprint(&query.method, &Value::Object(query.params.clone()));
        let hash = rolling_hash(&fingerprint);
        let key = match query.deployed_version_id.as_deref() {
            Some(version) => format!("{namespace}:v{version}:{hash:08x}"),
            None => format!("{namespace}:{hash:08x}"),
        };
        Self { key, fingerprint }
    }
}

/// Prefix shared by every key in `namespace`.
pub fn namespace_prefix(namespace: &str) -> String {
    format!("{namespace}:")
}

/// Prefix shared by every key written under deployed version `version`.
pub fn version_prefix(namespace: &str, version: &str) -> String {
    format!("{namespace}:v{version}:")
}

pub fn fingerprint(method: &str, params: &Value) -> String {
    format!("{method}:{}", canonical_json(params))
}

/// JSON text with object keys sorted recursively.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (index, (key, value)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(values) => {
            out.push('[');
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(value, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// `h = h * 31 + unit` over UTF-16 code units, wrapping at 32 bits.
pub fn rolling_hash(input: &str) -> u32 {
    input
        .encode_utf16()
        .fold(0u32, |hash, unit| hash.wrapping_mul(31).wrapping_add(u32::from(unit)))
}

/// Strong ETag over the serialized payload.
pub fn etag(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    let hex = hex::encode(hasher.finalize());
    format!("\"{}\"", &hex[..ETAG_HEX_LEN])
}
