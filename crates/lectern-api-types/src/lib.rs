//! Wire types shared between the Lectern edge service and its clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response header carrying the cache outcome (`HIT`, `MISS` or `BYPASS`).
pub const X_CACHE_STATUS: &str = "X-Cache-Status";
/// Response header carrying the age of a cached entry in seconds.
pub const X_CACHE_AGE: &str = "X-Cache-Age";
/// Response header carrying the per-request identifier.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Body of `POST /query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub method: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Envelope returned by every query, successful or not.
///
/// Errors are reported in the body with `data: null`; callers inspect `error`
/// rather than the HTTP status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
}

impl QueryResponse {
    pub fn success(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
            cached: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(message.into()),
            cached: None,
        }
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = Some(cached);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Body of `POST /cache/clear`. With neither field set the whole namespace is cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheClearRequest {
    #[serde(default)]
    pub version_id: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheClearResponse {
    pub cleared: usize,
    pub prefix: String,
}
