//! A query as seen by the cache and the edge: method, params and cache controls.

use lectern_api_types::QueryRequest;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct ContentQuery {
    pub method: String,
    pub params: Map<String, Value>,
    /// Partitions cached entries by deployment.
    pub deployed_version_id: Option<String>,
    /// Skip both cache reads and cache writes.
    pub bypass_cache: bool,
}

impl ContentQuery {
    pub fn new(method: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            method: method.into(),
            params,
            deployed_version_id: None,
            bypass_cache: false,
        }
    }

    /// Blank version tags are treated as absent.
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.deployed_version_id = version
            .map(|version| version.trim().to_string())
            .filter(|version| !version.is_empty());
        self
    }

    pub fn bypassing_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }
}

impl From<QueryRequest> for ContentQuery {
    fn from(request: QueryRequest) -> Self {
        Self::new(request.method, request.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_version_is_absent() {
        let query = ContentQuery::new("getProject", Map::new()).with_version(Some("  ".into()));
        assert!(query.deployed_version_id.is_none());

        let query = ContentQuery::new("getProject", Map::new()).with_version(Some("v7".into()));
        assert_eq!(query.deployed_version_id.as_deref(), Some("v7"));
    }
}
