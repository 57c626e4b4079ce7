//! Response cache in front of the query router.
//!
//! Store failures never reach the caller: a failed read is a miss and a failed
//! write or delete is logged and skipped.

use std::sync::Arc;

use lectern_api_types::CacheClearRequest;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::keys::{CacheKey, etag, namespace_prefix, version_prefix};
use super::store::{KvError, KvStore};
use crate::application::query::ContentQuery;

const SOURCE: &str = "cache::manager";

const METRIC_HIT: &str = "lectern_cache_hit_total";
const METRIC_MISS: &str = "lectern_cache_miss_total";
const METRIC_BYPASS: &str = "lectern_cache_bypass_total";
const METRIC_STORE_ERROR: &str = "lectern_cache_store_error_total";
const METRIC_INVALIDATED: &str = "lectern_cache_invalidated_total";

/// Persisted form of a cached response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub data: Value,
    /// Write time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub etag: String,
    /// Full store key the entry was written under.
    pub query_hash: String,
    /// Canonical `method:params` string the key was derived from.
    pub query: String,
}

impl CacheEntry {
    pub fn age_seconds(&self, now_millis: i64) -> u64 {
        u64::try_from((now_millis - self.timestamp).max(0) / 1000).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Miss,
    /// The caller or the configuration disabled the cache for this query.
    Bypass,
}

pub fn now_millis() -> i64 {
    i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

pub struct CacheManager {
    store: Arc<dyn KvStore>,
    config: CacheConfig,
}

impl CacheManager {
    pub fn new(store: Arc<dyn KvStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn key(&self, query: &ContentQuery) -> CacheKey {
        CacheKey::for_query(&self.config.namespace, query)
    }

    pub fn is_bypassed(&self, query: &ContentQuery) -> bool {
        query.bypass_cache || !self.config.enabled
    }

    pub async fn get(&self, query: &ContentQuery) -> CacheLookup {
        self.get_at(query, now_millis()).await
    }

    pub async fn get_at(&self, query: &ContentQuery, now: i64) -> CacheLookup {
        if self.is_bypassed(query) {
            counter!(METRIC_BYPASS).increment(1);
            return CacheLookup::Bypass;
        }

        let key = self.key(query);
        let lookup = self.read(&key, now).await;
        match &lookup {
            CacheLookup::Hit(_) => counter!(METRIC_HIT).increment(1),
            _ => counter!(METRIC_MISS).increment(1),
        }
        lookup
    }

    async fn read(&self, key: &CacheKey, now: i64) -> CacheLookup {
        let raw = match self.store.get(&key.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheLookup::Miss,
            Err(err) => {
                store_failure("get", &key.key, &err);
                return CacheLookup::Miss;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    target = SOURCE,
                    cache_key = %key.key,
                    error = %err,
                    "discarding undecodable cache entry"
                );
                self.delete(&key.key).await;
                return CacheLookup::Miss;
            }
        };

        if entry.query_hash != key.key || entry.query != key.fingerprint {
            debug!(
                target = SOURCE,
                cache_key = %key.key,
                "cache entry belongs to a different query"
            );
            return CacheLookup::Miss;
        }

        if now - entry.timestamp > self.config.ttl_millis() {
            debug!(target = SOURCE, cache_key = %key.key, "cache entry expired");
            self.delete(&key.key).await;
            return CacheLookup::Miss;
        }

        CacheLookup::Hit(entry)
    }

    /// Builds the entry for `data` and stores it unless the query bypasses the cache.
    pub async fn set(&self, query: &ContentQuery, data: Value) -> CacheEntry {
        self.set_at(query, data, now_millis()).await
    }

    pub async fn set_at(&self, query: &ContentQuery, data: Value, now: i64) -> CacheEntry {
        let key = self.key(query);
        let payload = serde_json::to_string(&data).unwrap_or_default();
        let entry = CacheEntry {
            etag: etag(&payload),
            data,
            timestamp: now,
            query_hash: key.key,
            query: key.fingerprint,
        };

        if self.is_bypassed(query) {
            return entry;
        }

        match serde_json::to_string(&entry) {
            Ok(raw) => {
                if let Err(err) = self.store.put(&entry.query_hash, raw, self.config.ttl()).await {
                    store_failure("put", &entry.query_hash, &err);
                }
            }
            Err(err) => warn!(
                target = SOURCE,
                cache_key = %entry.query_hash,
                error = %err,
                "cache entry could not be encoded"
            ),
        }
        entry
    }

    /// Deletes every key under `prefix` and returns how many were removed.
    pub async fn invalidate(&self, prefix: &str) -> usize {
        let keys = match self.store.list(prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                store_failure("list", prefix, &err);
                return 0;
            }
        };

        let mut cleared = 0usize;
        for key in &keys {
            match self.store.delete(key).await {
                Ok(()) => cleared += 1,
                Err(err) => store_failure("delete", key, &err),
            }
        }

        counter!(METRIC_INVALIDATED).increment(cleared as u64);
        info!(target = SOURCE, prefix, cleared, "cache invalidated");
        cleared
    }

    /// Prefix selected by a clear request.
    ///
    /// A version clears `<ns>:v<version>:`. A pattern already starting with the
    /// namespace is used as given, otherwise it is appended to `<ns>:`. With
    /// neither the whole namespace is cleared.
    pub fn clear_prefix(&self, request: &CacheClearRequest) -> String {
        let namespace = &self.config.namespace;
        let non_blank = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        if let Some(version) = non_blank(&request.version_id) {
            return version_prefix(namespace, &version);
        }
        match non_blank(&request.pattern) {
            Some(pattern) if pattern.starts_with(&namespace_prefix(namespace)) => pattern,
            Some(pattern) => format!("{}{pattern}", namespace_prefix(namespace)),
            None => namespace_prefix(namespace),
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(err) = self.store.delete(key).await {
            store_failure("delete", key, &err);
        }
    }
}

fn store_failure(op: &'static str, key: &str, err: &KvError) {
    counter!(METRIC_STORE_ERROR, "op" => op).increment(1);
    warn!(
        target = SOURCE,
        op,
        cache_key = %key,
        error = %err,
        "cache store failure ignored"
    );
}
