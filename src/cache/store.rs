//! Key/value storage behind the response cache.
//!
//! [`KvStore`] is the seam to an external store; [`MemoryKvStore`] is the
//! in-process implementation with LRU eviction and per-entry expiry.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_EVICT: &str = "lectern_cache_evict_total";

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv store unavailable: {0}")]
    Unavailable(String),
}

impl KvError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Writes `value`; the store drops it on its own once `ttl` has passed.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError>;

    async fn list(&self, prefix: &str) -> Result<Vec<String>, KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;
}

struct StoredValue {
    value: String,
    expires_at: Instant,
}

pub struct MemoryKvStore {
    entries: RwLock<LruCache<String, StoredValue>>,
}

impl MemoryKvStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.peek(key) {
            Some(stored) => stored.expires_at <= now,
            None => return Ok(None),
        };
        if expired {
            entries.pop(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|stored| stored.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError> {
        let stored = StoredValue {
            value,
            expires_at: Instant::now() + ttl,
        };
        let evicted = rw_write(&self.entries, SOURCE, "put").push(key.to_string(), stored);
        if matches!(evicted, Some((ref evicted_key, _)) if evicted_key != key) {
            counter!(METRIC_EVICT).increment(1);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "list");
        Ok(entries
            .iter()
            .filter(|(key, stored)| key.starts_with(prefix) && stored.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        rw_write(&self.entries, SOURCE, "delete").pop(key);
        Ok(())
    }
}
