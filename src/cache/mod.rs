//! Response cache for resolved queries.
//!
//! Entries live in a [`KvStore`] under `<namespace>[:v<version>]:<hash>` and are
//! validated on read against the query that produced them and the configured TTL.
//!
//! ```toml
//! [cache]
//! enabled = true
//! namespace = "content"
//! ttl_seconds = 300
//! max_entries = 10000
//! ```

mod config;
mod keys;
mod lock;
mod manager;
mod store;

pub use config::CacheConfig;
pub use keys::{CacheKey, canonical_json, etag, namespace_prefix, rolling_hash, version_prefix};
pub use manager::{CacheEntry, CacheLookup, CacheManager, now_millis};
pub use store::{KvError, KvStore, MemoryKvStore};
