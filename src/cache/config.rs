//! Cache configuration.
//!
//! Controls the response cache in front of the query router.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_NAMESPACE: &str = "content";
const DEFAULT_TTL_SECONDS: u64 = 300;
const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every query is served as `BYPASS`.
    pub enabled: bool,
    /// Prefix of every cache key.
    pub namespace: String,
    /// Lifetime of an entry, enforced both on read and by the store.
    pub ttl_seconds: u64,
    /// Capacity of the in-process store.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            namespace: settings.namespace.clone(),
            ttl_seconds: u64::from(settings.ttl_seconds.get()),
            max_entries: settings.max_entries.get() as usize,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn ttl_millis(&self) -> i64 {
        i64::try_from(self.ttl_seconds.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.namespace, "content");
        assert_eq!(config.ttl_seconds, 300);
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.ttl_millis(), 300_000);
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let config = CacheConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert_eq!(config.max_entries_non_zero().get(), 1);
    }
}
