//! Find result caching
//!
//! Normalized find responses are cached per backend, pattern and time
//! bucket. The cache is an external collaborator behind
//! [`MetadataCache`]; a missing or failing cache is never an error, it just
//! misses.
//!
//! Implementations:
//! - [`LocalMetadataCache`]: in-process TTL cache with capacity eviction
//! - [`RedisMetadataCache`]: shared across processes
//! - [`NoopMetadataCache`]: caching disabled

pub mod local;
pub mod redis;

pub use self::local::LocalMetadataCache;
pub use self::redis::RedisMetadataCache;

use crate::config::{CacheBackend, CacheConfig};
use crate::error::Result;
use crate::types::{NodeRecord, Query};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Key of a cached find response
///
/// `find:<backend>:<pattern>:<start bucket>:<end bucket>`, where a bucket
/// rounds the time down to a multiple of the cache duration and an absent
/// bound maps to the empty string. Queries whose bounds fall into the same
/// buckets share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataCacheKey(String);

impl MetadataCacheKey {
    /// Derive the key for `query` against `address`
    pub fn new(address: &str, query: &Query, granularity: Duration) -> Self {
        let granularity = granularity.as_secs().max(1) as i64;
        let bucket = |time: Option<i64>| {
            time.map(|t| (t - t.rem_euclid(granularity)).to_string())
                .unwrap_or_default()
        };

        MetadataCacheKey(format!(
            "find:{}:{}:{}:{}",
            address,
            query.pattern,
            bucket(query.start_time),
            bucket(query.end_time)
        ))
    }

    /// Key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetadataCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External TTL cache for find responses
#[async_trait]
pub trait MetadataCache: Send + Sync {
    /// Cached records, or `None` on a miss or cache failure
    async fn get(&self, key: &MetadataCacheKey) -> Option<Vec<NodeRecord>>;

    /// Store records for `ttl`; failures are logged and swallowed
    async fn set(&self, key: &MetadataCacheKey, records: &[NodeRecord], ttl: Duration);
}

/// Cache that never stores anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetadataCache;

#[async_trait]
impl MetadataCache for NoopMetadataCache {
    async fn get(&self, _key: &MetadataCacheKey) -> Option<Vec<NodeRecord>> {
        None
    }

    async fn set(&self, _key: &MetadataCacheKey, _records: &[NodeRecord], _ttl: Duration) {}
}

/// Build the cache selected by configuration
pub async fn build_metadata_cache(config: &CacheConfig) -> Result<Arc<dyn MetadataCache>> {
    let cache: Arc<dyn MetadataCache> = match config.backend {
        CacheBackend::Local => Arc::new(LocalMetadataCache::new(config.max_entries)),
        CacheBackend::Redis => Arc::new(
            RedisMetadataCache::connect(&config.redis_url, config.key_prefix.clone()).await?,
        ),
        CacheBackend::Disabled => Arc::new(NoopMetadataCache),
    };
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_buckets_times() {
        let granularity = Duration::from_secs(300);
        let a = MetadataCacheKey::new("h:80", &Query::new("a.*").with_range(1000, 2000), granularity);
        let b = MetadataCacheKey::new("h:80", &Query::new("a.*").with_range(1100, 2099), granularity);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "find:h:80:a.*:900:1800");
    }

    #[test]
    fn test_key_absent_times_are_empty() {
        let key = MetadataCacheKey::new("h:80", &Query::new("a.*"), Duration::from_secs(60));
        assert_eq!(key.as_str(), "find:h:80:a.*::");

        let start_only =
            MetadataCacheKey::new("h:80", &Query::new("a.*").with_start(125), Duration::from_secs(60));
        assert_eq!(start_only.as_str(), "find:h:80:a.*:120:");
    }

    #[test]
    fn test_key_differs_by_backend() {
        let query = Query::new("a.*").with_range(0, 10);
        let granularity = Duration::from_secs(60);
        assert_ne!(
            MetadataCacheKey::new("h1:80", &query, granularity),
            MetadataCacheKey::new("h2:80", &query, granularity)
        );
    }

    #[tokio::test]
    async fn test_noop_cache_always_misses() {
        let cache = NoopMetadataCache;
        let key = MetadataCacheKey::new("h", &Query::new("a"), Duration::from_secs(60));
        let records = vec![NodeRecord {
            path: "a".to_string(),
            is_leaf: true,
            intervals: vec![],
        }];
        cache.set(&key, &records, Duration::from_secs(60)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_build_disabled_cache() {
        let config = CacheConfig {
            backend: CacheBackend::Disabled,
            ..CacheConfig::default()
        };
        let cache = build_metadata_cache(&config).await.unwrap();
        let key = MetadataCacheKey::new("h", &Query::new("a"), Duration::from_secs(60));
        assert!(cache.get(&key).await.is_none());
    }
}
