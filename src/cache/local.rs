//! Local find result cache
//!
//! In-memory cache of normalized find responses for a single process.
//!
//! # Features
//!
//! - Per-entry TTL, checked on read
//! - Capacity eviction: expired entries first, then the oldest
//! - Thread-safe with RwLock
//!
//! # Example
//!
//! ```rust
//! use kuba_federation::cache::{LocalMetadataCache, MetadataCache, MetadataCacheKey};
//! use kuba_federation::types::Query;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let cache = LocalMetadataCache::new(1000);
//! let key = MetadataCacheKey::new("10.0.0.1:8080", &Query::new("a.*"), Duration::from_secs(300));
//!
//! cache.set(&key, &[], Duration::from_secs(300)).await;
//! assert_eq!(cache.get(&key).await, Some(vec![]));
//! # }
//! ```

use super::{MetadataCache, MetadataCacheKey};
use crate::types::NodeRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Cached entry with TTL tracking
#[derive(Clone, Debug)]
struct CachedRecords {
    records: Vec<NodeRecord>,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedRecords {
    fn new(records: Vec<NodeRecord>, ttl: Duration) -> Self {
        Self {
            records,
            cached_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// In-process TTL cache for find responses
pub struct LocalMetadataCache {
    entries: RwLock<HashMap<MetadataCacheKey, CachedRecords>>,
    max_entries: usize,
}

impl LocalMetadataCache {
    /// Create a cache holding at most `max_entries` responses
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Get current entry count (including expired)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if cache is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove all expired entries
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, v| !v.is_expired());
        before - entries.len()
    }

    /// Clear all entries from the cache
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl MetadataCache for LocalMetadataCache {
    async fn get(&self, key: &MetadataCacheKey) -> Option<Vec<NodeRecord>> {
        let entries = self.entries.read().await;
        entries.get(key).and_then(|cached| {
            if cached.is_expired() {
                None
            } else {
                Some(cached.records.clone())
            }
        })
    }

    async fn set(&self, key: &MetadataCacheKey, records: &[NodeRecord], ttl: Duration) {
        let mut entries = self.entries.write().await;

        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            entries.retain(|_, v| !v.is_expired());

            // Still full: drop the oldest entry
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, v)| v.cached_at)
                    .map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    entries.remove(&k);
                }
            }
        }

        entries.insert(key.clone(), CachedRecords::new(records.to_vec(), ttl));
    }
}
