//! # In-Memory Cache Store
//!
//! Process-local cache for single-instance deployments and tests. Entries live
//! in a `DashMap`, whose sharded locks give every read and write the mutual
//! exclusion concurrent request handlers need. The map is bounded by entry
//! count; when full, expired entries go first, then the least recently used.

use super::CacheStore;
use crate::caching::CacheResult;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// In-memory cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

#[derive(Debug)]
struct StoredItem {
    value: Vec<u8>,
    expires_at: Option<Instant>,
    /// Logical access clock value, for LRU eviction
    last_access: AtomicU64,
}

impl StoredItem {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// In-memory cache implementation
pub struct InMemoryCache {
    config: InMemoryCacheConfig,
    entries: DashMap<String, StoredItem>,
    clock: AtomicU64,
    evictions: AtomicU64,
}

impl InMemoryCache {
    /// Create a new in-memory cache
    pub fn new(config: InMemoryCacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Number of stored entries, expired ones included until they are purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries removed to make room for new ones
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Make room for one new entry
    fn evict_if_needed(&self) {
        if self.entries.len() < self.config.max_entries {
            return;
        }

        let now = Instant::now();
        self.entries.retain(|_, item| !item.is_expired(now));
        if self.entries.len() < self.config.max_entries {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_access.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Evicted least recently used entry");
            }
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();

        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(item) if item.is_expired(now) => true,
            Some(item) => {
                item.last_access.store(self.tick(), Ordering::Relaxed);
                return Ok(Some(item.value.clone()));
            }
        };

        if expired {
            self.entries.remove_if(key, |_, item| item.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        if !self.entries.contains_key(key) {
            self.evict_if_needed();
        }

        let item = StoredItem {
            value: value.to_vec(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
            last_access: AtomicU64::new(self.tick()),
        };
        self.entries.insert(key.to_string(), item);
        Ok(())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
