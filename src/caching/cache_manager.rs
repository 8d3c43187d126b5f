//! # Cache Manager
//!
//! Wraps the configured `CacheStore` with the envelope wire format, a deadline
//! on every backend call and hit/miss accounting. Lookups never fail: every
//! outcome is reported as a `CacheLookup` variant so callers can tell an
//! absent key from a degraded backend while still treating both as a miss.

use super::{CacheError, CacheResult, CacheStore};
use crate::core::config::CacheConfig;
use crate::core::types::ResponseEnvelope;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Serialized form of a `ResponseEnvelope` inside the cache backend
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    pub fn encode(envelope: &ResponseEnvelope) -> CacheResult<Vec<u8>> {
        Ok(serde_json::to_vec(envelope)?)
    }

    /// Decode a stored entry; anything unreadable is `CacheError::Corrupt`
    pub fn decode(bytes: &[u8]) -> CacheResult<ResponseEnvelope> {
        let envelope: ResponseEnvelope =
            serde_json::from_slice(bytes).map_err(|e| CacheError::Corrupt {
                message: e.to_string(),
            })?;

        if !envelope.has_valid_status() {
            return Err(CacheError::Corrupt {
                message: format!("status code {} out of range", envelope.status_code()),
            });
        }

        Ok(envelope)
    }
}

/// Result of looking a key up in the cache
#[derive(Debug)]
pub enum CacheLookup {
    /// Entry found and decoded
    Hit(ResponseEnvelope),
    /// Key legitimately absent
    Miss,
    /// Entry found but not decodable
    Corrupt(CacheError),
    /// Backend failed or timed out
    BackendError(CacheError),
}

impl CacheLookup {
    /// Outcome label for logs and metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Hit(_) => "hit",
            Self::Miss => "miss",
            Self::Corrupt(_) => "corrupt",
            Self::BackendError(_) => "backend_error",
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub corrupt_entries: u64,
    pub backend_errors: u64,
    pub stores: u64,
    pub store_failures: u64,
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    corrupt_entries: AtomicU64,
    backend_errors: AtomicU64,
    stores: AtomicU64,
    store_failures: AtomicU64,
}

/// Envelope-level access to the cache backend
pub struct CacheManager {
    store: Arc<dyn CacheStore>,

    /// Backend expiry for new entries
    ttl: Option<Duration>,

    /// Deadline for each get/set
    operation_timeout: Duration,

    counters: CacheCounters,
}

impl CacheManager {
    /// Create a new cache manager
    pub fn new(store: Arc<dyn CacheStore>, ttl: Option<Duration>, operation_timeout: Duration) -> Self {
        Self {
            store,
            ttl,
            operation_timeout,
            counters: CacheCounters::default(),
        }
    }

    pub fn from_config(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self::new(store, config.ttl, config.operation_timeout)
    }

    /// Look a key up and decode the stored envelope
    pub async fn lookup(&self, key: &str) -> CacheLookup {
        let lookup = match timeout(self.operation_timeout, self.store.get(key)).await {
            Err(_) => CacheLookup::BackendError(CacheError::Timeout),
            Ok(Err(e)) => CacheLookup::BackendError(e),
            Ok(Ok(None)) => CacheLookup::Miss,
            Ok(Ok(Some(bytes))) => match EnvelopeCodec::decode(&bytes) {
                Ok(envelope) => CacheLookup::Hit(envelope),
                Err(e) => CacheLookup::Corrupt(e),
            },
        };

        let counter = match &lookup {
            CacheLookup::Hit(_) => &self.counters.hits,
            CacheLookup::Miss => &self.counters.misses,
            CacheLookup::Corrupt(_) => &self.counters.corrupt_entries,
            CacheLookup::BackendError(_) => &self.counters.backend_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        counter!("cache_proxy_cache_lookups_total", "outcome" => lookup.outcome()).increment(1);

        lookup
    }

    /// Write an already encoded entry under `key`
    pub async fn store(&self, key: &str, encoded: &[u8]) -> CacheResult<()> {
        let result = match timeout(self.operation_timeout, self.store.set(key, encoded, self.ttl)).await {
            Err(_) => Err(CacheError::Timeout),
            Ok(result) => result,
        };

        match &result {
            Ok(()) => {
                self.counters.stores.fetch_add(1, Ordering::Relaxed);
                counter!("cache_proxy_cache_stores_total", "outcome" => "stored").increment(1);
            }
            Err(_) => {
                self.counters.store_failures.fetch_add(1, Ordering::Relaxed);
                counter!("cache_proxy_cache_stores_total", "outcome" => "failed").increment(1);
            }
        }

        result
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            corrupt_entries: self.counters.corrupt_entries.load(Ordering::Relaxed),
            backend_errors: self.counters.backend_errors.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            store_failures: self.counters.store_failures.load(Ordering::Relaxed),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}
