//! # Cache Stores Module
//!
//! Backend implementations of the `CacheStore` capability. The pipeline only
//! ever sees `Arc<dyn CacheStore>`; which backend sits behind it is decided
//! once at startup by `connect`.

pub mod memory;
pub mod redis_store;

pub use memory::{InMemoryCache, InMemoryCacheConfig};
pub use redis_store::{RedisCache, RedisCacheConfig};

use super::{CacheError, CacheResult};
use crate::core::config::{CacheBackend, CacheConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Key-value backend holding serialized cache entries
///
/// Implementations must be safe for concurrent use by many in-flight requests.
/// A missing key is `Ok(None)`, never an error.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value from the cache
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store a value, replacing any previous one; `ttl` of `None` means no expiry
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Verify the backend is reachable
    async fn health_check(&self) -> CacheResult<bool>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Build and verify the backend selected by configuration
///
/// An unreachable backend is an error here: the proxy refuses to start rather
/// than run with a cache it could never use.
pub async fn connect(config: &CacheConfig) -> CacheResult<Arc<dyn CacheStore>> {
    let backend = config.backend_kind().map_err(|e| CacheError::Configuration {
        message: e.to_string(),
    })?;

    let store: Arc<dyn CacheStore> = match backend {
        CacheBackend::Memory => Arc::new(InMemoryCache::new(InMemoryCacheConfig {
            max_entries: config.max_entries,
        })),
        CacheBackend::Redis => {
            let url = config.redis_url().map_err(|e| CacheError::Configuration {
                message: e.to_string(),
            })?;
            Arc::new(
                RedisCache::new(RedisCacheConfig {
                    url,
                    key_prefix: config.key_prefix.clone(),
                })
                .await?,
            )
        }
    };

    if !store.health_check().await? {
        return Err(CacheError::Unavailable);
    }

    info!(backend = store.backend_name(), "Cache backend ready");
    Ok(store)
}
