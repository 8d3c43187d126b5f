//! # Caching System Module
//!
//! Everything between the request pipeline and the cache backend:
//!
//! 1. **Stores**: the `CacheStore` capability (`get`/`set` over raw bytes) with an
//!    in-memory and a Redis implementation, chosen at startup.
//! 2. **Key generation**: deterministic keys from the request path and query.
//! 3. **Cache manager**: envelope encoding, per-operation deadlines and the
//!    tagged lookup outcome that keeps "absent" apart from "backend degraded".
//! 4. **Policy**: which origin responses may be stored.

pub mod cache_manager;
pub mod key_generator;
pub mod policy;
pub mod stores;

pub use cache_manager::{CacheLookup, CacheManager, CacheStats, EnvelopeCodec};
pub use key_generator::{KeyGenerator, PathQueryKeyGenerator};
pub use policy::{CachePolicy, Ineligible};
pub use stores::{CacheStore, InMemoryCache, InMemoryCacheConfig, RedisCache, RedisCacheConfig};

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt cache entry: {message}")]
    Corrupt { message: String },

    #[error("Cache configuration error: {message}")]
    Configuration { message: String },

    #[error("Cache operation timeout")]
    Timeout,

    #[error("Cache not available")]
    Unavailable,
}

impl CacheError {
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }
}
