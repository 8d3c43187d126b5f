//! # Cache Proxy Library
//!
//! A cache-aside HTTP reverse proxy. Every inbound request is answered from a
//! shared cache when possible; otherwise it is fetched from a single origin
//! with a GET, and successful responses small enough for the backend are
//! stored for the next caller.
//!
//! ## Module layout
//! - `core`: configuration, error types and the cached response envelope
//! - `caching`: cache backends, key generation, envelope codec and store policy
//! - `upstream`: the origin client
//! - `gateway`: the cache-aside pipeline, response writer and HTTP server
//! - `observability`: logging setup
//!
//! Cache backend failures never fail a request; they degrade to an origin
//! fetch. Only origin failures reach the client, as 502 or 504.

/// Configuration, errors and shared data types
pub mod core;

/// Cache backends and everything needed to read and write entries
pub mod caching;

/// Origin fetching
pub mod upstream;

/// Request pipeline and HTTP server
pub mod gateway;

/// Logging setup
pub mod observability;

pub use caching::{CacheError, CacheManager, CacheStore};
pub use core::config::ProxyConfig;
pub use core::error::{ProxyError, ProxyResult};
pub use core::types::ResponseEnvelope;
pub use gateway::{CacheAsidePipeline, ProxyServer, ProxyState};
pub use upstream::{OriginClient, OriginFetcher};
