//! # Upstream Module
//!
//! Access to the origin server, the source of truth behind the cache.

pub mod origin;

pub use origin::{OriginClient, OriginError, OriginFetcher, OriginResponse, StreamingResponse};
