//! # Gateway Module
//!
//! The request-facing side of the proxy: the cache-aside pipeline, the
//! response writer and the HTTP server that ties them to a listener.

pub mod pipeline;
pub mod response;
pub mod server;

pub use pipeline::{CacheAsidePipeline, PipelineOutcome, StoreDecision};
pub use response::{ClientCacheHeaders, ResponseWriter};
pub use server::{ProxyServer, ProxyState};
