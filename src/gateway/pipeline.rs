//! # Cache-Aside Pipeline
//!
//! Per request: derive the key, look it up, and on anything but a usable hit
//! fetch from the origin, store the response if policy allows, and hand the
//! result to the response writer.
//!
//! ```text
//! LOOKUP ─ hit ──────────────────────────────────────────────▶ SERVE
//!    └─ miss / corrupt / backend error ─▶ FETCH
//!         ├─ failed ─────────────────────────────────────────▶ SERVE_FAILURE
//!         ├─ streamed (too large to buffer) ─────────────────▶ SERVE
//!         └─ complete ─▶ ELIGIBLE? ─ yes ─▶ STORE ───────────▶ SERVE
//!                                  └─ no ────────────────────▶ SERVE
//! ```
//!
//! Concurrent misses for the same key each fetch and store independently; the
//! last store wins.

use crate::caching::{
    CacheLookup, CacheManager, CachePolicy, EnvelopeCodec, Ineligible, KeyGenerator,
};
use crate::core::types::ResponseEnvelope;
use crate::upstream::{OriginError, OriginFetcher, OriginResponse, StreamingResponse};
use axum::http::Uri;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to a freshly fetched response with respect to the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreDecision {
    Stored,
    Ineligible(Ineligible),
    /// Encoding or backend write failed; the response is served regardless
    Failed,
}

/// Result of running one request through the pipeline
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Served from cache, origin not contacted
    Hit(ResponseEnvelope),
    /// Fetched from origin
    Miss {
        envelope: ResponseEnvelope,
        decision: StoreDecision,
    },
    /// Fetched from origin, body too large to buffer, passed through
    Streamed(StreamingResponse),
    /// Origin fetch failed and there is nothing to serve
    OriginFailed(OriginError),
}

/// Cache-aside orchestrator
pub struct CacheAsidePipeline {
    cache: Arc<CacheManager>,
    origin: Arc<dyn OriginFetcher>,
    keys: Arc<dyn KeyGenerator>,
    policy: CachePolicy,
}

impl CacheAsidePipeline {
    pub fn new(
        cache: Arc<CacheManager>,
        origin: Arc<dyn OriginFetcher>,
        keys: Arc<dyn KeyGenerator>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            cache,
            origin,
            keys,
            policy,
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Run one inbound request URI through lookup, fetch and store
    pub async fn handle(&self, uri: &Uri) -> PipelineOutcome {
        let key = self.keys.generate_key(uri);

        match self.cache.lookup(&key).await {
            CacheLookup::Hit(envelope) => {
                debug!(
                    key = %key,
                    status = envelope.status_code(),
                    bytes = envelope.body().len(),
                    "Serving from cache"
                );
                return PipelineOutcome::Hit(envelope);
            }
            CacheLookup::Miss => {
                debug!(key = %key, "Not found in cache");
            }
            CacheLookup::Corrupt(e) => {
                warn!(key = %key, error = %e, "Ignoring undecodable cache entry");
            }
            CacheLookup::BackendError(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed, falling back to origin");
            }
        }

        match self.origin.fetch(uri).await {
            Err(e) => {
                error!(key = %key, error = %e, "Origin fetch failed");
                counter!("cache_proxy_origin_failures_total").increment(1);
                PipelineOutcome::OriginFailed(e)
            }
            Ok(OriginResponse::Streaming(streaming)) => {
                let reason = self
                    .policy
                    .check_status(streaming.status_code)
                    .err()
                    .unwrap_or(Ineligible::Streamed {
                        limit: self.policy.buffer_limit(),
                    });
                log_ineligible(&key, streaming.status_code, &reason);
                PipelineOutcome::Streamed(streaming)
            }
            Ok(OriginResponse::Complete(envelope)) => {
                let decision = self.store_if_eligible(&key, &envelope).await;
                PipelineOutcome::Miss { envelope, decision }
            }
        }
    }

    async fn store_if_eligible(&self, key: &str, envelope: &ResponseEnvelope) -> StoreDecision {
        if let Err(reason) = self.policy.check_status(envelope.status_code()) {
            log_ineligible(key, envelope.status_code(), &reason);
            return StoreDecision::Ineligible(reason);
        }

        let encoded = match EnvelopeCodec::encode(envelope) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode response for cache");
                return StoreDecision::Failed;
            }
        };

        if let Err(reason) = self.policy.check_size(encoded.len()) {
            log_ineligible(key, envelope.status_code(), &reason);
            return StoreDecision::Ineligible(reason);
        }

        match self.cache.store(key, &encoded).await {
            Ok(()) => {
                info!(key = %key, bytes = encoded.len(), "Stored response in cache");
                StoreDecision::Stored
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to store response in cache");
                StoreDecision::Failed
            }
        }
    }
}

fn log_ineligible(key: &str, status: u16, reason: &Ineligible) {
    info!(
        key = %key,
        status,
        reason = reason.reason(),
        detail = %reason,
        "Response not cacheable"
    );
    counter!("cache_proxy_cache_ineligible_total", "reason" => reason.reason()).increment(1);
}
