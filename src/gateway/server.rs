//! # HTTP Server Module
//!
//! Binds the listener and routes every inbound request, whatever its path or
//! method, through the cache-aside pipeline. Request bodies are never read;
//! the origin always receives a GET.

use crate::caching::{CacheManager, CachePolicy, CacheStore, PathQueryKeyGenerator};
use crate::core::config::ProxyConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::gateway::pipeline::CacheAsidePipeline;
use crate::gateway::response::ResponseWriter;
use crate::upstream::OriginFetcher;
use axum::{
    extract::{Request, State},
    response::Response,
    routing::any,
    Router as AxumRouter,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use uuid::Uuid;

/// Shared server state
#[derive(Clone)]
pub struct ProxyState {
    pub pipeline: Arc<CacheAsidePipeline>,
    pub writer: Arc<ResponseWriter>,
}

impl ProxyState {
    pub fn new(pipeline: CacheAsidePipeline, writer: ResponseWriter) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            writer: Arc::new(writer),
        }
    }

    /// Wire the pipeline from configuration around an already connected store
    /// and origin fetcher
    pub fn from_config(
        config: &ProxyConfig,
        store: Arc<dyn CacheStore>,
        origin: Arc<dyn OriginFetcher>,
        started_at: DateTime<Utc>,
    ) -> ProxyResult<Self> {
        let cache = Arc::new(CacheManager::from_config(store, &config.cache));
        let keys = Arc::new(PathQueryKeyGenerator::new(config.cache.max_key_length));
        let policy = CachePolicy::new(config.cache.max_item_bytes);
        let pipeline = CacheAsidePipeline::new(cache, origin, keys, policy);
        let writer = ResponseWriter::from_config(&config.headers, started_at)?;

        Ok(Self::new(pipeline, writer))
    }
}

/// Cache-aside HTTP server
pub struct ProxyServer {
    bind_addr: SocketAddr,
    app: AxumRouter,
}

impl ProxyServer {
    pub fn new(state: ProxyState, bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            app: Self::router(state),
        }
    }

    /// Catch-all router; every path and method is proxied
    pub fn router(state: ProxyState) -> AxumRouter {
        AxumRouter::new()
            .route("/", any(handle_request))
            .route("/*path", any(handle_request))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(state)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn serve<F>(self, shutdown: F) -> ProxyResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| ProxyError::Io {
            message: format!("Failed to bind server to {}: {}", self.bind_addr, e),
        })?;

        info!("Proxy listening on {}", self.bind_addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

#[instrument(
    skip(state, request),
    fields(
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        uri = %request.uri(),
    )
)]
async fn handle_request(State(state): State<ProxyState>, request: Request) -> Response {
    let outcome = state.pipeline.handle(request.uri()).await;
    state.writer.write(outcome)
}
