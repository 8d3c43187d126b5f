//! # Cache Proxy - Main Entry Point
//!
//! Startup sequence: load configuration, initialize logging, connect to the
//! cache backend (fatal if unreachable), build the origin client and serve
//! until SIGINT or SIGTERM.

use cache_proxy::caching::stores;
use cache_proxy::core::config::ProxyConfig;
use cache_proxy::gateway::{ProxyServer, ProxyState};
use cache_proxy::observability::init_logging;
use cache_proxy::upstream::OriginClient;
use cache_proxy::{ProxyError, ProxyResult};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ProxyConfig::load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);

    if let Err(e) = run(config).await {
        error!(error = %e, "Proxy failed");
        std::process::exit(1);
    }

    info!("Proxy shutdown complete");
}

async fn run(config: ProxyConfig) -> ProxyResult<()> {
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let store = stores::connect(&config.cache).await.map_err(|e| {
        error!(error = %e, "Cache backend unavailable");
        ProxyError::from(e)
    })?;

    let origin = Arc::new(OriginClient::new(&config.origin, config.cache.max_item_bytes)?);
    let origin_url = origin.base_url().to_string();

    let state = ProxyState::from_config(&config, store, origin, Utc::now())?;
    let backend = state.pipeline.cache().backend_name();
    let server = ProxyServer::new(state, config.server.bind_addr()?);

    info!(
        origin = %origin_url,
        bind = %server.bind_addr(),
        backend,
        client_cache_headers = config.headers.client_cache,
        "Starting proxy for {}",
        origin_url
    );

    serve_until_signal(server, config.server.shutdown_grace_period).await
}

/// Run the server until a shutdown signal, then allow `grace` for in-flight requests
async fn serve_until_signal(server: ProxyServer, grace: Duration) -> ProxyResult<()> {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server_handle = tokio::spawn(server.serve(async move {
        let _ = stop_rx.await;
    }));

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received, waiting for in-flight requests");
            let _ = stop_tx.send(());

            match timeout(grace, &mut server_handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(ProxyError::internal(format!("Server task failed: {}", e))),
                Err(_) => {
                    warn!("Shutdown timed out after {:?}, forcing shutdown", grace);
                    server_handle.abort();
                    Ok(())
                }
            }
        }
        result = &mut server_handle => {
            match result {
                Ok(result) => result,
                Err(e) => Err(ProxyError::internal(format!("Server task failed: {}", e))),
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
