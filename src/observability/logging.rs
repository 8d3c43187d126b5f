//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` wins when set;
//! otherwise the configured level applies to this crate and to the HTTP trace
//! layer.

use crate::core::config::{LogFormat, LoggingConfig};
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter directive derived from the configured level
///
/// A bare level such as `debug` is scoped to this crate and `tower_http`; a
/// full directive (`cache_proxy=debug,redis=info`) is used as-is.
pub fn default_directive(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("cache_proxy={level},tower_http={level}", level = level.to_lowercase())
    }
}

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(&config.level)))
        .unwrap_or_else(|_| EnvFilter::new("cache_proxy=info,tower_http=info"))
}

/// Initialize the global subscriber
///
/// A second initialization (tests, embedding) is logged and otherwise ignored.
pub fn init_logging(config: &LoggingConfig) {
    let filter = env_filter(config);

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Pretty => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
    };

    if result.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }
}
