//! # Error Handling Module
//!
//! Top-level error type for the proxy. Cache and origin failures have their own
//! error enums in their modules; they convert into `ProxyError` where they cross
//! into startup code or client-facing responses.
//!
//! Only origin failures ever reach a client. Cache backend failures are logged
//! and absorbed by the request pipeline, and configuration errors stop the
//! process before it starts serving.

use crate::caching::CacheError;
use crate::upstream::OriginError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the proxy
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Error categories of the proxy
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Missing or invalid configuration, fatal at startup
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Cache backend errors (connection setup, health check)
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Origin fetch failures
    #[error("Origin error: {0}")]
    Origin(#[from] OriginError),

    /// I/O errors (listener binding, config file reads)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ProxyError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status code reported to clients for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Origin(OriginError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Origin(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable identifier used in error bodies and logs
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::Cache(_) => "cache_error",
            Self::Origin(OriginError::Timeout { .. }) => "origin_timeout",
            Self::Origin(_) => "origin_unavailable",
            Self::Io { .. } => "io_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ProxyError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: format!("Failed to parse config: {}", err),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}
