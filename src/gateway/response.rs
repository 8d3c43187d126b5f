//! # Response Writer
//!
//! Turns a pipeline outcome into the client response. Cached and freshly
//! fetched responses are written identically apart from `X-Cache`; the header
//! policy is applied on every path so a hit never carries less than a miss.

use crate::core::config::HeaderPolicyConfig;
use crate::core::error::ProxyError;
use crate::core::types::ResponseEnvelope;
use crate::gateway::pipeline::PipelineOutcome;
use crate::upstream::{OriginError, StreamingResponse};
use axum::body::Body;
use axum::http::header::{
    InvalidHeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE, EXPIRES,
    LAST_MODIFIED,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

/// Reports whether the response came from the cache
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format a timestamp as an IMF-fixdate
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// `Cache-Control`, `Last-Modified` and `Expires`, fixed at startup
#[derive(Debug, Clone)]
pub struct ClientCacheHeaders {
    cache_control: HeaderValue,
    last_modified: HeaderValue,
    expires: HeaderValue,
}

impl ClientCacheHeaders {
    pub fn new(since: DateTime<Utc>, max_age: Duration) -> Result<Self, InvalidHeaderValue> {
        let expires_at = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| since.checked_add_signed(age))
            .unwrap_or(since);

        Ok(Self {
            cache_control: HeaderValue::from_str(&format!(
                "public, max-age={}",
                max_age.as_secs()
            ))?,
            last_modified: HeaderValue::from_str(&http_date(since))?,
            expires: HeaderValue::from_str(&http_date(expires_at))?,
        })
    }

    fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(CACHE_CONTROL, self.cache_control.clone());
        headers.insert(LAST_MODIFIED, self.last_modified.clone());
        headers.insert(EXPIRES, self.expires.clone());
    }
}

/// Writes client responses with the configured header policy
#[derive(Debug, Clone, Default)]
pub struct ResponseWriter {
    client_cache: Option<ClientCacheHeaders>,
}

impl ResponseWriter {
    pub fn new(client_cache: Option<ClientCacheHeaders>) -> Self {
        Self { client_cache }
    }

    /// Build the writer for this process; `started_at` becomes `Last-Modified`
    pub fn from_config(
        config: &HeaderPolicyConfig,
        started_at: DateTime<Utc>,
    ) -> Result<Self, ProxyError> {
        let client_cache = if config.client_cache {
            let headers = ClientCacheHeaders::new(started_at, config.client_cache_max_age)
                .map_err(|e| ProxyError::config(format!("Invalid client cache headers: {}", e)))?;
            Some(headers)
        } else {
            None
        };

        Ok(Self::new(client_cache))
    }

    pub fn write(&self, outcome: PipelineOutcome) -> Response {
        match outcome {
            PipelineOutcome::Hit(envelope) => self.envelope_response(envelope, "HIT"),
            PipelineOutcome::Miss { envelope, .. } => self.envelope_response(envelope, "MISS"),
            PipelineOutcome::Streamed(streaming) => self.streaming_response(streaming),
            PipelineOutcome::OriginFailed(error) => self.failure_response(error),
        }
    }

    fn envelope_response(&self, envelope: ResponseEnvelope, cache_status: &'static str) -> Response {
        let (status_code, content_type, body) = envelope.into_parts();

        let mut headers = HeaderMap::new();
        insert_content_type(&mut headers, &content_type);
        self.apply_policy(&mut headers, cache_status);

        build(status(status_code), headers, Body::from(body))
    }

    fn streaming_response(&self, streaming: StreamingResponse) -> Response {
        let mut headers = HeaderMap::new();
        insert_content_type(&mut headers, &streaming.content_type);
        self.apply_policy(&mut headers, "MISS");

        let status = status(streaming.status_code);
        build(status, headers, Body::from_stream(streaming.into_body_stream()))
    }

    /// Failures get CORS and `no-store` but never the long-lived client cache headers
    fn failure_response(&self, error: OriginError) -> Response {
        let mut response = ProxyError::from(error).into_response();
        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
        response
    }

    fn apply_policy(&self, headers: &mut HeaderMap, cache_status: &'static str) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(X_CACHE, HeaderValue::from_static(cache_status));
        if let Some(client_cache) = &self.client_cache {
            client_cache.apply(headers);
        }
    }
}

fn insert_content_type(headers: &mut HeaderMap, content_type: &str) {
    if content_type.is_empty() {
        return;
    }
    match HeaderValue::from_bytes(content_type.as_bytes()) {
        Ok(value) => {
            headers.insert(CONTENT_TYPE, value);
        }
        Err(e) => warn!(content_type, error = %e, "Dropping invalid content type"),
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY)
}

fn build(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
