//! # Origin Fetcher
//!
//! Rewrites an inbound request URI onto the configured origin (scheme and
//! authority replaced, path and query kept) and issues a GET for it.
//!
//! The body is buffered chunk by chunk only while it can still fit in a cache
//! entry. Once the buffered length reaches the item ceiling the response can
//! never be stored, so the fetcher hands back what it has read together with
//! the rest of the body stream and the proxy passes it through unbuffered.

use crate::core::config::OriginConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::core::types::ResponseEnvelope;
use async_trait::async_trait;
use axum::http::Uri;
use bytes::{Bytes, BytesMut};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, warn};
use url::Url;

/// Origin fetch failures
#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("Invalid origin URL: {message}")]
    InvalidUrl { message: String },

    /// Connection refused, reset, DNS failure and the like
    #[error("Origin request failed: {message}")]
    Transport { message: String },

    #[error("Origin request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Failed to read origin response body: {message}")]
    Body { message: String },
}

impl OriginError {
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Whether a fresh attempt might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<reqwest::Error> for OriginError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::InvalidUrl {
                message: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            Self::Body {
                message: err.to_string(),
            }
        } else {
            Self::Transport {
                message: err.to_string(),
            }
        }
    }
}

/// Origin response whose body outgrew the cache item ceiling
pub struct StreamingResponse {
    pub status_code: u16,
    pub content_type: String,

    /// Body bytes already read
    pub head: Bytes,

    /// Remainder of the body, not yet read
    pub rest: BoxStream<'static, io::Result<Bytes>>,
}

impl StreamingResponse {
    /// Full body as one stream, starting with the buffered head
    pub fn into_body_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        let Self { head, rest, .. } = self;
        stream::once(future::ready(Ok(head))).chain(rest).boxed()
    }
}

impl fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status_code", &self.status_code)
            .field("content_type", &self.content_type)
            .field("head_len", &self.head.len())
            .finish_non_exhaustive()
    }
}

/// Successful origin fetch
#[derive(Debug)]
pub enum OriginResponse {
    /// Whole body buffered
    Complete(ResponseEnvelope),
    /// Body too large to buffer for caching
    Streaming(StreamingResponse),
}

/// Ends `body` with a `TimedOut` error once `deadline` passes
fn with_deadline(
    body: BoxStream<'static, io::Result<Bytes>>,
    deadline: Instant,
    timeout_ms: u64,
) -> BoxStream<'static, io::Result<Bytes>> {
    stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match timeout_at(deadline, body.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(body))),
            Ok(None) => None,
            Err(_) => {
                warn!(timeout_ms, "Origin body stalled past the fetch deadline");
                let error = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("origin body not complete after {}ms", timeout_ms),
                );
                Some((Err(error), None))
            }
        }
    })
    .boxed()
}

/// Source of origin responses
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    /// GET the origin resource corresponding to an inbound request URI
    async fn fetch(&self, uri: &Uri) -> Result<OriginResponse, OriginError>;
}

/// HTTP origin client
pub struct OriginClient {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,

    /// Body length at which buffering stops
    buffer_limit: usize,
}

impl OriginClient {
    /// Create a client for the configured origin
    pub fn new(config: &OriginConfig, buffer_limit: usize) -> ProxyResult<Self> {
        let base_url = config.base_url()?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ProxyError::internal(format!("Failed to build origin client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            timeout: config.timeout,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            buffer_limit: buffer_limit.max(1),
        })
    }

    /// Origin base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Origin URL for an inbound request: only scheme and authority change
    pub fn origin_url(&self, uri: &Uri) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(uri.path());
        url.set_query(uri.query());
        url
    }

    /// One attempt; the deadline also bounds the streamed remainder of oversized bodies
    async fn fetch_once(&self, url: Url) -> Result<OriginResponse, OriginError> {
        let deadline = Instant::now() + self.timeout;
        match timeout_at(deadline, self.send_and_buffer(url, deadline)).await {
            Ok(result) => result,
            Err(_) => Err(OriginError::Timeout {
                timeout_ms: self.timeout_ms(),
            }),
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    async fn send_and_buffer(
        &self,
        url: Url,
        deadline: Instant,
    ) -> Result<OriginResponse, OriginError> {
        let response = self.client.get(url).send().await?;

        let status_code = response.status().as_u16();
        let content_type = match response.headers().get(reqwest::header::CONTENT_TYPE) {
            None => String::new(),
            Some(value) => match value.to_str() {
                Ok(content_type) => content_type.to_string(),
                Err(_) => {
                    let lossy = String::from_utf8_lossy(value.as_bytes()).into_owned();
                    warn!(content_type = %lossy, "Origin content type is not ASCII, keeping a lossy copy");
                    lossy
                }
            },
        };

        let mut body = response.bytes_stream();
        let mut buffered = BytesMut::new();

        while let Some(chunk) = body.next().await {
            buffered.extend_from_slice(&chunk?);

            if buffered.len() >= self.buffer_limit {
                debug!(
                    status = status_code,
                    buffered = buffered.len(),
                    limit = self.buffer_limit,
                    "Origin body exceeds cache item limit, streaming remainder"
                );
                let rest = body
                    .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e)))
                    .boxed();
                let rest = with_deadline(rest, deadline, self.timeout_ms());
                return Ok(OriginResponse::Streaming(StreamingResponse {
                    status_code,
                    content_type,
                    head: buffered.freeze(),
                    rest,
                }));
            }
        }

        Ok(OriginResponse::Complete(ResponseEnvelope::new(
            status_code,
            content_type,
            buffered.freeze(),
        )))
    }
}

#[async_trait]
impl OriginFetcher for OriginClient {
    async fn fetch(&self, uri: &Uri) -> Result<OriginResponse, OriginError> {
        let url = self.origin_url(uri);
        debug!(url = %url, "Loading from origin");

        let mut attempt = 0;
        loop {
            match self.fetch_once(url.clone()).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(url = %url, attempt, error = %e, "Origin request failed, retrying");
                    sleep(self.retry_backoff * attempt).await;
                }
                result => return result,
            }
        }
    }
}
