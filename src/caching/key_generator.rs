//! # Cache Key Generator
//!
//! Keys are the request's path and query exactly as received (`/a?x=1`), so
//! every arrival of the same logical request maps to the same entry and two
//! different resources never share one. Keys longer than the backend allows
//! are replaced by a SHA-256 digest of the full key.

use axum::http::Uri;
use sha2::{Digest, Sha256};

/// Cache key generator trait
pub trait KeyGenerator: Send + Sync {
    /// Generate the cache key for an inbound request URI
    fn generate_key(&self, uri: &Uri) -> String;
}

/// Path-and-query key generator
#[derive(Debug, Clone)]
pub struct PathQueryKeyGenerator {
    max_length: usize,
}

impl PathQueryKeyGenerator {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// Hash the key if it exceeds max length
    fn truncate_key(&self, key: &str) -> String {
        if key.len() <= self.max_length {
            key.to_string()
        } else {
            format!("sha256:{}", hex::encode(Sha256::digest(key.as_bytes())))
        }
    }
}

impl Default for PathQueryKeyGenerator {
    fn default() -> Self {
        Self::new(250)
    }
}

impl KeyGenerator for PathQueryKeyGenerator {
    fn generate_key(&self, uri: &Uri) -> String {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/");

        self.truncate_key(path_and_query)
    }
}
