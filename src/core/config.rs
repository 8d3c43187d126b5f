//! # Configuration Module
//!
//! Configuration is read once at startup: an optional YAML file named by
//! `PROXY_CONFIG_PATH`, then environment variable overrides, then validation.
//! A missing required setting is a fatal error; the process never starts
//! serving with a partial configuration.
//!
//! ## Environment variables
//! - `PORT`, `BIND_ADDRESS`
//! - `ORIGIN`, `ORIGIN_SCHEME`, `ORIGIN_TIMEOUT_SECS`, `ORIGIN_MAX_RETRIES`
//! - `CACHE_BACKEND`, `CACHE_HOST`, `CACHE_USER`, `CACHE_PASS`, `CACHE_TTL_SECS`,
//!   `CACHE_MAX_ITEM_BYTES`, `CACHE_KEY_PREFIX` (`MEMCACHED_HOST`, `MEMCACHED_USER`
//!   and `MEMCACHED_PASS` are accepted as aliases)
//! - `CLIENT_CACHE_HEADERS`, `CLIENT_CACHE_MAX_AGE_SECS`
//! - `LOG_LEVEL`, `LOG_FORMAT`

use crate::core::error::{ProxyError, ProxyResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Environment variable naming the optional YAML config file
pub const CONFIG_PATH_ENV: &str = "PROXY_CONFIG_PATH";

/// Largest item the reference cache backend accepts
pub const DEFAULT_MAX_ITEM_BYTES: usize = 1024 * 1024;

/// Complete proxy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener settings
    pub server: ServerConfig,

    /// Origin server settings
    pub origin: OriginConfig,

    /// Cache backend and cache policy settings
    pub cache: CacheConfig,

    /// Client-facing header policy
    pub headers: HeaderPolicyConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,

    /// Listen port; required
    pub port: Option<u16>,

    /// How long in-flight requests may take to finish after a shutdown signal
    #[serde(with = "humantime_serde")]
    pub shutdown_grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: None,
            shutdown_grace_period: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Socket address the proxy listens on
    pub fn bind_addr(&self) -> ProxyResult<SocketAddr> {
        let port = self
            .port
            .ok_or_else(|| ProxyError::config("No PORT given"))?;

        format!("{}:{}", self.bind_address, port)
            .parse()
            .map_err(|e| ProxyError::config(format!("Invalid bind address: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Origin host (`host` or `host:port`), or a full base URL such as `https://origin.example.com`
    pub host: String,

    /// Scheme used when `host` carries none
    pub scheme: String,

    /// Deadline for receiving the origin response headers and buffering its body
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Extra attempts after a transport failure; HTTP error statuses are never retried
    pub max_retries: u32,

    /// Base delay between retries, multiplied by the attempt number
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            scheme: "http".to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_retries: 0,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

impl OriginConfig {
    /// Base URL whose scheme and authority replace those of inbound requests
    pub fn base_url(&self) -> ProxyResult<Url> {
        if self.host.trim().is_empty() {
            return Err(ProxyError::config("No ORIGIN given"));
        }

        let raw = if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("{}://{}", self.scheme, self.host)
        };

        let url = Url::parse(&raw)
            .map_err(|e| ProxyError::config(format!("Invalid origin '{}': {}", self.host, e)))?;

        if url.host_str().is_none() {
            return Err(ProxyError::config(format!("Origin '{}' has no host", self.host)));
        }
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::config(format!(
                "Unsupported origin scheme '{}'",
                url.scheme()
            )));
        }

        Ok(url)
    }
}

/// Cache backend implementations selectable at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local map, for single-instance and test deployments
    Memory,
    /// Networked Redis server shared by all proxy instances
    Redis,
}

impl FromStr for CacheBackend {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(ProxyError::config(format!("Unknown cache backend '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Backend kind; inferred as `redis` when only `endpoint` is set
    pub backend: Option<CacheBackend>,

    /// Backend address (`host:port` or a `redis://` URL)
    pub endpoint: Option<String>,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Backend expiry for stored entries; `None` keeps them until the backend evicts
    #[serde(with = "humantime_serde")]
    pub ttl: Option<Duration>,

    /// Serialized entries must be strictly smaller than this to be stored
    pub max_item_bytes: usize,

    /// Deadline for every single cache get/set
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Namespace prepended to keys in shared backends
    pub key_prefix: String,

    /// Longer keys are replaced by a digest of the key
    pub max_key_length: usize,

    /// Entry bound of the in-memory backend
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: None,
            endpoint: None,
            username: None,
            password: None,
            ttl: None,
            max_item_bytes: DEFAULT_MAX_ITEM_BYTES,
            operation_timeout: Duration::from_secs(1),
            key_prefix: String::new(),
            max_key_length: 250,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    /// Backend selected by explicit setting or by the presence of an endpoint
    pub fn backend_kind(&self) -> ProxyResult<CacheBackend> {
        match (self.backend, self.endpoint.as_deref()) {
            (Some(backend), _) => Ok(backend),
            (None, Some(endpoint)) if !endpoint.trim().is_empty() => Ok(CacheBackend::Redis),
            _ => Err(ProxyError::config(
                "No CACHE_HOST given and no CACHE_BACKEND selected",
            )),
        }
    }

    /// Connection URL for the Redis backend, with credentials applied
    pub fn redis_url(&self) -> ProxyResult<String> {
        let endpoint = self
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ProxyError::config("No CACHE_HOST given for the redis backend"))?;

        let raw = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("redis://{}", endpoint)
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| ProxyError::config(format!("Invalid cache endpoint '{}': {}", endpoint, e)))?;

        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            url.set_username(username)
                .map_err(|_| ProxyError::config("Cache endpoint cannot carry a username"))?;
        }
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| ProxyError::config("Cache endpoint cannot carry a password"))?;
        }

        Ok(url.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderPolicyConfig {
    /// Attach `Cache-Control`, `Last-Modified` and `Expires` to every response
    pub client_cache: bool,

    /// Lifetime advertised to downstream caches
    #[serde(with = "humantime_serde")]
    pub client_cache_max_age: Duration,
}

impl Default for HeaderPolicyConfig {
    fn default() -> Self {
        Self {
            client_cache: false,
            client_cache_max_age: Duration::from_secs(365 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from the optional file and the process environment
    pub async fn load() -> ProxyResult<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::load_from_file(&path).await,
            _ => {
                let mut config = Self::default();
                config.apply_env_overrides(|name| std::env::var(name).ok())?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load configuration from a YAML file, with environment overrides applied
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ProxyResult<Self> {
        let mut config = Self::read_file(path).await?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    async fn read_file<P: AsRef<Path>>(path: P) -> ProxyResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await.map_err(|e| {
            ProxyError::config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text without validating it
    pub fn from_yaml_str(content: &str) -> ProxyResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from an environment lookup function
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ProxyResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |names: &[&str]| names.iter().find_map(|name| lookup(name).filter(|v| !v.is_empty()));

        if let Some(port) = get(&["PORT"]) {
            self.server.port = Some(parse_env("PORT", &port)?);
        }
        if let Some(addr) = get(&["BIND_ADDRESS"]) {
            self.server.bind_address = addr;
        }

        if let Some(origin) = get(&["ORIGIN"]) {
            self.origin.host = origin;
        }
        if let Some(scheme) = get(&["ORIGIN_SCHEME"]) {
            self.origin.scheme = scheme.to_ascii_lowercase();
        }
        if let Some(secs) = get(&["ORIGIN_TIMEOUT_SECS"]) {
            self.origin.timeout = Duration::from_secs(parse_env("ORIGIN_TIMEOUT_SECS", &secs)?);
        }
        if let Some(retries) = get(&["ORIGIN_MAX_RETRIES"]) {
            self.origin.max_retries = parse_env("ORIGIN_MAX_RETRIES", &retries)?;
        }

        if let Some(backend) = get(&["CACHE_BACKEND"]) {
            self.cache.backend = Some(backend.parse()?);
        }
        if let Some(endpoint) = get(&["CACHE_HOST", "MEMCACHED_HOST"]) {
            self.cache.endpoint = Some(endpoint);
        }
        if let Some(user) = get(&["CACHE_USER", "MEMCACHED_USER"]) {
            self.cache.username = Some(user);
        }
        if let Some(pass) = get(&["CACHE_PASS", "MEMCACHED_PASS"]) {
            self.cache.password = Some(pass);
        }
        if let Some(secs) = get(&["CACHE_TTL_SECS"]) {
            let secs: u64 = parse_env("CACHE_TTL_SECS", &secs)?;
            self.cache.ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(bytes) = get(&["CACHE_MAX_ITEM_BYTES"]) {
            self.cache.max_item_bytes = parse_env("CACHE_MAX_ITEM_BYTES", &bytes)?;
        }
        if let Some(prefix) = get(&["CACHE_KEY_PREFIX"]) {
            self.cache.key_prefix = prefix;
        }

        if let Some(enabled) = get(&["CLIENT_CACHE_HEADERS"]) {
            self.headers.client_cache = parse_bool("CLIENT_CACHE_HEADERS", &enabled)?;
        }
        if let Some(secs) = get(&["CLIENT_CACHE_MAX_AGE_SECS"]) {
            self.headers.client_cache_max_age =
                Duration::from_secs(parse_env("CLIENT_CACHE_MAX_AGE_SECS", &secs)?);
        }

        if let Some(level) = get(&["LOG_LEVEL"]) {
            self.logging.level = level;
        }
        if let Some(format) = get(&["LOG_FORMAT"]) {
            self.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" | "text" => LogFormat::Pretty,
                other => {
                    return Err(ProxyError::config(format!("Unknown LOG_FORMAT '{}'", other)))
                }
            };
        }

        Ok(())
    }

    /// Validate the configuration, reporting the first missing or invalid setting
    pub fn validate(&self) -> ProxyResult<()> {
        self.server.bind_addr()?;
        self.origin.base_url()?;

        if self.cache.backend_kind()? == CacheBackend::Redis {
            self.cache.redis_url()?;
        }
        if self.cache.max_item_bytes == 0 {
            return Err(ProxyError::config("cache.max_item_bytes must be greater than zero"));
        }
        if self.cache.max_key_length == 0 {
            return Err(ProxyError::config("cache.max_key_length must be greater than zero"));
        }
        if self.cache.max_entries == 0 {
            return Err(ProxyError::config("cache.max_entries must be greater than zero"));
        }
        if self.cache.operation_timeout.is_zero() {
            return Err(ProxyError::config("cache.operation_timeout must be greater than zero"));
        }
        if self.origin.timeout.is_zero() {
            return Err(ProxyError::config("origin.timeout must be greater than zero"));
        }

        Ok(())
    }
}

fn parse_env<T>(name: &str, value: &str) -> ProxyResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ProxyError::config(format!("Invalid {} '{}': {}", name, value, e)))
}

fn parse_bool(name: &str, value: &str) -> ProxyResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ProxyError::config(format!("Invalid {} '{}'", name, value))),
    }
}
