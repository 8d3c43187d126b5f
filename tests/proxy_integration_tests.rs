//! # Cache-Aside Proxy Integration Tests
//!
//! End-to-end behavior through the HTTP router with a mocked origin: cache
//! hits and misses, eligibility rules, backend fault isolation and origin
//! failures.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use cache_proxy::caching::{
    CacheError, CacheResult, CacheStore, EnvelopeCodec, InMemoryCache, InMemoryCacheConfig,
};
use cache_proxy::core::config::ProxyConfig;
use cache_proxy::core::types::ResponseEnvelope;
use cache_proxy::gateway::{ProxyServer, ProxyState};
use cache_proxy::upstream::OriginClient;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Cache backend that fails every operation
struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::store("connection reset by peer"))
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> CacheResult<()> {
        Err(CacheError::store("connection reset by peer"))
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(false)
    }

    fn backend_name(&self) -> &'static str {
        "unreachable"
    }
}

fn config_for(origin: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.server.port = Some(0);
    config.origin.host = origin.to_string();
    config.origin.timeout = Duration::from_secs(5);
    config
}

fn proxy(config: &ProxyConfig, store: Arc<dyn CacheStore>) -> TestServer {
    let origin = Arc::new(OriginClient::new(&config.origin, config.cache.max_item_bytes).unwrap());
    let state = ProxyState::from_config(config, store, origin, Utc::now()).unwrap();
    TestServer::new(ProxyServer::router(state)).unwrap()
}

fn memory_store() -> Arc<InMemoryCache> {
    Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()))
}

fn png_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cat.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes(500))
                .insert_header("content-type", "image/png"),
        )
        .expect(1)
        .mount(&origin)
        .await;

    let store = memory_store();
    let server = proxy(&config_for(&origin.uri()), store.clone());

    let first = server.get("/cat.png").await;
    first.assert_status_ok();
    assert_eq!(first.headers()["content-type"], "image/png");
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(first.as_bytes().as_ref(), png_bytes(500).as_slice());

    let second = server.get("/cat.png").await;
    second.assert_status_ok();
    assert_eq!(second.headers()["content-type"], "image/png");
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.as_bytes().as_ref(), png_bytes(500).as_slice());

    let stored = store.get("/cat.png").await.unwrap().unwrap();
    let envelope = EnvelopeCodec::decode(&stored).unwrap();
    assert_eq!(envelope.status_code(), 200);
    assert_eq!(envelope.content_type(), "image/png");
}

#[tokio::test]
async fn test_error_responses_are_never_cached() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(2)
        .mount(&origin)
        .await;

    let store = memory_store();
    let server = proxy(&config_for(&origin.uri()), store.clone());

    for _ in 0..2 {
        let response = server.get("/broken").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_text("upstream exploded");
        assert_eq!(response.headers()["x-cache"], "MISS");
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_not_found_is_passed_through_uncached() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&origin)
        .await;

    let server = proxy(&config_for(&origin.uri()), memory_store());

    server.get("/missing").await.assert_status(StatusCode::NOT_FOUND);
    server.get("/missing").await.assert_status(StatusCode::NOT_FOUND);
}

async fn size_boundary_case(max_item_bytes_offset: isize, expected_origin_calls: u64) {
    let body = png_bytes(4096);
    let encoded_len = EnvelopeCodec::encode(&ResponseEnvelope::new(
        200,
        "application/octet-stream",
        body.clone(),
    ))
    .unwrap()
    .len();

    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blob"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.clone())
                .insert_header("content-type", "application/octet-stream"),
        )
        .expect(expected_origin_calls)
        .mount(&origin)
        .await;

    let mut config = config_for(&origin.uri());
    config.cache.max_item_bytes = (encoded_len as isize + max_item_bytes_offset) as usize;
    let server = proxy(&config, memory_store());

    for _ in 0..2 {
        let response = server.get("/blob").await;
        response.assert_status_ok();
        assert_eq!(response.as_bytes().as_ref(), body.as_slice());
    }
}

#[tokio::test]
async fn test_entry_one_byte_under_limit_is_cached() {
    size_boundary_case(1, 1).await;
}

#[tokio::test]
async fn test_entry_at_limit_is_not_cached() {
    size_boundary_case(0, 2).await;
}

#[tokio::test]
async fn test_oversized_body_streams_through() {
    let body = png_bytes(64 * 1024);
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.clone())
                .insert_header("content-type", "video/mp4"),
        )
        .expect(2)
        .mount(&origin)
        .await;

    let mut config = config_for(&origin.uri());
    config.cache.max_item_bytes = 1024;
    let store = memory_store();
    let server = proxy(&config, store.clone());

    for _ in 0..2 {
        let response = server.get("/movie.mp4").await;
        response.assert_status_ok();
        assert_eq!(response.headers()["content-type"], "video/mp4");
        assert_eq!(response.headers()["x-cache"], "MISS");
        assert_eq!(response.as_bytes().len(), body.len());
        assert_eq!(response.as_bytes().as_ref(), body.as_slice());
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unreachable_cache_degrades_to_origin() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cat.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes(100))
                .insert_header("content-type", "image/png"),
        )
        .expect(2)
        .mount(&origin)
        .await;

    let server = proxy(&config_for(&origin.uri()), Arc::new(UnreachableStore));

    for _ in 0..2 {
        let response = server.get("/cat.png").await;
        response.assert_status_ok();
        assert_eq!(response.headers()["x-cache"], "MISS");
        assert_eq!(response.as_bytes().as_ref(), png_bytes(100).as_slice());
    }
}

#[tokio::test]
async fn test_corrupt_entry_is_replaced() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cat.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(png_bytes(10))
                .insert_header("content-type", "image/png"),
        )
        .expect(1)
        .mount(&origin)
        .await;

    let store = memory_store();
    store.set("/cat.png", b"not an envelope", None).await.unwrap();
    let server = proxy(&config_for(&origin.uri()), store.clone());

    let first = server.get("/cat.png").await;
    first.assert_status_ok();
    assert_eq!(first.headers()["x-cache"], "MISS");

    let second = server.get("/cat.png").await;
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.as_bytes().as_ref(), png_bytes(10).as_slice());
}

#[tokio::test]
async fn test_cors_header_on_hit_and_miss() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/styles.css"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("body { color: red }")
                .insert_header("content-type", "text/css")
                .insert_header("access-control-allow-origin", "https://only.example.com"),
        )
        .mount(&origin)
        .await;

    let server = proxy(&config_for(&origin.uri()), memory_store());

    for expected in ["MISS", "HIT"] {
        let response = server.get("/styles.css").await;
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(response.headers()["x-cache"], expected);
        assert!(response.headers().get("cache-control").is_none());
    }
}

#[tokio::test]
async fn test_client_cache_headers_when_enabled() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("console.log(1)")
                .insert_header("content-type", "application/javascript"),
        )
        .mount(&origin)
        .await;

    let mut config = config_for(&origin.uri());
    config.headers.client_cache = true;
    config.headers.client_cache_max_age = Duration::from_secs(3600);
    let server = proxy(&config, memory_store());

    let miss = server.get("/app.js").await;
    let hit = server.get("/app.js").await;
    for response in [&miss, &hit] {
        assert_eq!(response.headers()["cache-control"], "public, max-age=3600");
        assert!(response.headers().get("last-modified").is_some());
        assert!(response.headers().get("expires").is_some());
    }
    assert_eq!(miss.headers()["last-modified"], hit.headers()["last-modified"]);
}

#[tokio::test]
async fn test_query_string_is_forwarded_and_keyed() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/thumb"))
        .and(query_param("size", "small"))
        .respond_with(ResponseTemplate::new(200).set_body_string("small"))
        .expect(1)
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/thumb"))
        .and(query_param("size", "large"))
        .respond_with(ResponseTemplate::new(200).set_body_string("large"))
        .expect(1)
        .mount(&origin)
        .await;

    let store = memory_store();
    let server = proxy(&config_for(&origin.uri()), store.clone());

    server
        .get("/thumb")
        .add_query_param("size", "small")
        .await
        .assert_text("small");
    server
        .get("/thumb")
        .add_query_param("size", "large")
        .await
        .assert_text("large");
    server
        .get("/thumb")
        .add_query_param("size", "small")
        .await
        .assert_text("small");
    server
        .get("/thumb")
        .add_query_param("size", "large")
        .await
        .assert_text("large");

    assert_eq!(store.len(), 2);
    assert!(store.get("/thumb?size=small").await.unwrap().is_some());
    assert!(store.get("/thumb?size=large").await.unwrap().is_some());
}

#[tokio::test]
async fn test_non_get_methods_are_fetched_with_get() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/form"))
        .respond_with(ResponseTemplate::new(200).set_body_string("page"))
        .expect(1)
        .mount(&origin)
        .await;

    let server = proxy(&config_for(&origin.uri()), memory_store());

    server.post("/form").await.assert_text("page");
    let cached = server.put("/form").await;
    cached.assert_text("page");
    assert_eq!(cached.headers()["x-cache"], "HIT");
}

#[tokio::test]
async fn test_unreachable_origin_returns_bad_gateway() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let server = proxy(&config_for(&format!("http://127.0.0.1:{}", port)), memory_store());

    let response = server.get("/anything").await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["cache-control"], "no-store");

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], 502);
    assert_eq!(body["error"]["type"], "origin_unavailable");
}

#[tokio::test]
async fn test_slow_origin_returns_gateway_timeout() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&origin)
        .await;

    let mut config = config_for(&origin.uri());
    config.origin.timeout = Duration::from_millis(200);
    let store = memory_store();
    let server = proxy(&config, store.clone());

    let response = server.get("/slow").await;
    response.assert_status(StatusCode::GATEWAY_TIMEOUT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["type"], "origin_timeout");
    assert!(store.is_empty());
}
