//! End-to-end tests for the caching reverse proxy.
//!
//! A wiremock server plays the upstream; the proxy runs in-process on an
//! ephemeral port and is driven with reqwest.

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use coincache::cache::{DataCategory, TtlPolicy};
use coincache::server::cache_key;

use common::fixtures::{RunningProxy, mount_json, mount_rate_limited, mount_status};
use common::logger::TestLogger;

async fn get(url: &str) -> reqwest::Response {
    reqwest::get(url).await.expect("proxy request")
}

fn x_cache(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("x-cache")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn miss_then_hit() {
    let log = TestLogger::new("miss_then_hit");
    log.phase("setup");

    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "bitcoin": { "usd": 50000 } })))
        .expect(1)
        .mount(&upstream)
        .await;
    let proxy = RunningProxy::start(&upstream.uri()).await;

    log.phase("execute");
    let url = proxy.url("/api/simple/price?ids=bitcoin&vs_currencies=usd");
    log.http_request("GET", &url);
    let first = get(&url).await;
    log.cache_status(&x_cache(&first));
    assert_eq!(first.status(), 200);
    assert_eq!(x_cache(&first), "MISS");
    assert_eq!(
        first.headers().get("content-type").unwrap(),
        "application/json"
    );
    let body: Value = first.json().await.unwrap();
    assert_eq!(body["bitcoin"]["usd"], 50000);

    let second = get(&url).await;
    assert_eq!(x_cache(&second), "HIT");

    log.phase("verify");
    assert!(proxy.store.has("proxy:/simple/price?ids=bitcoin&vs_currencies=usd"));
    proxy.stop().await;
    log.finish_ok();
}

#[tokio::test]
async fn query_strings_are_cached_separately() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&upstream)
        .await;
    let proxy = RunningProxy::start(&upstream.uri()).await;

    assert_eq!(x_cache(&get(&proxy.url("/api/coins/markets?page=1")).await), "MISS");
    assert_eq!(x_cache(&get(&proxy.url("/api/coins/markets?page=2")).await), "MISS");
    assert_eq!(x_cache(&get(&proxy.url("/api/coins/markets?page=1")).await), "HIT");
    proxy.stop().await;
}

#[tokio::test]
async fn rate_limited_upstream_serves_stale() {
    let log = TestLogger::new("rate_limited_upstream_serves_stale");
    let upstream = MockServer::start().await;
    mount_rate_limited(&upstream, "/coins/solana", 30).await;
    let proxy = RunningProxy::start(&upstream.uri()).await;

    let key = cache_key("/coins/solana", None);
    proxy.store.set(&key, json!({ "id": "solana", "price": 150 }), Duration::ZERO);

    let response = get(&proxy.url("/api/coins/solana")).await;
    assert_eq!(response.status(), 200);
    assert_eq!(x_cache(&response), "STALE429");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["price"], 150);

    // Re-armed: the next request does not reach the upstream.
    let response = get(&proxy.url("/api/coins/solana")).await;
    assert_eq!(x_cache(&response), "HIT");
    assert_eq!(upstream.received_requests().await.unwrap().len(), 1);

    proxy.stop().await;
    log.finish_ok();
}

#[tokio::test]
async fn failing_upstream_serves_stale() {
    let upstream = MockServer::start().await;
    mount_status(&upstream, "/global", 503).await;
    let proxy = RunningProxy::start(&upstream.uri()).await;
    proxy
        .store
        .set(&cache_key("/global", None), json!({ "data": {} }), Duration::ZERO);

    let response = get(&proxy.url("/api/global")).await;
    assert_eq!(response.status(), 200);
    assert_eq!(x_cache(&response), "STALEERR");

    // No re-arm after a plain failure.
    let response = get(&proxy.url("/api/global")).await;
    assert_eq!(x_cache(&response), "STALEERR");
    assert_eq!(upstream.received_requests().await.unwrap().len(), 2);

    proxy.stop().await;
}

#[tokio::test]
async fn rate_limit_without_stale_is_429() {
    let upstream = MockServer::start().await;
    mount_rate_limited(&upstream, "/search/trending", 30).await;
    let proxy = RunningProxy::start(&upstream.uri()).await;

    let response = get(&proxy.url("/api/search/trending")).await;
    assert_eq!(response.status(), 429);
    assert_eq!(response.headers().get("retry-after").unwrap(), "30");
    assert!(response.headers().get("x-cache").is_none());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "CC-P001");
    assert_eq!(body["cached"], false);

    proxy.stop().await;
}

#[tokio::test]
async fn upstream_error_without_stale_is_502() {
    let upstream = MockServer::start().await;
    mount_status(&upstream, "/coins/list", 500).await;
    let proxy = RunningProxy::start(&upstream.uri()).await;

    let response = get(&proxy.url("/api/coins/list")).await;
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "CC-P002");

    proxy.stop().await;
}

#[tokio::test]
async fn slow_upstream_without_stale_is_504() {
    let log = TestLogger::new("slow_upstream_without_stale_is_504");
    let upstream = MockServer::start().await;
    // Ticker requests time out after 2s.
    Mock::given(method("GET"))
        .and(path("/coins/bitcoin/tickers"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "tickers": [] }))
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&upstream)
        .await;
    let proxy = RunningProxy::start(&upstream.uri()).await;

    let response = get(&proxy.url("/api/coins/bitcoin/tickers")).await;
    assert_eq!(response.status(), 504);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "CC-N001");

    proxy.stop().await;
    log.finish_ok();
}

#[tokio::test]
async fn category_ttl_overrides_apply() {
    let upstream = MockServer::start().await;
    mount_json(&upstream, "/simple/price", &json!({ "eth": { "usd": 200 } })).await;

    let mut overrides = BTreeMap::new();
    overrides.insert(DataCategory::Prices, 1);
    let proxy = RunningProxy::start_with(&upstream.uri(), TtlPolicy::with_overrides(&overrides)).await;

    assert_eq!(x_cache(&get(&proxy.url("/api/simple/price?ids=eth")).await), "MISS");
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(x_cache(&get(&proxy.url("/api/simple/price?ids=eth")).await), "MISS");

    proxy.stop().await;
}

#[tokio::test]
async fn admin_routes() {
    let log = TestLogger::new("admin_routes");
    let upstream = MockServer::start().await;
    mount_json(&upstream, "/global", &json!({ "data": { "active_cryptocurrencies": 10000 } })).await;
    let proxy = RunningProxy::start(&upstream.uri()).await;
    let client = reqwest::Client::new();

    log.phase("health");
    let health: Value = get(&proxy.url("/health")).await.json().await.unwrap();
    assert_eq!(health, json!({ "status": "ok" }));

    log.phase("populate");
    let _ = get(&proxy.url("/api/global")).await;
    let _ = get(&proxy.url("/api/global")).await;

    log.phase("stats");
    let stats: Value = get(&proxy.url("/cache/stats")).await.json().await.unwrap();
    assert_eq!(stats["keys"], 1);
    assert_eq!(stats["hits"], 1);
    assert_eq!(stats["misses"], 1);
    assert_eq!(stats["staleHits"], 0);

    log.phase("keys");
    let keys: Value = get(&proxy.url("/cache/keys")).await.json().await.unwrap();
    assert_eq!(keys[0]["key"], "proxy:/global");
    assert_eq!(keys[0]["hasStale"], true);
    assert!(keys[0]["ttlRemainingSecs"].as_u64().unwrap() > 200);
    assert!(keys[0]["cachedAt"].is_string());

    log.phase("delete");
    let deleted: Value = client
        .delete(proxy.url("/cache/keys/proxy:/global"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted, json!({ "deleted": 1 }));
    assert!(!proxy.store.has("proxy:/global"));
    assert!(proxy.store.has_stale("proxy:/global"));

    log.phase("flush");
    proxy.store.set("proxy:/ping", json!({}), Duration::from_secs(60));
    let flushed: Value = client
        .post(proxy.url("/cache/flush"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(flushed, json!({ "flushed": true }));
    assert!(proxy.store.keys().is_empty());

    proxy.stop().await;
    log.finish_ok();
}

#[tokio::test]
async fn unknown_routes_and_methods() {
    let upstream = MockServer::start().await;
    let proxy = RunningProxy::start(&upstream.uri()).await;
    let client = reqwest::Client::new();

    let response = get(&proxy.url("/metrics")).await;
    assert_eq!(response.status(), 404);

    let response = client.post(proxy.url("/api/global")).send().await.unwrap();
    assert_eq!(response.status(), 405);
    assert!(upstream.received_requests().await.unwrap().is_empty());

    proxy.stop().await;
}
