//! Request routing for the proxy.

use futures::FutureExt;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::json;

use super::ProxyState;
use crate::cache::DataCategory;
use crate::core::fetch::BoxFetch;
use crate::error::CoinCacheError;

/// Response header naming the path a proxied request took.
pub const X_CACHE: &str = "x-cache";

const API_PREFIX: &str = "/api";
const KEYS_PREFIX: &str = "/cache/keys/";

/// Route a request. Never fails; every error becomes a JSON response.
pub async fn handle<B>(state: &ProxyState, req: Request<B>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    tracing::debug!(%method, %path, "Request");

    match (&method, path.as_str()) {
        (&Method::GET, "/health") => json_response(StatusCode::OK, &json!({ "status": "ok" })),
        (&Method::GET, "/cache/stats") => {
            json_response(StatusCode::OK, &state.read_through.store().stats())
        }
        (&Method::GET, "/cache/keys") => {
            json_response(StatusCode::OK, &state.read_through.store().entries())
        }
        (&Method::POST, "/cache/flush") => {
            state.read_through.store().flush();
            json_response(StatusCode::OK, &json!({ "flushed": true }))
        }
        (&Method::DELETE, p) if p.len() > KEYS_PREFIX.len() && p.starts_with(KEYS_PREFIX) => {
            let key = join_query(&p[KEYS_PREFIX.len()..], query.as_deref());
            let deleted = state.read_through.store().del(&key);
            tracing::info!(%key, deleted, "Cache key deleted");
            json_response(StatusCode::OK, &json!({ "deleted": deleted }))
        }
        (m, p) if is_api_path(p) => {
            if *m == Method::GET {
                proxy(state, upstream_path(p), query.as_deref()).await
            } else {
                error_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "method not allowed",
                    "CC-S405",
                )
            }
        }
        _ => error_response(StatusCode::NOT_FOUND, "not found", "CC-S404"),
    }
}

/// Forward a GET through the read-through cache.
async fn proxy(state: &ProxyState, path: &str, query: Option<&str>) -> Response<Full<Bytes>> {
    let category = DataCategory::classify_path(path);
    let ttl = state.policy.ttl_for(category);
    let key = cache_key(path, query);

    let upstream = state.upstream.clone();
    let (fetch_path, fetch_query) = (path.to_string(), query.map(str::to_string));
    let fetch = move || -> BoxFetch {
        async move {
            upstream
                .fetch(&fetch_path, fetch_query.as_deref(), category.timeout())
                .await
        }
        .boxed()
    };

    match state
        .read_through
        .get_or_set_with_fallback(&key, fetch, ttl)
        .await
    {
        Ok(cached) => {
            tracing::debug!(%key, %category, status = cached.status.header_value(), "Proxied");
            let mut response = json_response(StatusCode::OK, &cached.data);
            response.headers_mut().insert(
                X_CACHE,
                HeaderValue::from_static(cached.status.header_value()),
            );
            response
        }
        Err(err) => upstream_error_response(&err),
    }
}

/// Cache key for an upstream path and query, e.g. `proxy:/coins/markets?page=1`.
#[must_use]
pub fn cache_key(path: &str, query: Option<&str>) -> String {
    join_query(&format!("proxy:{path}"), query)
}

fn join_query(base: &str, query: Option<&str>) -> String {
    match query.filter(|q| !q.is_empty()) {
        Some(q) => format!("{base}?{q}"),
        None => base.to_string(),
    }
}

fn is_api_path(path: &str) -> bool {
    path == API_PREFIX || path.starts_with("/api/")
}

fn upstream_path(path: &str) -> &str {
    match &path[API_PREFIX.len()..] {
        "" => "/",
        rest => rest,
    }
}

fn upstream_error_response(err: &CoinCacheError) -> Response<Full<Bytes>> {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = json_response(
        status,
        &json!({
            "error": err.to_string(),
            "code": err.error_code(),
            "cached": false,
        }),
    );
    if let Some(retry_after) = err.retry_after()
        && let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string())
    {
        response.headers_mut().insert(hyper::header::RETRY_AFTER, value);
    }
    response
}

fn error_response(status: StatusCode, message: &str, code: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &json!({ "error": message, "code": code, "cached": false }),
    )
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"null".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, ReadThrough, TtlPolicy};
    use crate::core::http::{Upstream, default_client};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    fn state() -> ProxyState {
        // Nothing listens on port 9; requests that reach it fail fast.
        let upstream = Upstream::new(default_client().unwrap(), "test", "http://127.0.0.1:9");
        ProxyState::new(
            ReadThrough::new(Arc::new(CacheStore::new())),
            upstream,
            TtlPolicy::new(),
        )
    }

    fn request(method: Method, uri: &str) -> Request<()> {
        Request::builder().method(method).uri(uri).body(()).unwrap()
    }

    async fn body_json(response: Response<Full<Bytes>>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn cache_keys_include_query() {
        assert_eq!(cache_key("/coins/markets", Some("page=1")), "proxy:/coins/markets?page=1");
        assert_eq!(cache_key("/global", None), "proxy:/global");
        assert_eq!(cache_key("/global", Some("")), "proxy:/global");
    }

    #[test]
    fn api_prefix_is_stripped() {
        assert_eq!(upstream_path("/api/simple/price"), "/simple/price");
        assert_eq!(upstream_path("/api"), "/");
        assert!(is_api_path("/api/global"));
        assert!(!is_api_path("/apiary"));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = handle(&state(), request(Method::GET, "/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn fresh_entries_are_served_without_upstream() {
        let state = state();
        state.read_through.store().set(
            "proxy:/simple/price?ids=bitcoin",
            json!({ "bitcoin": { "usd": 50000 } }),
            Duration::from_secs(60),
        );

        let response = handle(&state, request(Method::GET, "/api/simple/price?ids=bitcoin")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_CACHE], "HIT");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_json(response).await["bitcoin"]["usd"], 50000);
    }

    #[tokio::test]
    async fn delete_key_reports_count() {
        let state = state();
        state
            .read_through
            .store()
            .set("proxy:/global", json!({}), Duration::from_secs(60));

        let response = handle(&state, request(Method::DELETE, "/cache/keys/proxy:/global")).await;
        assert_eq!(body_json(response).await, json!({ "deleted": 1 }));

        let response = handle(&state, request(Method::DELETE, "/cache/keys/proxy:/global")).await;
        assert_eq!(body_json(response).await, json!({ "deleted": 0 }));
    }

    #[tokio::test]
    async fn unknown_routes_are_json_404() {
        let response = handle(&state(), request(Method::GET, "/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["cached"], false);
    }

    #[tokio::test]
    async fn non_get_api_is_405() {
        let response = handle(&state(), request(Method::POST, "/api/global")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unreachable_upstream_without_stale_is_502() {
        let response = handle(&state(), request(Method::GET, "/api/global")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert!(body["code"].as_str().unwrap().starts_with("CC-N"));
        assert_eq!(body["cached"], false);
    }
}
