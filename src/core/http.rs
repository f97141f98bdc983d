//! HTTP client utilities.
//!
//! Provides the shared upstream client and the classification of upstream
//! responses into [`FetchOutcome`]s.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::Value;

use crate::core::fetch::FetchOutcome;
use crate::error::{CoinCacheError, Result};

/// Default timeout for upstream requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest body excerpt carried into error messages.
const MAX_ERROR_BODY: usize = 200;

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("coincache/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CoinCacheError::Network(e.to_string()))
}

/// Get or create a default HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn default_client() -> Result<Client> {
    build_client(DEFAULT_TIMEOUT)
}

/// An upstream endpoint the cache fetches from.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: Client,
    name: String,
    base_url: String,
}

impl Upstream {
    /// Create an upstream over a shared client.
    pub fn new(client: Client, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client,
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Upstream name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join a path and optional query onto the base URL.
    #[must_use]
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        let path = path.trim_start_matches('/');
        match query.filter(|q| !q.is_empty()) {
            Some(q) => format!("{}/{path}?{q}", self.base_url),
            None => format!("{}/{path}", self.base_url),
        }
    }

    /// Fetch `path?query` with a per-request timeout and classify the result.
    pub async fn fetch(&self, path: &str, query: Option<&str>, timeout: Duration) -> FetchOutcome {
        let url = self.url_for(path, query);
        fetch_outcome(&self.client, &self.name, &url, timeout).await
    }
}

/// Fetch JSON from a URL.
///
/// # Errors
///
/// Returns [`CoinCacheError::RateLimited`] on HTTP 429, and a network,
/// timeout, status or parse error for every other failure.
pub async fn fetch_json(
    client: &Client,
    upstream: &str,
    url: &str,
    timeout: Duration,
) -> Result<Value> {
    tracing::debug!(upstream, url, timeout_secs = timeout.as_secs(), "Fetching upstream");

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| map_send_error(&e, upstream, timeout))?;

    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        return Err(CoinCacheError::RateLimited {
            upstream: upstream.to_string(),
            retry_after,
            message: excerpt(&body, "too many requests"),
        });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CoinCacheError::UpstreamStatus {
            upstream: upstream.to_string(),
            status_code: status.as_u16(),
            message: excerpt(&body, status.canonical_reason().unwrap_or("error")),
        });
    }

    response.json::<Value>().await.map_err(|e| {
        if e.is_timeout() {
            CoinCacheError::Timeout {
                upstream: upstream.to_string(),
                seconds: timeout.as_secs(),
            }
        } else {
            CoinCacheError::ParseResponse(e.to_string())
        }
    })
}

/// Fetch JSON from a URL and classify it into a [`FetchOutcome`].
pub async fn fetch_outcome(
    client: &Client,
    upstream: &str,
    url: &str,
    timeout: Duration,
) -> FetchOutcome {
    FetchOutcome::from(fetch_json(client, upstream, url, timeout).await)
}

fn map_send_error(e: &reqwest::Error, upstream: &str, timeout: Duration) -> CoinCacheError {
    if e.is_timeout() {
        CoinCacheError::Timeout {
            upstream: upstream.to_string(),
            seconds: timeout.as_secs(),
        }
    } else {
        CoinCacheError::Network(format!("{upstream}: {e}"))
    }
}

/// Parse a `Retry-After` header given in delta-seconds.
///
/// HTTP-date values are ignored; upstreams we talk to only send seconds.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn excerpt(body: &str, fallback: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
