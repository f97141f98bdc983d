//! Read-through fetch orchestration with stale fallback.
//!
//! Per call, the orchestrator walks a small state machine:
//!
//! ```text
//! MISS-check ─ hit ──────────────────────────────▶ Hit
//!      │
//!      └ miss ▶ fetch ─ success ──▶ set both tiers ▶ Miss
//!                 │
//!                 ├ rate limited ─ stale? ─ yes ▶ re-arm 10 min ▶ Stale429
//!                 │                       └ no ──▶ error propagated
//!                 └ other failure ─ stale? ─ yes ▶ StaleErr
//!                                          └ no ──▶ error propagated
//! ```
//!
//! Nothing is carried between calls. Concurrent misses for the same key are
//! not coalesced: each caller runs its own fetch.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::store::CacheStore;
use crate::core::fetch::FetchOutcome;
use crate::error::Result;

/// How long a stale entry is re-armed into the fresh tier after the upstream
/// throttled us.
pub const RATE_LIMIT_EXTENSION: Duration = Duration::from_secs(600);

/// Which path answered a request. Rendered as the `X-Cache` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    /// Fresh-tier hit, no upstream call.
    Hit,
    /// Fetched from upstream and stored.
    Miss,
    /// Upstream throttled; served (and re-armed) the stale copy.
    Stale429,
    /// Upstream failed; served the stale copy.
    StaleErr,
}

impl CacheStatus {
    /// Value for the `X-Cache` response header.
    #[must_use]
    pub const fn header_value(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Stale429 => "STALE429",
            Self::StaleErr => "STALEERR",
        }
    }

    /// Whether the data came from the stale tier.
    #[must_use]
    pub const fn is_stale(self) -> bool {
        matches!(self, Self::Stale429 | Self::StaleErr)
    }
}

/// Data returned to a handler, annotated with how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cached {
    pub data: Value,
    pub cached: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
    #[serde(skip)]
    pub status: CacheStatus,
}

impl Cached {
    fn new(data: Value, status: CacheStatus) -> Self {
        Self {
            data,
            cached: status != CacheStatus::Miss,
            stale: status.is_stale(),
            status,
        }
    }
}

/// Read-through front for a shared [`CacheStore`].
#[derive(Debug, Clone)]
pub struct ReadThrough {
    store: Arc<CacheStore>,
    rate_limit_extension: Duration,
}

impl ReadThrough {
    /// Wrap a store with the default 10 minute rate-limit extension.
    #[must_use]
    pub const fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            rate_limit_extension: RATE_LIMIT_EXTENSION,
        }
    }

    /// Override how long a stale entry is re-armed after a 429.
    #[must_use]
    pub const fn with_rate_limit_extension(mut self, extension: Duration) -> Self {
        self.rate_limit_extension = extension;
        self
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Serve `key` from the fresh tier, or run `fetch` once and store the
    /// result for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`CoinCacheError::RateLimited`](crate::CoinCacheError::RateLimited)
    /// when the fetch was throttled and the transport error otherwise. No
    /// stale fallback happens here; see
    /// [`get_or_set_with_fallback`](Self::get_or_set_with_fallback).
    pub async fn get_or_set<F, Fut>(&self, key: &str, fetch: F, ttl: Duration) -> Result<Cached>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        if let Some(data) = self.store.get(key) {
            tracing::debug!(key, "Cache hit");
            return Ok(Cached::new(data, CacheStatus::Hit));
        }

        tracing::debug!(key, ttl_secs = ttl.as_secs(), "Cache miss, fetching upstream");
        let outcome = fetch().await;
        tracing::debug!(key, outcome = outcome.label(), "Upstream fetch finished");

        let data = outcome.into_result()?;
        self.store.set(key, data.clone(), ttl);
        Ok(Cached::new(data, CacheStatus::Miss))
    }

    /// Like [`get_or_set`](Self::get_or_set), but a failed fetch is answered
    /// from the stale tier when it still holds `key`.
    ///
    /// A rate-limited fetch additionally re-arms the stale value in the fresh
    /// tier for the rate-limit extension, so the next callers do not hit the
    /// throttled upstream again.
    ///
    /// # Errors
    ///
    /// Returns the fetch error unchanged when no stale entry exists.
    pub async fn get_or_set_with_fallback<F, Fut>(
        &self,
        key: &str,
        fetch: F,
        ttl: Duration,
    ) -> Result<Cached>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        let err = match self.get_or_set(key, fetch, ttl).await {
            Ok(cached) => return Ok(cached),
            Err(err) => err,
        };

        let Some(data) = self.store.get_allow_stale(key) else {
            tracing::debug!(key, error = %err, "No stale entry to fall back to");
            return Err(err);
        };

        if err.is_rate_limited() {
            self.store.set(key, data.clone(), self.rate_limit_extension);
            tracing::info!(
                key,
                extension_secs = self.rate_limit_extension.as_secs(),
                "Upstream rate limited, serving stale data"
            );
            Ok(Cached::new(data, CacheStatus::Stale429))
        } else {
            tracing::info!(key, error = %err, "Upstream failed, serving stale data");
            Ok(Cached::new(data, CacheStatus::StaleErr))
        }
    }
}
