//! Upstream fetch outcomes.
//!
//! Every fetch handed to the read-through layer resolves to a
//! [`FetchOutcome`] instead of an ad hoc error, so the cache can branch on
//! "throttled" versus "broken" without sniffing status codes.

use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::CoinCacheError;

// =============================================================================
// Fetch Outcome
// =============================================================================

/// Result of a single upstream attempt.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Upstream answered with a usable payload.
    Success(Value),
    /// Upstream signalled throttling (HTTP 429).
    RateLimited {
        /// Upstream name, for logs and error messages.
        upstream: String,
        /// `Retry-After` hint, when the upstream sent one.
        retry_after: Option<Duration>,
        /// Body or reason text.
        message: String,
    },
    /// Anything else: network error, timeout, non-2xx status, bad payload.
    TransportError(CoinCacheError),
}

impl FetchOutcome {
    /// Create a rate-limited outcome.
    #[must_use]
    pub fn rate_limited(upstream: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            upstream: upstream.into(),
            retry_after,
            message: "too many requests".to_string(),
        }
    }

    /// Whether the fetch succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::RateLimited { .. } => "rate_limited",
            Self::TransportError(_) => "transport_error",
        }
    }

    /// Collapse the outcome into a plain result.
    ///
    /// # Errors
    ///
    /// Returns [`CoinCacheError::RateLimited`] for a throttled fetch and the
    /// carried error for a transport failure.
    pub fn into_result(self) -> crate::Result<Value> {
        match self {
            Self::Success(value) => Ok(value),
            Self::RateLimited {
                upstream,
                retry_after,
                message,
            } => Err(CoinCacheError::RateLimited {
                upstream,
                retry_after,
                message,
            }),
            Self::TransportError(err) => Err(err),
        }
    }
}

impl From<crate::Result<Value>> for FetchOutcome {
    /// Classify a plain result: a [`CoinCacheError::RateLimited`] error becomes
    /// [`FetchOutcome::RateLimited`], every other error a transport failure.
    fn from(result: crate::Result<Value>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(CoinCacheError::RateLimited {
                upstream,
                retry_after,
                message,
            }) => Self::RateLimited {
                upstream,
                retry_after,
                message,
            },
            Err(err) => Self::TransportError(err),
        }
    }
}

/// Boxed fetch future, for call sites that pick the fetch at runtime.
pub type BoxFetch = BoxFuture<'static, FetchOutcome>;
