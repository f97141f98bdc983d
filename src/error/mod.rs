//! Error types for coincache.
//!
//! Uses `thiserror` for structured error types that map to exit codes and
//! HTTP statuses.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized into five main categories:
//! - **Upstream**: Rate limits, non-success statuses, malformed payloads
//! - **Network**: Connection failures and timeouts talking to an upstream
//! - **Configuration**: Config file parsing, validation, or missing values
//! - **Server**: Failures of the bundled reverse proxy listener
//! - **Internal**: Unexpected errors, bugs, or unclassified issues
//!
//! The read-through layer only cares about one distinction: an upstream that
//! signalled throttling ([`CoinCacheError::is_rate_limited`]) versus every
//! other transport failure ([`CoinCacheError::is_transport_failure`]).
//!
//! Each error has a stable error code (e.g., `CC-P001`) for programmatic handling.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Upstream provider issues (rate limits, error statuses, bad payloads).
    Upstream,
    /// Network issues (timeout, connection refused, DNS).
    Network,
    /// Configuration issues (parse errors, invalid values).
    Configuration,
    /// Reverse proxy listener issues.
    Server,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Upstream => "Upstream error",
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Server => "Server error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Upstream => "P",
            Self::Network => "N",
            Self::Configuration => "C",
            Self::Server => "S",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the `coincache` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Invalid configuration or arguments
    ConfigError = 2,
    /// Listener could not be started
    BindError = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for coincache operations.
#[derive(Error, Debug)]
pub enum CoinCacheError {
    // ==========================================================================
    // Upstream errors (Category: Upstream)
    // ==========================================================================
    /// Upstream signalled throttling (HTTP 429).
    #[error("rate limited by {upstream}: {message}")]
    RateLimited {
        upstream: String,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Upstream answered with a non-success, non-429 status.
    #[error("upstream {upstream} returned HTTP {status_code}: {message}")]
    UpstreamStatus {
        upstream: String,
        status_code: u16,
        message: String,
    },

    /// Upstream body could not be decoded.
    #[error("failed to parse upstream response: {0}")]
    ParseResponse(String),

    // ==========================================================================
    // Network errors (Category: Network)
    // ==========================================================================
    /// Request timed out after the configured duration.
    #[error("request timeout after {seconds}s for {upstream}")]
    Timeout { upstream: String, seconds: u64 },

    /// Generic network failure (connection refused, DNS, reset).
    #[error("network error: {0}")]
    Network(String),

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    // ==========================================================================
    // Server errors (Category: Server)
    // ==========================================================================
    /// Proxy listener could not bind.
    #[error("failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },

    // ==========================================================================
    // I/O errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ==========================================================================
    // Generic wrapper (Category: Internal)
    // ==========================================================================
    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoinCacheError {
    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::ConfigParse { .. } | Self::ConfigInvalid { .. } => {
                ExitCode::ConfigError
            }

            Self::Bind { .. } => ExitCode::BindError,

            Self::Timeout { .. } => ExitCode::Timeout,

            Self::RateLimited { .. }
            | Self::UpstreamStatus { .. }
            | Self::ParseResponse(_)
            | Self::Network(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimited { .. } | Self::UpstreamStatus { .. } | Self::ParseResponse(_) => {
                ErrorCategory::Upstream
            }

            Self::Timeout { .. } | Self::Network(_) => ErrorCategory::Network,

            Self::Config(_) | Self::ConfigParse { .. } | Self::ConfigInvalid { .. } => {
                ErrorCategory::Configuration
            }

            Self::Bind { .. } => ErrorCategory::Server,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `CC-{category}{number}` where category is:
    /// - P: Upstream
    /// - N: Network
    /// - C: Configuration
    /// - S: Server
    /// - X: Internal
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "CC-P001",
            Self::UpstreamStatus { .. } => "CC-P002",
            Self::ParseResponse(_) => "CC-P010",

            Self::Timeout { .. } => "CC-N001",
            Self::Network(_) => "CC-N099",

            Self::ConfigParse { .. } => "CC-C001",
            Self::ConfigInvalid { .. } => "CC-C002",
            Self::Config(_) => "CC-C004",

            Self::Bind { .. } => "CC-S001",

            Self::Io(_) => "CC-X001",
            Self::Json(_) => "CC-X002",
            Self::Other(_) => "CC-X099",
        }
    }

    /// Whether the upstream explicitly throttled the request.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether this is an upstream failure other than throttling.
    ///
    /// These are the errors that make the read-through layer fall back to the
    /// stale tier without re-arming it.
    #[must_use]
    pub const fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::UpstreamStatus { .. }
                | Self::ParseResponse(_)
                | Self::Timeout { .. }
                | Self::Network(_)
        )
    }

    /// Returns the retry-after duration if this error specifies one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status a route handler should answer with when this error
    /// reaches the client.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::RateLimited { .. } => 429,
            Self::Timeout { .. } => 504,
            Self::UpstreamStatus { .. } | Self::ParseResponse(_) | Self::Network(_) => 502,
            Self::Config(_) | Self::ConfigParse { .. } | Self::ConfigInvalid { .. } => 400,
            Self::Bind { .. } | Self::Io(_) | Self::Json(_) | Self::Other(_) => 500,
        }
    }
}

/// Result type alias for coincache operations.
pub type Result<T> = std::result::Result<T, CoinCacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_limited() -> CoinCacheError {
        CoinCacheError::RateLimited {
            upstream: "coingecko".to_string(),
            retry_after: Some(Duration::from_secs(30)),
            message: "slow down".to_string(),
        }
    }

    #[test]
    fn rate_limit_is_not_a_transport_failure() {
        let err = rate_limited();
        assert!(err.is_rate_limited());
        assert!(!err.is_transport_failure());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(err.http_status(), 429);
        assert_eq!(err.error_code(), "CC-P001");
    }

    #[test]
    fn transport_failures_map_to_gateway_statuses() {
        let timeout = CoinCacheError::Timeout {
            upstream: "binance".to_string(),
            seconds: 5,
        };
        assert!(timeout.is_transport_failure());
        assert_eq!(timeout.http_status(), 504);
        assert_eq!(timeout.exit_code(), ExitCode::Timeout);

        let status = CoinCacheError::UpstreamStatus {
            upstream: "coingecko".to_string(),
            status_code: 503,
            message: "maintenance".to_string(),
        };
        assert!(status.is_transport_failure());
        assert_eq!(status.http_status(), 502);
        assert_eq!(status.category(), ErrorCategory::Upstream);

        let network = CoinCacheError::Network("connection refused".to_string());
        assert!(network.is_transport_failure());
        assert_eq!(network.category(), ErrorCategory::Network);
    }

    #[test]
    fn internal_errors_are_neither_class() {
        let err = CoinCacheError::Other(anyhow::anyhow!("boom"));
        assert!(!err.is_rate_limited());
        assert!(!err.is_transport_failure());
        assert_eq!(err.http_status(), 500);
        assert_eq!(err.category(), ErrorCategory::Internal);
    }

    #[test]
    fn error_codes_carry_category_prefix() {
        let samples = [
            rate_limited(),
            CoinCacheError::Network("x".to_string()),
            CoinCacheError::Config("x".to_string()),
            CoinCacheError::Bind {
                addr: "127.0.0.1:1".to_string(),
                message: "in use".to_string(),
            },
            CoinCacheError::Other(anyhow::anyhow!("x")),
        ];
        for err in &samples {
            let expected = format!("CC-{}", err.category().code_prefix());
            assert!(
                err.error_code().starts_with(&expected),
                "{} should start with {expected}",
                err.error_code()
            );
        }
    }

    #[test]
    fn config_errors_exit_with_config_code() {
        let err = CoinCacheError::ConfigInvalid {
            key: "cache.default_ttl_secs".to_string(),
            value: "0".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(err.exit_code(), ExitCode::ConfigError);
        assert_eq!(i32::from(err.exit_code()), 2);
        assert!(err.to_string().contains("cache.default_ttl_secs"));
    }
}
