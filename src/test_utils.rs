//! Test utilities for coincache.
//!
//! Payload factories, a call-counting fetch double, temporary directories
//! and assertion macros shared by unit and integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use coincache::test_utils::*;
//!
//! let upstream = CountingFetch::new();
//! let fetch = upstream.returning(FetchOutcome::Success(make_test_price("bitcoin", 50_000.0)));
//! let dir = TestDir::new();
//! dir.create_file("config.toml", &make_test_config_toml());
//! ```

use std::fs;
use std::future::{Ready, ready};
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use crate::core::fetch::FetchOutcome;
use crate::error::CoinCacheError;

// =============================================================================
// Payload Factories
// =============================================================================

/// A `simple/price` style payload for one coin.
#[must_use]
pub fn make_test_price(coin: &str, usd: f64) -> Value {
    let mut payload = serde_json::Map::new();
    payload.insert(coin.to_string(), json!({ "usd": usd }));
    Value::Object(payload)
}

/// A `coins/markets` style page of `per_page` coins.
#[must_use]
pub fn make_test_market_page(page: u32, per_page: u32) -> Value {
    let start = page.saturating_sub(1) * per_page;
    Value::Array(
        (start..start + per_page)
            .map(|rank| {
                json!({
                    "id": format!("coin-{}", rank + 1),
                    "market_cap_rank": rank + 1,
                    "current_price": 1000.0 / f64::from(rank + 1),
                })
            })
            .collect(),
    )
}

/// A rate-limited outcome with a `Retry-After` of `secs`.
#[must_use]
pub fn make_test_rate_limited(secs: u64) -> FetchOutcome {
    FetchOutcome::rate_limited("test-upstream", Some(Duration::from_secs(secs)))
}

/// A transport failure (upstream answered 503).
#[must_use]
pub fn make_test_transport_error() -> FetchOutcome {
    FetchOutcome::TransportError(CoinCacheError::UpstreamStatus {
        upstream: "test-upstream".to_string(),
        status_code: 503,
        message: "Service Unavailable".to_string(),
    })
}

// =============================================================================
// Fetch Doubles
// =============================================================================

/// Counts how many times fetches built from it actually ran.
///
/// ```rust,ignore
/// let upstream = CountingFetch::new();
/// read_through.get_or_set("k", upstream.returning(outcome), ttl).await?;
/// assert_eq!(upstream.calls(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CountingFetch {
    calls: Arc<AtomicUsize>,
}

impl CountingFetch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetch that records its invocation and resolves to `outcome`.
    pub fn returning(&self, outcome: FetchOutcome) -> impl FnOnce() -> Ready<FetchOutcome> + use<> {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            ready(outcome)
        }
    }

    /// Number of fetches that ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Temporary Directory Helper
// =============================================================================

/// Isolated temporary directory for tests, removed on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file with the given content, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }

        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
    }

    /// Read a file from the temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    /// Get the full path to a file in the temporary directory.
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Sample config TOML content.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[cache]
default_ttl_secs = 30
stale_ttl_secs = 1800
max_keys = 1000

[upstream]
name = "coingecko"
base_url = "https://api.coingecko.com/api/v3"

[server]
bind = "127.0.0.1:18787"

[ttl]
prices = 10
trending = 1200
"#
    .to_string()
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string is JSON equal to `expected`.
#[macro_export]
macro_rules! assert_json_eq {
    ($json:expr, $expected:expr) => {
        let json = $json;
        let parsed: serde_json::Value = serde_json::from_str(json).expect("Invalid JSON");
        let expected: serde_json::Value = $expected;
        assert_eq!(
            parsed,
            expected,
            "JSON mismatch\n\nExpected:\n{}\n\nActual:\n{}",
            serde_json::to_string_pretty(&expected).unwrap(),
            serde_json::to_string_pretty(&parsed).unwrap()
        );
    };
}
