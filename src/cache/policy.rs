//! Per-category TTL and timeout policy.
//!
//! Market data goes stale at very different rates: a spot price is worth
//! caching for seconds, a trending list for minutes. Each [`DataCategory`]
//! carries its own fresh TTL and upstream timeout; config can override the
//! TTLs.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::store::DEFAULT_TTL;

/// Kind of upstream data a cache key holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    /// Spot prices (`simple/price`).
    Prices,
    /// Paginated coin lists (`coins/markets`, `coins/list`).
    Markets,
    /// Single-coin detail (`coins/{id}`).
    CoinDetail,
    /// Historical series (`market_chart`, `ohlc`, `history`).
    Chart,
    /// Global market stats.
    Global,
    /// Trending searches.
    Trending,
    /// Exchange order-book tickers.
    Tickers,
    /// Prediction oracle answers.
    Predictions,
    /// Anything unclassified.
    Other,
}

impl DataCategory {
    /// All categories in display order.
    pub const ALL: [Self; 9] = [
        Self::Prices,
        Self::Markets,
        Self::CoinDetail,
        Self::Chart,
        Self::Global,
        Self::Trending,
        Self::Tickers,
        Self::Predictions,
        Self::Other,
    ];

    /// Config/CLI name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prices => "prices",
            Self::Markets => "markets",
            Self::CoinDetail => "coin_detail",
            Self::Chart => "chart",
            Self::Global => "global",
            Self::Trending => "trending",
            Self::Tickers => "tickers",
            Self::Predictions => "predictions",
            Self::Other => "other",
        }
    }

    /// Look up a category by its config name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Built-in fresh TTL. `None` means the cache-wide default applies.
    #[must_use]
    pub const fn builtin_ttl(self) -> Option<Duration> {
        match self {
            Self::Tickers => Some(Duration::from_secs(15)),
            Self::Prices => Some(Duration::from_secs(30)),
            Self::Markets | Self::Other => None,
            Self::CoinDetail => Some(Duration::from_secs(120)),
            Self::Chart | Self::Global => Some(Duration::from_secs(300)),
            Self::Trending => Some(Duration::from_secs(600)),
            Self::Predictions => Some(Duration::from_secs(900)),
        }
    }

    /// Upstream request timeout.
    #[must_use]
    pub const fn timeout(self) -> Duration {
        match self {
            Self::Tickers => Duration::from_secs(2),
            Self::Prices => Duration::from_secs(5),
            Self::Markets | Self::CoinDetail | Self::Global | Self::Trending | Self::Other => {
                Duration::from_secs(10)
            }
            Self::Chart | Self::Predictions => Duration::from_secs(15),
        }
    }

    /// Classify an upstream path such as `/coins/bitcoin/market_chart`.
    #[must_use]
    pub fn classify_path(path: &str) -> Self {
        let segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            ["simple", "price" | "token_price", ..] => Self::Prices,
            ["coins", "markets" | "list", ..] => Self::Markets,
            ["coins", _, "market_chart" | "ohlc" | "history", ..] => Self::Chart,
            ["coins", _, "tickers", ..] | ["exchanges", ..] | ["ticker" | "depth", ..] => {
                Self::Tickers
            }
            ["coins", _] => Self::CoinDetail,
            ["global", ..] => Self::Global,
            ["search", "trending", ..] => Self::Trending,
            ["predict" | "predictions" | "oracle", ..] => Self::Predictions,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved TTLs, built-in defaults plus configured overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    default_ttl: Duration,
    overrides: BTreeMap<DataCategory, Duration>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            overrides: BTreeMap::new(),
        }
    }
}

impl TtlPolicy {
    /// Policy with the built-in TTL for every category.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy with per-category overrides in seconds.
    #[must_use]
    pub fn with_overrides(overrides: &BTreeMap<DataCategory, u64>) -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            overrides: overrides
                .iter()
                .map(|(category, secs)| (*category, Duration::from_secs(*secs)))
                .collect(),
        }
    }

    /// Use `ttl` for categories without a built-in TTL.
    #[must_use]
    pub const fn with_default(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// TTL applied to categories without a built-in or configured TTL.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fresh TTL for a category: config override, then built-in, then the
    /// cache-wide default.
    #[must_use]
    pub fn ttl_for(&self, category: DataCategory) -> Duration {
        self.overrides
            .get(&category)
            .copied()
            .or_else(|| category.builtin_ttl())
            .unwrap_or(self.default_ttl)
    }

    /// Whether the TTL for `category` comes from config.
    #[must_use]
    pub fn is_overridden(&self, category: DataCategory) -> bool {
        self.overrides.contains_key(&category)
    }

    /// One row per category, for `coincache policies`.
    #[must_use]
    pub fn rows(&self) -> Vec<PolicyRow> {
        DataCategory::ALL
            .iter()
            .map(|&category| PolicyRow {
                category,
                ttl_secs: self.ttl_for(category).as_secs(),
                timeout_secs: category.timeout().as_secs(),
                overridden: self.is_overridden(category),
            })
            .collect()
    }
}

/// Printable policy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRow {
    pub category: DataCategory,
    pub ttl_secs: u64,
    pub timeout_secs: u64,
    pub overridden: bool,
}
