//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/coincache/config.toml`
//! - macOS: `~/Library/Application Support/dev.coincache.coincache/config.toml`
//! - Windows: `%APPDATA%/coincache/coincache/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `COINCACHE_BIND`: Proxy listen address (e.g., "127.0.0.1:8787")
//! - `COINCACHE_UPSTREAM`: Upstream base URL
//! - `COINCACHE_DEFAULT_TTL`: Default fresh TTL in seconds
//! - `COINCACHE_CONFIG`: Override config file path

use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cache::{DataCategory, StoreOptions, TtlPolicy};
use crate::cli::args::{Cli, ServeArgs};
use crate::error::{CoinCacheError, Result};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable for the proxy listen address.
pub const ENV_BIND: &str = "COINCACHE_BIND";
/// Environment variable for the upstream base URL.
pub const ENV_UPSTREAM: &str = "COINCACHE_UPSTREAM";
/// Environment variable for the default fresh TTL in seconds.
pub const ENV_DEFAULT_TTL: &str = "COINCACHE_DEFAULT_TTL";
/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "COINCACHE_CONFIG";

/// Longest fresh TTL accepted anywhere (one day).
const MAX_TTL_SECS: u64 = 86_400;

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Path the config file was read from (it may not exist).
    pub config_path: PathBuf,
    /// Store TTLs and capacity.
    pub store: StoreOptions,
    /// Fresh-tier re-arm after an upstream 429.
    pub rate_limit_extension: Duration,
    /// Interval between expired-entry sweeps.
    pub sweep_interval: Duration,
    /// Per-category fresh TTLs.
    pub ttl_policy: TtlPolicy,
    /// Upstream name for logs and errors.
    pub upstream_name: String,
    /// Upstream base URL.
    pub upstream_base_url: String,
    /// Proxy listen address.
    pub bind: SocketAddr,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each overridable configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub bind: ConfigSource,
    pub upstream: ConfigSource,
    pub default_ttl: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI args, environment variables, and
    /// config file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file exists but is invalid
    /// - Any resolved value is out of bounds or unparsable
    pub fn resolve(cli: &Cli, serve_args: Option<&ServeArgs>) -> Result<Self> {
        let config_path = Self::config_path(cli);
        let config = Config::load_from(&config_path)?;
        config.validate()?;
        Self::from_config(config, config_path, serve_args)
    }

    /// Merge an already loaded config with CLI flags and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a CLI or environment override is invalid.
    pub fn from_config(
        config: Config,
        config_path: PathBuf,
        serve_args: Option<&ServeArgs>,
    ) -> Result<Self> {
        let mut sources = ConfigSources::default();

        let bind = Self::resolve_bind(serve_args, &config, &mut sources.bind)?;
        let upstream_base_url = Self::resolve_upstream(serve_args, &config, &mut sources.upstream)?;
        let default_ttl = Self::resolve_default_ttl(serve_args, &config, &mut sources.default_ttl)?;

        let store = StoreOptions {
            default_ttl,
            stale_ttl: Duration::from_secs(config.cache.stale_ttl_secs),
            max_keys: config.cache.max_keys,
        };
        if store.stale_ttl < default_ttl {
            return Err(CoinCacheError::ConfigInvalid {
                key: "cache.stale_ttl_secs".to_string(),
                value: config.cache.stale_ttl_secs.to_string(),
                message: format!(
                    "must be at least the default TTL ({}s)",
                    default_ttl.as_secs()
                ),
            });
        }

        Ok(Self {
            config_path,
            store,
            rate_limit_extension: Duration::from_secs(config.cache.rate_limit_extension_secs),
            sweep_interval: Duration::from_secs(config.cache.sweep_interval_secs),
            ttl_policy: TtlPolicy::with_overrides(&config.ttl_overrides()?)
                .with_default(default_ttl),
            upstream_name: config.upstream.name,
            upstream_base_url,
            bind,
            sources,
        })
    }

    /// Config file path: `--config`, then `COINCACHE_CONFIG`, then the
    /// platform default.
    #[must_use]
    pub fn config_path(cli: &Cli) -> PathBuf {
        if let Some(path) = &cli.config {
            return path.clone();
        }
        std::env::var(ENV_CONFIG).map_or_else(|_| AppPaths::new().config_file(), PathBuf::from)
    }

    /// Resolve the listen address.
    fn resolve_bind(
        serve_args: Option<&ServeArgs>,
        config: &Config,
        source: &mut ConfigSource,
    ) -> Result<SocketAddr> {
        // 1. CLI flag
        if let Some(bind) = serve_args.and_then(|a| a.bind.as_deref()) {
            *source = ConfigSource::Cli;
            return parse_bind("--bind", bind);
        }

        // 2. Environment variable
        if let Ok(bind) = std::env::var(ENV_BIND) {
            *source = ConfigSource::Env;
            return parse_bind(ENV_BIND, &bind);
        }

        // 3. Config file / default
        *source = if config.server.bind == ServerConfig::default().bind {
            ConfigSource::Default
        } else {
            ConfigSource::ConfigFile
        };
        parse_bind("server.bind", &config.server.bind)
    }

    /// Resolve the upstream base URL.
    fn resolve_upstream(
        serve_args: Option<&ServeArgs>,
        config: &Config,
        source: &mut ConfigSource,
    ) -> Result<String> {
        // 1. CLI flag
        if let Some(url) = serve_args.and_then(|a| a.upstream.as_deref()) {
            *source = ConfigSource::Cli;
            return validate_base_url("--upstream", url);
        }

        // 2. Environment variable
        if let Ok(url) = std::env::var(ENV_UPSTREAM) {
            *source = ConfigSource::Env;
            return validate_base_url(ENV_UPSTREAM, &url);
        }

        // 3. Config file / default
        *source = if config.upstream.base_url == UpstreamConfig::default().base_url {
            ConfigSource::Default
        } else {
            ConfigSource::ConfigFile
        };
        validate_base_url("upstream.base_url", &config.upstream.base_url)
    }

    /// Resolve the default fresh TTL.
    fn resolve_default_ttl(
        serve_args: Option<&ServeArgs>,
        config: &Config,
        source: &mut ConfigSource,
    ) -> Result<Duration> {
        // 1. CLI flag
        if let Some(secs) = serve_args.and_then(|a| a.default_ttl) {
            *source = ConfigSource::Cli;
            return ttl_in_bounds("--default-ttl", secs);
        }

        // 2. Environment variable
        if let Ok(raw) = std::env::var(ENV_DEFAULT_TTL) {
            *source = ConfigSource::Env;
            let secs = raw.trim().parse::<u64>().map_err(|_| CoinCacheError::ConfigInvalid {
                key: ENV_DEFAULT_TTL.to_string(),
                value: raw.clone(),
                message: "expected a number of seconds".to_string(),
            })?;
            return ttl_in_bounds(ENV_DEFAULT_TTL, secs);
        }

        // 3. Config file / default
        *source = if config.cache.default_ttl_secs == CacheConfig::default().default_ttl_secs {
            ConfigSource::Default
        } else {
            ConfigSource::ConfigFile
        };
        ttl_in_bounds("cache.default_ttl_secs", config.cache.default_ttl_secs)
    }
}

fn parse_bind(key: &str, value: &str) -> Result<SocketAddr> {
    value
        .trim()
        .parse::<SocketAddr>()
        .map_err(|e| CoinCacheError::ConfigInvalid {
            key: key.to_string(),
            value: value.to_string(),
            message: e.to_string(),
        })
}

fn validate_base_url(key: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(CoinCacheError::ConfigInvalid {
            key: key.to_string(),
            value: value.to_string(),
            message: "must start with http:// or https://".to_string(),
        })
    }
}

fn ttl_in_bounds(key: &str, secs: u64) -> Result<Duration> {
    if secs == 0 || secs > MAX_TTL_SECS {
        return Err(CoinCacheError::ConfigInvalid {
            key: key.to_string(),
            value: secs.to_string(),
            message: format!("must be between 1 and {MAX_TTL_SECS} seconds"),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache tiers and sweeping.
    pub cache: CacheConfig,
    /// Upstream provider.
    pub upstream: UpstreamConfig,
    /// Reverse proxy listener.
    pub server: ServerConfig,
    /// Per-category fresh TTL overrides in seconds, keyed by category name.
    pub ttl: BTreeMap<String, u64>,
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Fresh TTL when none is given.
    pub default_ttl_secs: u64,
    /// Stale tier TTL.
    pub stale_ttl_secs: u64,
    /// Fresh-tier re-arm after a 429.
    pub rate_limit_extension_secs: u64,
    /// Interval between expired-entry sweeps.
    pub sweep_interval_secs: u64,
    /// Maximum fresh-tier keys (unbounded when absent).
    pub max_keys: Option<usize>,
}

/// Upstream settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Name used in logs and errors.
    pub name: String,
    /// Base URL requests are forwarded to.
    pub base_url: String,
}

/// Reverse proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: crate::cache::DEFAULT_TTL.as_secs(),
            stale_ttl_secs: crate::cache::STALE_TTL.as_secs(),
            rate_limit_extension_secs: crate::cache::RATE_LIMIT_EXTENSION.as_secs(),
            sweep_interval_secs: crate::cache::DEFAULT_SWEEP_INTERVAL.as_secs(),
            max_keys: None,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            name: "coingecko".to_string(),
            base_url: "https://api.coingecko.com/api/v3".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().config_file())
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CoinCacheError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CoinCacheError::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// Checks that:
    /// - TTLs are within 1 second and one day (stale tier: up to a week)
    /// - The rate-limit extension does not outlive the stale tier
    /// - The sweep interval and key capacity are positive
    ///
    /// # Errors
    ///
    /// Returns [`CoinCacheError::ConfigInvalid`] naming the first bad key.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, value: String, message: &str| CoinCacheError::ConfigInvalid {
            key: key.to_string(),
            value,
            message: message.to_string(),
        };

        ttl_in_bounds("cache.default_ttl_secs", self.cache.default_ttl_secs)?;

        if self.cache.stale_ttl_secs == 0 || self.cache.stale_ttl_secs > 7 * MAX_TTL_SECS {
            return Err(invalid(
                "cache.stale_ttl_secs",
                self.cache.stale_ttl_secs.to_string(),
                "must be between 1 second and 7 days",
            ));
        }

        if self.cache.rate_limit_extension_secs == 0
            || self.cache.rate_limit_extension_secs > self.cache.stale_ttl_secs
        {
            return Err(invalid(
                "cache.rate_limit_extension_secs",
                self.cache.rate_limit_extension_secs.to_string(),
                "must be positive and no longer than the stale TTL",
            ));
        }

        if self.cache.sweep_interval_secs == 0 {
            return Err(invalid(
                "cache.sweep_interval_secs",
                "0".to_string(),
                "must be positive",
            ));
        }

        if self.cache.max_keys == Some(0) {
            return Err(invalid("cache.max_keys", "0".to_string(), "must be positive"));
        }

        self.ttl_overrides()?;

        Ok(())
    }

    /// Parse the `[ttl]` table into categories.
    ///
    /// # Errors
    ///
    /// Returns [`CoinCacheError::ConfigInvalid`] for an unknown category or
    /// an out-of-bounds TTL.
    pub fn ttl_overrides(&self) -> Result<BTreeMap<DataCategory, u64>> {
        self.ttl
            .iter()
            .map(|(name, secs)| {
                let key = format!("ttl.{name}");
                let category =
                    DataCategory::from_name(name).ok_or_else(|| CoinCacheError::ConfigInvalid {
                        key: key.clone(),
                        value: secs.to_string(),
                        message: format!(
                            "unknown category. Valid categories: {}",
                            DataCategory::ALL.map(DataCategory::as_str).join(", ")
                        ),
                    })?;
                ttl_in_bounds(&key, *secs)?;
                Ok((category, *secs))
            })
            .collect()
    }
}
