//! coincache - read-through HTTP response cache.
//!
//! A two-tier in-memory cache (fresh entries with per-key TTLs, plus a
//! one-hour stale copy of everything) fronted by a read-through layer that
//! falls back to stale data when the upstream rate-limits or fails. Ships
//! with a caching reverse proxy for crypto market APIs.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod cli;
pub mod core;
pub mod error;
pub mod server;
pub mod storage;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::{CacheStats, CacheStatus, CacheStore, Cached, ReadThrough};
pub use crate::core::fetch::FetchOutcome;
pub use error::{CoinCacheError, ExitCode, Result};
