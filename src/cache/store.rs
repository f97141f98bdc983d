//! Two-tier in-memory cache store.
//!
//! Every key lives in up to two tiers:
//! - the **fresh** tier, with a per-write TTL, answers normal reads;
//! - the **stale** tier, with one long fixed TTL, is only consulted when a
//!   caller explicitly allows stale data (upstream throttled or failing).
//!
//! Both tiers sit behind a single mutex so a `set` is observed atomically:
//! no reader can see the fresh tier updated while the stale tier still holds
//! the previous value. The lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Fresh-tier TTL used when a caller does not pick one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
/// Stale-tier TTL written alongside every fresh write.
pub const STALE_TTL: Duration = Duration::from_secs(3600);

/// Tuning knobs for a [`CacheStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Fresh TTL for [`CacheStore::set_default`].
    pub default_ttl: Duration,
    /// TTL of the stale tier.
    pub stale_ttl: Duration,
    /// Maximum number of fresh-tier keys. `None` means unbounded.
    pub max_keys: Option<usize>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            stale_ttl: STALE_TTL,
            max_keys: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
    cached_at: DateTime<Utc>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct Tiers {
    fresh: HashMap<String, Entry>,
    stale: HashMap<String, Entry>,
}

impl Tiers {
    /// Drop expired entries from both tiers, returning how many went.
    fn purge(&mut self, now: Instant) -> usize {
        let before = self.fresh.len() + self.stale.len();
        self.fresh.retain(|_, e| e.is_live(now));
        self.stale.retain(|_, e| e.is_live(now));
        before - (self.fresh.len() + self.stale.len())
    }
}

/// Cumulative store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Live fresh-tier keys right now.
    pub keys: usize,
    /// Fresh-tier lookups that found a live entry.
    pub hits: u64,
    /// Fresh-tier lookups that found nothing live.
    pub misses: u64,
    /// Lookups answered from the stale tier.
    pub stale_hits: u64,
}

/// Snapshot of one fresh-tier entry, for admin listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInfo {
    pub key: String,
    pub cached_at: DateTime<Utc>,
    pub ttl_remaining_secs: u64,
    pub has_stale: bool,
}

/// Tier-aware key-value store with TTL expiry.
///
/// Shared between request handlers as `Arc<CacheStore>`.
#[derive(Debug)]
pub struct CacheStore {
    tiers: Mutex<Tiers>,
    options: StoreOptions,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_hits: AtomicU64,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    /// Create a store with the default TTLs.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    /// Create a store with explicit options.
    #[must_use]
    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            tiers: Mutex::new(Tiers::default()),
            options,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale_hits: AtomicU64::new(0),
        }
    }

    /// Options this store was built with.
    #[must_use]
    pub const fn options(&self) -> StoreOptions {
        self.options
    }

    fn lock(&self) -> MutexGuard<'_, Tiers> {
        // Every critical section leaves both maps consistent, so a poisoned
        // lock still guards valid data.
        self.tiers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh-tier lookup. Never falls through to the stale tier.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut tiers = self.lock();
        self.lookup_fresh(&mut tiers, key, Instant::now())
    }

    /// Fresh-tier lookup that falls back to the stale tier on a miss.
    #[must_use]
    pub fn get_allow_stale(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut tiers = self.lock();
        if let Some(value) = self.lookup_fresh(&mut tiers, key, now) {
            return Some(value);
        }

        match tiers.stale.get(key) {
            Some(entry) if entry.is_live(now) => {
                self.stale_hits.fetch_add(1, Ordering::Relaxed);
                let age_secs = (Utc::now() - entry.cached_at).num_seconds().max(0);
                tracing::info!(key, age_secs, "Falling back to stale cache entry");
                Some(entry.value.clone())
            }
            Some(_) => {
                tiers.stale.remove(key);
                None
            }
            None => None,
        }
    }

    fn lookup_fresh(&self, tiers: &mut Tiers, key: &str, now: Instant) -> Option<Value> {
        match tiers.fresh.get(key) {
            Some(entry) if entry.is_live(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                tiers.fresh.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` under `key` with the default fresh TTL.
    pub fn set_default(&self, key: &str, value: Value) -> bool {
        self.set(key, value, self.options.default_ttl)
    }

    /// Store `value` in the fresh tier for `ttl` and in the stale tier for
    /// the stale TTL.
    ///
    /// The stale write always happens. Returns whether the fresh write
    /// succeeded: it is refused for a zero `ttl`, or for a new key once
    /// `max_keys` live keys are stored.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) -> bool {
        let now = Instant::now();
        let cached_at = Utc::now();
        let mut tiers = self.lock();

        let fresh_ok = !ttl.is_zero() && self.has_room(&mut tiers, key, now);
        if fresh_ok {
            tiers.fresh.insert(
                key.to_string(),
                Entry {
                    value: value.clone(),
                    expires_at: now + ttl,
                    cached_at,
                },
            );
        } else {
            tracing::debug!(key, ttl_secs = ttl.as_secs(), "Fresh cache write refused");
        }

        tiers.stale.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + self.options.stale_ttl,
                cached_at,
            },
        );

        tracing::trace!(key, ttl_secs = ttl.as_secs(), fresh_ok, "Cache set");
        fresh_ok
    }

    fn has_room(&self, tiers: &mut Tiers, key: &str, now: Instant) -> bool {
        let Some(max_keys) = self.options.max_keys else {
            return true;
        };
        if tiers.fresh.contains_key(key) || tiers.fresh.len() < max_keys {
            return true;
        }
        tiers.fresh.retain(|_, e| e.is_live(now));
        tiers.fresh.len() < max_keys
    }

    /// Remove `key` from the fresh tier. The stale copy stays available for
    /// fallback. Returns the number of entries removed.
    pub fn del(&self, key: &str) -> usize {
        usize::from(self.lock().fresh.remove(key).is_some())
    }

    /// Whether a live fresh-tier entry exists. Does not touch the counters.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock().fresh.get(key).is_some_and(|e| e.is_live(now))
    }

    /// Whether a live stale-tier entry exists.
    #[must_use]
    pub fn has_stale(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock().stale.get(key).is_some_and(|e| e.is_live(now))
    }

    /// Live fresh-tier keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .lock()
            .fresh
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Live fresh-tier entries with their metadata, sorted by key.
    #[must_use]
    pub fn entries(&self) -> Vec<EntryInfo> {
        let now = Instant::now();
        let tiers = self.lock();
        let mut entries: Vec<EntryInfo> = tiers
            .fresh
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(key, e)| EntryInfo {
                key: key.clone(),
                cached_at: e.cached_at,
                ttl_remaining_secs: e.expires_at.saturating_duration_since(now).as_secs(),
                has_stale: tiers.stale.get(key).is_some_and(|s| s.is_live(now)),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Counters since construction (or the last [`flush_all`](Self::flush_all)).
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let keys = self
            .lock()
            .fresh
            .values()
            .filter(|e| e.is_live(now))
            .count();
        CacheStats {
            keys,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
        }
    }

    /// Clear the fresh tier. Stale copies are kept so fallback keeps working
    /// after an invalidation.
    pub fn flush(&self) {
        let mut tiers = self.lock();
        let removed = tiers.fresh.len();
        tiers.fresh.clear();
        tracing::info!(removed, "Flushed fresh cache tier");
    }

    /// Clear both tiers and reset the counters.
    pub fn flush_all(&self) {
        {
            let mut tiers = self.lock();
            tiers.fresh.clear();
            tiers.stale.clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.stale_hits.store(0, Ordering::Relaxed);
        tracing::info!("Flushed all cache tiers");
    }

    /// Remove expired entries from both tiers. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.lock().purge(Instant::now())
    }
}
