//! Two-tier response cache and the read-through layer on top of it.

pub mod policy;
pub mod read_through;
pub mod store;
pub mod sweeper;

pub use policy::{DataCategory, PolicyRow, TtlPolicy};
pub use read_through::{Cached, CacheStatus, RATE_LIMIT_EXTENSION, ReadThrough};
pub use store::{CacheStats, CacheStore, DEFAULT_TTL, EntryInfo, STALE_TTL, StoreOptions};
pub use sweeper::{DEFAULT_SWEEP_INTERVAL, SweeperHandle};
