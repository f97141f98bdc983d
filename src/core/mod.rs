//! Upstream fetching and process-level plumbing.

pub mod fetch;
pub mod http;
pub mod logging;

pub use fetch::{BoxFetch, FetchOutcome};
pub use http::{DEFAULT_TIMEOUT, Upstream, build_client, default_client, fetch_json};
