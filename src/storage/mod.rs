//! Configuration storage.

pub mod config;
pub mod paths;

pub use config::{
    Config, ConfigSource, ConfigSources, ENV_BIND, ENV_CONFIG, ENV_DEFAULT_TTL, ENV_UPSTREAM,
    ResolvedConfig,
};
pub use paths::AppPaths;
