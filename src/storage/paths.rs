//! Application paths for config.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl AppPaths {
    /// Create paths for the coincache application.
    #[must_use]
    pub fn new() -> Self {
        ProjectDirs::from("dev", "coincache", "coincache").map_or_else(
            || Self {
                config: PathBuf::from(".coincache"),
            },
            |proj_dirs| Self {
                config: proj_dirs.config_dir().to_path_buf(),
            },
        )
    }

    /// Path to the TOML config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }
}
