//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// coincache - read-through cache proxy for crypto market APIs.
#[derive(Parser, Debug)]
#[command(name = "coincache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Config file path (defaults to the platform config directory)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the caching reverse proxy
    Serve(ServeArgs),

    /// Show the TTL and timeout for each data category
    Policies(PoliciesArgs),

    /// Show the resolved configuration and where each value came from
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Listen address, e.g. 127.0.0.1:8787
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Upstream base URL, e.g. <https://api.coingecko.com/api/v3>
    #[arg(long, value_name = "URL")]
    pub upstream: Option<String>,

    /// Fresh TTL in seconds for keys without a category TTL
    #[arg(long, value_name = "SECONDS")]
    pub default_ttl: Option<u64>,
}

/// Arguments for the `policies` command.
#[derive(Parser, Debug, Default)]
pub struct PoliciesArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `config` command.
#[derive(Parser, Debug, Default)]
pub struct ConfigArgs {
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Write a default config file if none exists
    #[arg(long)]
    pub write_default: bool,
}
