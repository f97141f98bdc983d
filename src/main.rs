//! coincache - read-through cache proxy.
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::{CommandFactory, Parser};
use std::process::ExitCode;

use coincache::cli::{Cli, Commands};
use coincache::core::logging::LogSettings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    LogSettings::resolve(cli.log_level.as_deref(), cli.json_output, cli.verbose).init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{}", e);
            eprintln!("error [{}]: {e}", e.error_code());
            ExitCode::from(u8::try_from(i32::from(e.exit_code())).unwrap_or(1))
        }
    }
}

async fn run(cli: &Cli) -> coincache::Result<()> {
    match &cli.command {
        None => {
            print_quickstart();
            Ok(())
        }

        Some(Commands::Serve(args)) => coincache::cli::serve::execute(cli, args).await,

        Some(Commands::Policies(args)) => coincache::cli::policies::execute(cli, args),

        Some(Commands::Config(args)) => coincache::cli::config::execute(cli, args),

        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "coincache", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Print quickstart help when no command is given.
fn print_quickstart() {
    println!(
        r"coincache - read-through cache proxy for crypto market APIs

USAGE:
    coincache [OPTIONS] <COMMAND>

COMMANDS:
    serve        Run the caching reverse proxy
    policies     Show the TTL and timeout for each data category
    config       Show the resolved configuration
    completions  Generate shell completions

QUICK START:
    coincache serve                                  # Proxy CoinGecko on 127.0.0.1:8787
    curl -i localhost:8787/api/simple/price?ids=bitcoin&vs_currencies=usd
    curl localhost:8787/cache/stats                  # Hit/miss counters

The X-Cache response header tells you where data came from:
    HIT, MISS, STALE429 (upstream throttled), STALEERR (upstream failed)

For more help: coincache --help
"
    );
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
}
