//! Config command implementation.

use serde::Serialize;

use crate::cli::args::{Cli, ConfigArgs};
use crate::error::Result;
use crate::storage::config::{Config, ConfigSource, ResolvedConfig};

/// Printable view of a resolved configuration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigReport<'a> {
    config_path: String,
    config_exists: bool,
    bind: Sourced<String>,
    upstream: Sourced<&'a str>,
    upstream_name: &'a str,
    default_ttl_secs: Sourced<u64>,
    stale_ttl_secs: u64,
    rate_limit_extension_secs: u64,
    sweep_interval_secs: u64,
    max_keys: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Sourced<T> {
    value: T,
    source: ConfigSource,
}

/// Execute the config command.
pub fn execute(cli: &Cli, args: &ConfigArgs) -> Result<()> {
    let path = ResolvedConfig::config_path(cli);

    if args.write_default {
        if path.exists() {
            println!("Config already exists: {}", path.display());
        } else {
            Config::default().save_to(&path)?;
            println!("Wrote default config: {}", path.display());
        }
    }

    let resolved = ResolvedConfig::resolve(cli, None)?;
    let report = build_report(&resolved);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(&report));
    }
    Ok(())
}

fn build_report(resolved: &ResolvedConfig) -> ConfigReport<'_> {
    ConfigReport {
        config_path: resolved.config_path.display().to_string(),
        config_exists: resolved.config_path.exists(),
        bind: Sourced {
            value: resolved.bind.to_string(),
            source: resolved.sources.bind,
        },
        upstream: Sourced {
            value: resolved.upstream_base_url.as_str(),
            source: resolved.sources.upstream,
        },
        upstream_name: &resolved.upstream_name,
        default_ttl_secs: Sourced {
            value: resolved.store.default_ttl.as_secs(),
            source: resolved.sources.default_ttl,
        },
        stale_ttl_secs: resolved.store.stale_ttl.as_secs(),
        rate_limit_extension_secs: resolved.rate_limit_extension.as_secs(),
        sweep_interval_secs: resolved.sweep_interval.as_secs(),
        max_keys: resolved.store.max_keys,
    }
}

fn render_text(report: &ConfigReport<'_>) -> String {
    let exists = if report.config_exists { "" } else { " (not found)" };
    let max_keys = report
        .max_keys
        .map_or_else(|| "unbounded".to_string(), |n| n.to_string());
    format!(
        "Config file:          {}{exists}\n\
         Bind:                 {} ({})\n\
         Upstream:             {} [{}] ({})\n\
         Default TTL:          {}s ({})\n\
         Stale TTL:            {}s\n\
         Rate-limit extension: {}s\n\
         Sweep interval:       {}s\n\
         Max keys:             {max_keys}\n",
        report.config_path,
        report.bind.value,
        report.bind.source,
        report.upstream.value,
        report.upstream_name,
        report.upstream.source,
        report.default_ttl_secs.value,
        report.default_ttl_secs.source,
        report.stale_ttl_secs,
        report.rate_limit_extension_secs,
        report.sweep_interval_secs,
    )
}
