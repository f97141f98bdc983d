//! Policies command implementation.

use std::fmt::Write as _;

use crate::cache::PolicyRow;
use crate::cli::args::{Cli, PoliciesArgs};
use crate::error::Result;
use crate::storage::config::ResolvedConfig;

/// Execute the policies command.
pub fn execute(cli: &Cli, args: &PoliciesArgs) -> Result<()> {
    let config = ResolvedConfig::resolve(cli, None)?;
    let rows = config.ttl_policy.rows();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", render_table(&rows));
    }
    Ok(())
}

/// Render policy rows as a plain table.
#[must_use]
pub fn render_table(rows: &[PolicyRow]) -> String {
    let mut out = format!("{:<14} {:>8} {:>9}\n", "CATEGORY", "TTL", "TIMEOUT");
    for row in rows {
        let marker = if row.overridden { " *" } else { "" };
        let _ = writeln!(
            out,
            "{:<14} {:>7}s {:>8}s{marker}",
            row.category.as_str(),
            row.ttl_secs,
            row.timeout_secs,
        );
    }
    if rows.iter().any(|r| r.overridden) {
        out.push_str("\n* TTL set in config\n");
    }
    out
}
