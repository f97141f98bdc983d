//! Serve command implementation.

use std::sync::Arc;

use crate::cache::{CacheStore, ReadThrough, SweeperHandle};
use crate::cli::args::{Cli, ServeArgs};
use crate::core::http::{Upstream, default_client};
use crate::error::Result;
use crate::server::{ProxyServer, ProxyState};
use crate::storage::config::ResolvedConfig;

/// Execute the serve command.
///
/// Runs until Ctrl-C, then stops the sweeper.
pub async fn execute(cli: &Cli, args: &ServeArgs) -> Result<()> {
    let config = ResolvedConfig::resolve(cli, Some(args))?;
    tracing::debug!(
        bind = %config.bind,
        bind_source = %config.sources.bind,
        upstream = %config.upstream_base_url,
        upstream_source = %config.sources.upstream,
        "Resolved serve configuration"
    );

    let server = build_server(&config).await?;
    let sweeper = SweeperHandle::spawn(
        Arc::clone(server.state().read_through.store()),
        config.sweep_interval,
    );

    server.run().await;
    sweeper.shutdown().await
}

/// Bind a proxy for a resolved configuration.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the address
/// cannot be bound.
pub async fn build_server(config: &ResolvedConfig) -> Result<ProxyServer> {
    let store = Arc::new(CacheStore::with_options(config.store));
    let read_through =
        ReadThrough::new(store).with_rate_limit_extension(config.rate_limit_extension);
    let upstream = Upstream::new(
        default_client()?,
        config.upstream_name.clone(),
        config.upstream_base_url.clone(),
    );

    tracing::info!(
        upstream = upstream.name(),
        base_url = upstream.base_url(),
        default_ttl_secs = config.store.default_ttl.as_secs(),
        "Starting proxy"
    );

    ProxyServer::bind(
        config.bind,
        ProxyState::new(read_through, upstream, config.ttl_policy.clone()),
    )
    .await
}
