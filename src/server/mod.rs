//! Caching reverse proxy.
//!
//! `GET /api/<path>?<query>` is forwarded to the upstream base URL through
//! [`ReadThrough::get_or_set_with_fallback`], and the path the request took
//! is reported in the `X-Cache` response header. Admin routes live under
//! `/cache`. See [`routes`] for the full table.

pub mod routes;

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::cache::{ReadThrough, TtlPolicy};
use crate::core::http::Upstream;
use crate::error::{CoinCacheError, Result};

pub use routes::{X_CACHE, cache_key};

/// Pause after an accept failure that is not tied to a single connection,
/// such as running out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Everything a request handler needs.
#[derive(Debug, Clone)]
pub struct ProxyState {
    pub read_through: ReadThrough,
    pub upstream: Upstream,
    pub policy: TtlPolicy,
}

impl ProxyState {
    #[must_use]
    pub const fn new(read_through: ReadThrough, upstream: Upstream, policy: TtlPolicy) -> Self {
        Self {
            read_through,
            upstream,
            policy,
        }
    }
}

/// A bound, not yet running, proxy server.
#[derive(Debug)]
pub struct ProxyServer {
    listener: TcpListener,
    state: Arc<ProxyState>,
}

impl ProxyServer {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns [`CoinCacheError::Bind`] if the address is unavailable.
    pub async fn bind(addr: SocketAddr, state: ProxyState) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CoinCacheError::Bind {
                addr: addr.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    /// Address actually bound (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handler state.
    #[must_use]
    pub const fn state(&self) -> &Arc<ProxyState> {
        &self.state
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks. Accept
    /// failures are logged and the loop keeps going.
    pub async fn run_until<S>(self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "Proxy listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(err) => {
                            let backoff = accept_backoff(&err);
                            tracing::warn!(error = %err, ?backoff, "Accept failed");
                            if let Some(pause) = backoff {
                                tokio::time::sleep(pause).await;
                            }
                        }
                    }
                }
                () = &mut shutdown => {
                    tracing::info!("Proxy shutting down");
                    return;
                }
            }
        }
    }

    /// Accept connections until Ctrl-C.
    pub async fn run(self) {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = Arc::clone(&state);
                async move { Ok::<_, Infallible>(routes::handle(&state, req).await) }
            });
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(%peer, error = %err, "Connection closed with error");
            }
        });
    }
}

/// How long to wait before accepting again after `err`.
///
/// Errors that only concern the connection being accepted retry at once;
/// anything else (descriptor exhaustion, memory pressure) backs off.
fn accept_backoff(err: &io::Error) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}
