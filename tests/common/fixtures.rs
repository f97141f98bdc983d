//! Upstream mocks and an in-process proxy.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use coincache::cache::{CacheStore, ReadThrough, TtlPolicy};
use coincache::core::http::{Upstream, default_client};
use coincache::server::{ProxyServer, ProxyState};

/// Mount a JSON 200 response for `GET route`.
pub async fn mount_json(server: &MockServer, route: &str, body: &Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount a 429 with `Retry-After: secs` for `GET route`.
pub async fn mount_rate_limited(server: &MockServer, route: &str, secs: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", secs.to_string().as_str())
                .set_body_string("rate limit exceeded"),
        )
        .mount(server)
        .await;
}

/// Mount a bare status response for `GET route`.
pub async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// A proxy running on an ephemeral port in front of `upstream_uri`.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub store: Arc<CacheStore>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RunningProxy {
    /// Start a proxy with built-in TTLs.
    pub async fn start(upstream_uri: &str) -> Self {
        Self::start_with(upstream_uri, TtlPolicy::new()).await
    }

    /// Start a proxy with a custom TTL policy.
    pub async fn start_with(upstream_uri: &str, policy: TtlPolicy) -> Self {
        let store = Arc::new(CacheStore::new());
        let state = ProxyState::new(
            ReadThrough::new(Arc::clone(&store)),
            Upstream::new(default_client().expect("client"), "mock", upstream_uri),
            policy,
        );
        let server = ProxyServer::bind("127.0.0.1:0".parse().unwrap(), state)
            .await
            .expect("bind proxy");
        let addr = server.local_addr().expect("local addr");

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            addr,
            store,
            shutdown: Some(tx),
            task,
        }
    }

    /// Absolute URL for a proxy path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Stop accepting connections.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(2), &mut self.task).await;
    }
}
