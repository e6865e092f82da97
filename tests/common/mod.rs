//! Shared fixtures for proxy integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use streamdedup::{CoordinatorConfig, MemoryResultStore, ProxyServer, ServerConfig, UpstreamError};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub use streamdedup::upstream::testing::{ChannelUpstream, Feed};

pub const BODY: &str = r#"{"model":"gpt-4o-mini","stream":true,"messages":[{"role":"user","content":"hi"}]}"#;
pub const TOKEN: &str = "Bearer sk-test";

pub fn chunk(data: &'static str) -> Result<Bytes, UpstreamError> {
    Ok(Bytes::from_static(data.as_bytes()))
}

/// Proxy running on an ephemeral port
pub struct TestProxy {
    pub addr: SocketAddr,
    pub server: Arc<ProxyServer>,
    pub upstream: Arc<ChannelUpstream>,
    pub store: Arc<MemoryResultStore>,
    pub client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestProxy {
    pub async fn start() -> Self {
        Self::start_with(CoordinatorConfig::default(), MemoryResultStore::new()).await
    }

    pub async fn start_with(coordinator_config: CoordinatorConfig, store: MemoryResultStore) -> Self {
        Self::start_full(ServerConfig::default(), coordinator_config, store).await
    }

    pub async fn start_full(
        config: ServerConfig,
        coordinator_config: CoordinatorConfig,
        store: MemoryResultStore,
    ) -> Self {
        let upstream = Arc::new(ChannelUpstream::default());
        let store = Arc::new(store);
        let server = Arc::new(ProxyServer::with_parts(
            config,
            coordinator_config,
            upstream.clone(),
            store.clone(),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        let handle = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                server
                    .serve(listener, async {
                        let _ = rx.await;
                    })
                    .await
                    .unwrap();
            })
        };

        Self {
            addr,
            server,
            upstream,
            store,
            client: reqwest::Client::new(),
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// POST `body` to the openai chat completions route with a valid token
    pub async fn post(&self, body: &'static str) -> reqwest::Response {
        self.client
            .post(self.url("/openai/chat/completions"))
            .header("authorization", TOKEN)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap();
        }
    }
}
