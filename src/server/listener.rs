//! Proxy server listener
//!
//! Binds the HTTP listener, wires the router to a coordinator registry and
//! runs the result store sweeper alongside it.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::cache::{self, MemoryResultStore, ResultStore};
use crate::coordinator::{CoordinatorConfig, CoordinatorRegistry};
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::router::{proxy_router, ProxyState};
use crate::upstream::{HttpUpstream, Upstream};

/// Deduplicating proxy server
pub struct ProxyServer {
    config: ServerConfig,
    registry: Arc<CoordinatorRegistry>,
    store: Arc<dyn ResultStore>,
}

impl ProxyServer {
    /// Create a server forwarding over `config.upstream_scheme`
    pub fn new(config: ServerConfig) -> Result<Self> {
        Self::with_coordinator_config(config, CoordinatorConfig::default())
    }

    /// Create a server with custom coordinator configuration
    pub fn with_coordinator_config(
        config: ServerConfig,
        coordinator_config: CoordinatorConfig,
    ) -> Result<Self> {
        let upstream = Arc::new(HttpUpstream::with_scheme(config.upstream_scheme.clone())?);
        let store = Arc::new(MemoryResultStore::new());

        Ok(Self::with_parts(config, coordinator_config, upstream, store))
    }

    /// Create a server from explicit parts
    ///
    /// The store is swept every `store_cleanup_interval` through
    /// [`ResultStore::purge_expired`]; a zero interval disables the sweeper.
    pub fn with_parts(
        config: ServerConfig,
        coordinator_config: CoordinatorConfig,
        upstream: Arc<dyn Upstream>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        let registry = Arc::new(CoordinatorRegistry::with_config(
            coordinator_config,
            upstream,
            store.clone(),
        ));

        Self {
            config,
            registry,
            store,
        }
    }

    /// Get a reference to the coordinator registry
    pub fn registry(&self) -> &Arc<CoordinatorRegistry> {
        &self.registry
    }

    /// Get a reference to the result store
    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    /// Build the HTTP router for this server
    pub fn router(&self) -> Router {
        proxy_router(ProxyState::new(
            Arc::clone(&self.registry),
            self.config.max_body_size,
        ))
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            addr = %addr,
            upstream_scheme = %self.config.upstream_scheme,
            "Proxy server listening"
        );

        // Spawn cleanup task for the result store
        let interval = self.registry.config().store_cleanup_interval;
        let cleanup_handle = (!interval.is_zero())
            .then(|| cache::spawn_cleanup_task(Arc::clone(&self.store), interval));

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        // Stop cleanup task on shutdown
        if let Some(handle) = cleanup_handle {
            handle.abort();
        }
        self.registry.shutdown().await;

        result.map_err(Into::into)
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
