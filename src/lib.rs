//! Single-flight coalescing and caching for streamed completions
//!
//! Clients call `POST /{destination}/chat/completions`, where the destination
//! names the upstream API (`api.openai.com/v1`); the proxy forwards to
//! `https://{destination}/chat/completions`.
//!
//! Identical requests (same destination, identical body) share one upstream
//! call. Whoever arrives while it is streaming gets the output produced so
//! far and then follows it live; whoever arrives after it finished gets the
//! archived result straight away.
//!
//! # Layout
//!
//! - [`coordinator`]: routing keys, the per-key [`Coordinator`] and the
//!   [`CoordinatorRegistry`] placing one coordinator per key
//! - [`cache`]: the [`ResultStore`] trait and an in-memory TTL store
//! - [`upstream`]: the [`Upstream`] trait and a `reqwest`-backed HTTP upstream
//! - [`server`]: the axum front-end and [`ProxyServer`] runner
//! - [`stats`]: process-wide counters
//!
//! # Example
//!
//! ```no_run
//! use streamdedup::{ProxyServer, ServerConfig};
//!
//! # async fn example() -> streamdedup::error::Result<()> {
//! let config = ServerConfig::default().upstream_scheme("https");
//! let server = ProxyServer::new(config)?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod server;
pub mod stats;
pub mod upstream;

pub use cache::{MemoryResultStore, ResultStore, StoreError};
pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorRegistry, CoordinatorState,
    KeyDeriver, RoutingKey, Subscription,
};
pub use error::{Error, Result};
pub use server::{ProxyServer, ServerConfig};
pub use stats::{ProxyStats, StatsSnapshot};
pub use upstream::{HttpUpstream, Upstream, UpstreamError, UpstreamRequest};
