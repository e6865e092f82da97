//! Result store
//!
//! Archived results keyed by [`RoutingKey`] with bounded retention. The router
//! reads from it before reaching a coordinator; a coordinator writes to it
//! once its stream completes.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::coordinator::RoutingKey;

pub use memory::MemoryResultStore;

/// Result store failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation
    #[error("result store unavailable: {0}")]
    Unavailable(String),
}

/// Key to archived bytes, with expiry
#[async_trait::async_trait]
pub trait ResultStore: Send + Sync + 'static {
    /// Fetch an archived result; `None` when absent or expired
    async fn get(&self, key: &RoutingKey) -> Result<Option<Bytes>, StoreError>;

    /// Archive a result for `ttl`
    async fn put(&self, key: &RoutingKey, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Drop expired entries
    ///
    /// Stores that expire entries on their own keep the default no-op.
    async fn purge_expired(&self) {}
}

/// Spawn a task that purges expired entries every `interval`
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_task(
    store: Arc<dyn ResultStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            store.purge_expired().await;
        }
    })
}
