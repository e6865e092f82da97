//! Coordinator registry implementation
//!
//! Maps each routing key to its single live coordinator. Creating an entry
//! happens under the map's write lock, so concurrent first arrivals for a key
//! always resolve to the same instance.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::ResultStore;
use crate::stats::ProxyStats;
use crate::upstream::{Upstream, UpstreamRequest};

use super::config::CoordinatorConfig;
use super::entry::{Coordinator, CoordinatorState, CoordinatorStats};
use super::event::Subscription;
use super::key::RoutingKey;

/// Placement layer: one coordinator per routing key
pub struct CoordinatorRegistry {
    /// Map of routing key to live coordinator
    coordinators: RwLock<HashMap<RoutingKey, Arc<Coordinator>>>,

    /// Configuration handed to every coordinator
    config: CoordinatorConfig,

    upstream: Arc<dyn Upstream>,
    store: Arc<dyn ResultStore>,
    stats: Arc<ProxyStats>,
}

impl CoordinatorRegistry {
    /// Create a registry with default configuration
    pub fn new(upstream: Arc<dyn Upstream>, store: Arc<dyn ResultStore>) -> Self {
        Self::with_config(CoordinatorConfig::default(), upstream, store)
    }

    /// Create a registry with custom configuration
    pub fn with_config(
        config: CoordinatorConfig,
        upstream: Arc<dyn Upstream>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            coordinators: RwLock::new(HashMap::new()),
            config,
            upstream,
            store,
            stats: Arc::new(ProxyStats::new()),
        }
    }

    /// Share an existing stats tracker
    pub fn with_stats(mut self, stats: Arc<ProxyStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Get the registry configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Result store coordinators archive into
    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    /// Shared stats tracker
    pub fn stats(&self) -> &Arc<ProxyStats> {
        &self.stats
    }

    /// Attach a request to the coordinator for `key`, creating it if needed
    ///
    /// A coordinator that has already failed or retired is replaced by a
    /// fresh one, which issues a new upstream call.
    pub async fn attach(self: &Arc<Self>, key: RoutingKey, request: &UpstreamRequest) -> Subscription {
        loop {
            let coordinator = self.get_or_create(key).await;

            if let Some(sub) = coordinator.attach(request).await {
                return sub;
            }

            tracing::debug!(key = %key, "Coordinator no longer usable, replacing");
            self.remove_if_current(&key, &coordinator).await;
        }
    }

    async fn get_or_create(self: &Arc<Self>, key: RoutingKey) -> Arc<Coordinator> {
        if let Some(coordinator) = self.coordinators.read().await.get(&key) {
            return Arc::clone(coordinator);
        }

        let mut coordinators = self.coordinators.write().await;
        let coordinator = coordinators.entry(key).or_insert_with(|| {
            tracing::debug!(key = %key, "Coordinator created");
            Arc::new(Coordinator::new(
                key,
                self.config.clone(),
                Arc::clone(&self.upstream),
                Arc::clone(&self.store),
                Arc::clone(&self.stats),
                Arc::downgrade(self),
            ))
        });

        Arc::clone(coordinator)
    }

    /// Get the live coordinator for a key
    pub async fn get(&self, key: &RoutingKey) -> Option<Arc<Coordinator>> {
        self.coordinators.read().await.get(key).cloned()
    }

    /// Check if a key currently maps to a coordinator
    pub async fn contains(&self, key: &RoutingKey) -> bool {
        self.coordinators.read().await.contains_key(key)
    }

    /// Current state of the coordinator for a key
    pub async fn state_of(&self, key: &RoutingKey) -> Option<CoordinatorState> {
        let coordinator = self.get(key).await?;
        Some(coordinator.state().await)
    }

    /// Statistics for the coordinator of a key
    pub async fn coordinator_stats(&self, key: &RoutingKey) -> Option<CoordinatorStats> {
        let coordinator = self.get(key).await?;
        Some(coordinator.stats().await)
    }

    /// Get total number of live coordinators
    pub async fn coordinator_count(&self) -> usize {
        self.coordinators.read().await.len()
    }

    /// Remove the mapping for `key` if it still points at `coordinator`
    pub(super) async fn remove_if_current(&self, key: &RoutingKey, coordinator: &Arc<Coordinator>) -> bool {
        let mut coordinators = self.coordinators.write().await;

        match coordinators.get(key) {
            Some(current) if Arc::ptr_eq(current, coordinator) => {
                coordinators.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Cancel pending retirements and drop every mapping
    ///
    /// In-flight upstream calls keep running and still deliver to their
    /// subscribers; they just stop being reachable for new attaches.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<Coordinator>> = {
            let mut coordinators = self.coordinators.write().await;
            coordinators.drain().map(|(_, c)| c).collect()
        };

        for coordinator in &drained {
            coordinator.cancel_retirement().await;
        }

        tracing::info!(coordinators = drained.len(), "Coordinator registry shut down");
    }
}

impl std::fmt::Debug for CoordinatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
