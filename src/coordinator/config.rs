//! Coordinator configuration

use std::time::Duration;

/// Policy knobs shared by every coordinator in a registry
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long an archived result stays in the result store
    pub result_ttl: Duration,

    /// How long a completed coordinator stays reachable after archival
    ///
    /// Covers the window in which a fresh result store write may not yet be
    /// visible to every front-end.
    pub retirement_grace: Duration,

    /// Maximum upstream output held in memory per key, in bytes
    pub max_buffer_size: usize,

    /// Interval between expired-entry sweeps of the result store; zero disables
    pub store_cleanup_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(3600),
            retirement_grace: Duration::from_secs(60),
            max_buffer_size: 64 * 1024 * 1024, // 64MB
            store_cleanup_interval: Duration::from_secs(30),
        }
    }
}

impl CoordinatorConfig {
    /// Set the archived result TTL
    pub fn result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    /// Set the retirement grace period
    pub fn retirement_grace(mut self, grace: Duration) -> Self {
        self.retirement_grace = grace;
        self
    }

    /// Set the per-key output buffer limit
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Set the result store cleanup interval
    pub fn store_cleanup_interval(mut self, interval: Duration) -> Self {
        self.store_cleanup_interval = interval;
        self
    }
}
