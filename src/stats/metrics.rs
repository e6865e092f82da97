//! Statistics for the proxy and its coordinators

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-wide counters
///
/// Shared between the router and every coordinator. All counters are
/// monotonic and updated with relaxed ordering.
#[derive(Debug)]
pub struct ProxyStats {
    started_at: Instant,
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    upstream_calls: AtomicU64,
    coalesced_attaches: AtomicU64,
    replayed_attaches: AtomicU64,
    completed_streams: AtomicU64,
    failed_streams: AtomicU64,
    archive_failures: AtomicU64,
    retirements: AtomicU64,
    detached_subscribers: AtomicU64,
}

impl ProxyStats {
    /// Create a zeroed stats tracker
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            upstream_calls: AtomicU64::new(0),
            coalesced_attaches: AtomicU64::new(0),
            replayed_attaches: AtomicU64::new(0),
            completed_streams: AtomicU64::new(0),
            failed_streams: AtomicU64::new(0),
            archive_failures: AtomicU64::new(0),
            retirements: AtomicU64::new(0),
            detached_subscribers: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_upstream_call(&self) {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced_attaches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replayed(&self) {
        self.replayed_attaches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed_streams.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed_streams.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_archive_failure(&self) {
        self.archive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retirement(&self) {
        self.retirements.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_detached(&self, count: usize) {
        self.detached_subscribers
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            coalesced_attaches: self.coalesced_attaches.load(Ordering::Relaxed),
            replayed_attaches: self.replayed_attaches.load(Ordering::Relaxed),
            completed_streams: self.completed_streams.load(Ordering::Relaxed),
            failed_streams: self.failed_streams.load(Ordering::Relaxed),
            archive_failures: self.archive_failures.load(Ordering::Relaxed),
            retirements: self.retirements.load(Ordering::Relaxed),
            detached_subscribers: self.detached_subscribers.load(Ordering::Relaxed),
        }
    }
}

impl Default for ProxyStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of [`ProxyStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Time since the tracker was created
    pub uptime: Duration,
    /// Requests accepted by the router
    pub requests: u64,
    /// Requests served from the result store
    pub cache_hits: u64,
    /// Requests forwarded to a coordinator
    pub cache_misses: u64,
    /// Upstream calls issued
    pub upstream_calls: u64,
    /// Attaches that joined an in-flight stream
    pub coalesced_attaches: u64,
    /// Attaches served from a completed coordinator
    pub replayed_attaches: u64,
    /// Streams that finished cleanly
    pub completed_streams: u64,
    /// Streams that ended in an upstream failure
    pub failed_streams: u64,
    /// Result store writes that failed
    pub archive_failures: u64,
    /// Coordinators retired
    pub retirements: u64,
    /// Subscribers that went away before their stream ended
    pub detached_subscribers: u64,
}

impl StatsSnapshot {
    /// Fraction of requests answered without reaching a coordinator
    pub fn hit_ratio(&self) -> f64 {
        if self.requests > 0 {
            self.cache_hits as f64 / self.requests as f64
        } else {
            0.0
        }
    }
}
