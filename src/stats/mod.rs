//! Proxy statistics

pub mod metrics;

pub use metrics::{ProxyStats, StatsSnapshot};
