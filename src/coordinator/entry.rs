//! Per-key stream coordinator
//!
//! One [`Coordinator`] owns one upstream call. It buffers the output, fans it
//! out to every attached subscriber in a single global order, archives the
//! finished result and retires itself after a grace period.
//!
//! State, buffer and subscriber set live behind one mutex. Deliveries are
//! pushes onto unbounded per-subscriber queues, so nothing inside the lock
//! ever waits on a client.

use std::sync::{Arc, Weak};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

use crate::cache::ResultStore;
use crate::stats::ProxyStats;
use crate::upstream::{Upstream, UpstreamRequest};

use super::config::CoordinatorConfig;
use super::error::CoordinatorError;
use super::event::{EventSender, StreamEvent, Subscription};
use super::key::RoutingKey;
use super::store::CoordinatorRegistry;

/// Lifecycle state of a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Created, no upstream call yet
    Idle,
    /// Upstream call in flight
    Active,
    /// Upstream finished, archive write in progress
    Finalizing,
    /// Result archived (or archive attempted); replaying to late attaches
    Completed,
    /// Upstream failed; nothing archived
    Failed,
    /// Removed from the registry
    Retired,
}

/// Statistics for one coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorStats {
    /// Current state
    pub state: CoordinatorState,
    /// Live subscribers
    pub subscriber_count: usize,
    /// Subscribers attached over the coordinator's life
    pub total_attaches: u64,
    /// Chunks buffered so far
    pub chunk_count: usize,
    /// Bytes buffered so far (or archived size once completed)
    pub buffered_bytes: usize,
    /// Time since creation
    pub age: std::time::Duration,
}

struct Inner {
    state: CoordinatorState,
    chunks: Vec<Bytes>,
    buffered_bytes: usize,
    /// Live subscribers in attach order
    subscribers: Vec<(u64, EventSender)>,
    next_subscriber_id: u64,
    archived: Option<Bytes>,
    completed_at: Option<Instant>,
    retirement: Option<AbortHandle>,
}

impl Inner {
    fn add_subscriber(&mut self, tx: EventSender) -> u64 {
        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;
        self.subscribers.push((id, tx));
        id
    }

    /// Push an event to every live subscriber, dropping the ones that left
    ///
    /// Returns the number of subscribers dropped.
    fn broadcast(&mut self, event: &StreamEvent) -> usize {
        let before = self.subscribers.len();
        self.subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
        before - self.subscribers.len()
    }
}

/// Coordinator for a single routing key
pub struct Coordinator {
    key: RoutingKey,
    config: CoordinatorConfig,
    upstream: Arc<dyn Upstream>,
    store: Arc<dyn ResultStore>,
    stats: Arc<ProxyStats>,
    registry: Weak<CoordinatorRegistry>,
    created_at: Instant,
    inner: Mutex<Inner>,
}

impl Coordinator {
    pub(super) fn new(
        key: RoutingKey,
        config: CoordinatorConfig,
        upstream: Arc<dyn Upstream>,
        store: Arc<dyn ResultStore>,
        stats: Arc<ProxyStats>,
        registry: Weak<CoordinatorRegistry>,
    ) -> Self {
        Self {
            key,
            config,
            upstream,
            store,
            stats,
            registry,
            created_at: Instant::now(),
            inner: Mutex::new(Inner {
                state: CoordinatorState::Idle,
                chunks: Vec::new(),
                buffered_bytes: 0,
                subscribers: Vec::new(),
                next_subscriber_id: 1,
                archived: None,
                completed_at: None,
                retirement: None,
            }),
        }
    }

    /// Routing key this coordinator serves
    pub fn key(&self) -> &RoutingKey {
        &self.key
    }

    /// Current lifecycle state
    pub async fn state(&self) -> CoordinatorState {
        self.inner.lock().await.state
    }

    /// Number of live subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }

    /// Snapshot of this coordinator's statistics
    pub async fn stats(&self) -> CoordinatorStats {
        let inner = self.inner.lock().await;
        let buffered_bytes = match inner.archived {
            Some(ref data) => data.len(),
            None => inner.buffered_bytes,
        };

        CoordinatorStats {
            state: inner.state,
            subscriber_count: inner.subscribers.len(),
            total_attaches: inner.next_subscriber_id - 1,
            chunk_count: inner.chunks.len(),
            buffered_bytes,
            age: self.created_at.elapsed(),
        }
    }

    /// Attach a request to this key's stream
    ///
    /// The first attach starts the upstream call with `request`; later
    /// attaches replay what has been produced so far and then follow live
    /// output. Returns `None` once the coordinator has failed or retired, or
    /// once its completed result has outlived the result TTL, in which case
    /// the caller needs a fresh instance.
    pub async fn attach(self: &Arc<Self>, request: &UpstreamRequest) -> Option<Subscription> {
        let mut inner = self.inner.lock().await;
        let state = inner.state;

        match state {
            CoordinatorState::Idle => {
                inner.state = CoordinatorState::Active;
                let (tx, sub) = Subscription::channel();
                let id = inner.add_subscriber(tx);

                tokio::spawn(Arc::clone(self).drive(request.clone()));

                tracing::info!(
                    key = %self.key,
                    subscriber = id,
                    body_len = request.body.len(),
                    "Upstream call started"
                );
                Some(sub)
            }
            CoordinatorState::Active | CoordinatorState::Finalizing => {
                let (tx, sub) = Subscription::channel();
                for chunk in &inner.chunks {
                    // Receiver is still held by `sub`, so this cannot fail.
                    let _ = tx.send(StreamEvent::Chunk(chunk.clone()));
                }
                let catchup_chunks = inner.chunks.len();
                let id = inner.add_subscriber(tx);
                self.stats.record_coalesced();

                tracing::debug!(
                    key = %self.key,
                    subscriber = id,
                    catchup_chunks = catchup_chunks,
                    subscribers = inner.subscribers.len(),
                    "Subscriber joined in-flight stream"
                );
                Some(sub)
            }
            CoordinatorState::Completed => {
                let expired = inner
                    .completed_at
                    .is_some_and(|at| at.elapsed() >= self.config.result_ttl);
                if expired {
                    tracing::debug!(key = %self.key, "Completed result past its TTL");
                    return None;
                }

                let data = inner.archived.clone().unwrap_or_default();
                inner.next_subscriber_id += 1;
                self.stats.record_replayed();

                tracing::debug!(
                    key = %self.key,
                    bytes = data.len(),
                    "Replaying completed stream"
                );
                Some(Subscription::replay(data))
            }
            CoordinatorState::Failed | CoordinatorState::Retired => None,
        }
    }

    /// Run the upstream call to completion or failure
    ///
    /// Owns an `Arc` to the coordinator, so it keeps running no matter which
    /// subscribers come and go.
    async fn drive(self: Arc<Self>, request: UpstreamRequest) {
        self.stats.record_upstream_call();

        match self.pump(&request).await {
            Ok(()) => self.finalize().await,
            Err(err) => self.fail(err).await,
        }
    }

    async fn pump(&self, request: &UpstreamRequest) -> Result<(), CoordinatorError> {
        let mut stream = self.upstream.call(request).await?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.is_empty() {
                self.publish(chunk).await?;
            }
        }

        Ok(())
    }

    /// Append a chunk to the buffer and push it to every live subscriber
    async fn publish(&self, chunk: Bytes) -> Result<(), CoordinatorError> {
        let mut inner = self.inner.lock().await;

        let limit = self.config.max_buffer_size;
        if inner.buffered_bytes + chunk.len() > limit {
            return Err(CoordinatorError::BufferLimitExceeded { limit });
        }

        inner.buffered_bytes += chunk.len();
        inner.chunks.push(chunk.clone());

        let detached = inner.broadcast(&StreamEvent::Chunk(chunk));
        if detached > 0 {
            self.stats.record_detached(detached);
            tracing::debug!(
                key = %self.key,
                detached = detached,
                subscribers = inner.subscribers.len(),
                "Subscribers detached"
            );
        }

        Ok(())
    }

    async fn finalize(self: &Arc<Self>) {
        let data = {
            let mut inner = self.inner.lock().await;
            inner.state = CoordinatorState::Finalizing;

            let mut data = BytesMut::with_capacity(inner.buffered_bytes);
            for chunk in &inner.chunks {
                data.extend_from_slice(chunk);
            }
            data.freeze()
        };

        // Subscribers attaching meanwhile still get buffer replay plus `End`.
        if let Err(err) = self
            .store
            .put(&self.key, data.clone(), self.config.result_ttl)
            .await
        {
            self.stats.record_archive_failure();
            tracing::warn!(
                key = %self.key,
                error = %err,
                "Archive write failed, result kept in memory until retirement"
            );
        }

        let mut inner = self.inner.lock().await;
        inner.state = CoordinatorState::Completed;
        inner.archived = Some(data);
        inner.completed_at = Some(Instant::now());
        inner.chunks = Vec::new();

        self.stats.record_completed();

        let detached = inner.broadcast(&StreamEvent::End);
        let closed = inner.subscribers.len();
        inner.subscribers.clear();
        inner.retirement = Some(self.schedule_retirement());
        self.stats.record_detached(detached);

        tracing::info!(
            key = %self.key,
            bytes = inner.buffered_bytes,
            subscribers = closed,
            grace_period_ms = self.config.retirement_grace.as_millis() as u64,
            "Stream completed"
        );
    }

    async fn fail(self: &Arc<Self>, err: CoordinatorError) {
        {
            let mut inner = self.inner.lock().await;
            inner.state = CoordinatorState::Failed;
            inner.chunks = Vec::new();
            self.stats.record_failed();

            let detached = inner.broadcast(&StreamEvent::Error(err.clone()));
            let notified = inner.subscribers.len();
            inner.subscribers.clear();
            self.stats.record_detached(detached);

            tracing::warn!(
                key = %self.key,
                error = %err,
                subscribers = notified,
                "Stream failed"
            );
        }

        // Nothing was archived, so there is no propagation window to cover.
        self.retire().await;
    }

    fn schedule_retirement(self: &Arc<Self>) -> AbortHandle {
        let coordinator = Arc::downgrade(self);
        // Never outlive the archived copy.
        let grace = self.config.retirement_grace.min(self.config.result_ttl);

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.retire().await;
            }
        })
        .abort_handle()
    }

    /// Mark retired and drop the registry mapping; runs at most once
    async fn retire(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == CoordinatorState::Retired {
                return;
            }
            inner.state = CoordinatorState::Retired;
            inner.archived = None;
            inner.retirement = None;
        }

        self.stats.record_retirement();

        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if_current(&self.key, self).await;
        }

        tracing::info!(key = %self.key, "Coordinator retired");
    }

    /// Abort a pending retirement timer
    pub(super) async fn cancel_retirement(&self) {
        if let Some(handle) = self.inner.lock().await.retirement.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("key", &self.key)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
