//! Upstream calls
//!
//! The coordinator treats the upstream as an opaque producer of byte chunks.
//! [`HttpUpstream`] proxies to an OpenAI-compatible HTTP endpoint; tests plug
//! in their own [`Upstream`] implementations.

pub mod http;

use bytes::Bytes;
use futures::stream::BoxStream;

pub use http::HttpUpstream;

/// Chunked upstream output
pub type ByteStream = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// Request forwarded verbatim to the upstream
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// Destination path segment (e.g. "openai")
    pub destination: String,
    /// Full `Authorization` header value from the client
    pub authorization: String,
    /// Request body bytes
    pub body: Bytes,
}

impl UpstreamRequest {
    /// Create a new upstream request
    pub fn new(
        destination: impl Into<String>,
        authorization: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            destination: destination.into(),
            authorization: authorization.into(),
            body: body.into(),
        }
    }
}

/// Upstream failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Connection or body read failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-success status
    #[error("upstream returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, best effort
        body: String,
    },

    /// Body ended before the upstream said it would
    #[error("upstream body truncated")]
    Truncated,
}

/// Something that can run the expensive call
#[async_trait::async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// Issue the call and return its output as a chunk stream
    async fn call(&self, request: &UpstreamRequest) -> Result<ByteStream, UpstreamError>;
}

#[doc(hidden)]
pub mod testing {
    //! Scripted upstream for tests

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use futures::StreamExt;
    use tokio::sync::{mpsc, Notify};

    use super::*;

    /// Sending half of one call's output
    pub type Feed = mpsc::UnboundedSender<Result<Bytes, UpstreamError>>;

    /// Upstream whose output is fed by the test through a channel
    ///
    /// Every call gets a fresh feed; the test picks them up in call order
    /// with [`ChannelUpstream::feed`].
    #[derive(Default)]
    pub struct ChannelUpstream {
        calls: AtomicUsize,
        feeds: Mutex<Vec<Option<Feed>>>,
        requests: Mutex<Vec<UpstreamRequest>>,
        notify: Notify,
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl ChannelUpstream {
        /// Number of calls issued so far
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Requests received, in call order
        pub fn requests(&self) -> Vec<UpstreamRequest> {
            lock(&self.requests).clone()
        }

        /// Wait for call number `index` (0-based) and take its feed
        ///
        /// The test holds the only sender, so dropping it ends that call's
        /// stream cleanly.
        pub async fn feed(&self, index: usize) -> Feed {
            loop {
                let notified = self.notify.notified();
                let taken = lock(&self.feeds).get_mut(index).and_then(Option::take);
                if let Some(tx) = taken {
                    return tx;
                }
                notified.await;
            }
        }
    }

    #[async_trait::async_trait]
    impl Upstream for ChannelUpstream {
        async fn call(&self, request: &UpstreamRequest) -> Result<ByteStream, UpstreamError> {
            let (tx, rx) = mpsc::unbounded_channel();
            lock(&self.requests).push(request.clone());
            lock(&self.feeds).push(Some(tx));
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_waiters();

            let stream = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            Ok(stream.boxed())
        }
    }
}
