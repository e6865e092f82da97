//! Subscriber-side stream types
//!
//! Each attached request owns one unbounded queue. The coordinator appends
//! [`StreamEvent`]s to it without blocking; the transport drains it through a
//! [`Subscription`] at whatever pace the client reads.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use super::error::CoordinatorError;

/// An event pushed into a subscriber queue
///
/// Cheap to clone: chunk payloads are reference counted.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Next slice of upstream output
    Chunk(Bytes),
    /// Upstream finished cleanly
    End,
    /// Upstream failed; no more events follow
    Error(CoordinatorError),
}

pub(crate) type EventSender = mpsc::UnboundedSender<StreamEvent>;

/// Byte stream handed to one attached request
///
/// Yields catch-up chunks followed by live chunks, then ends cleanly or with
/// exactly one error.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    done: bool,
}

impl Subscription {
    pub(crate) fn channel() -> (EventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx, done: false })
    }

    /// A subscription that replays a finished result
    pub fn replay(data: Bytes) -> Self {
        let (tx, sub) = Self::channel();
        if !data.is_empty() {
            let _ = tx.send(StreamEvent::Chunk(data));
        }
        let _ = tx.send(StreamEvent::End);
        sub
    }

    /// Drain the subscription into one buffer
    pub async fn read_to_end(mut self) -> Result<Bytes, CoordinatorError> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out.freeze())
    }
}

impl Stream for Subscription {
    type Item = Result<Bytes, CoordinatorError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        match ready!(self.rx.poll_recv(cx)) {
            Some(StreamEvent::Chunk(data)) => Poll::Ready(Some(Ok(data))),
            Some(StreamEvent::End) => {
                self.done = true;
                Poll::Ready(None)
            }
            Some(StreamEvent::Error(err)) => {
                self.done = true;
                Poll::Ready(Some(Err(err)))
            }
            None => {
                self.done = true;
                Poll::Ready(Some(Err(CoordinatorError::Abandoned)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay() {
        let sub = Subscription::replay(Bytes::from_static(b"data: hi\n\n"));
        let data = sub.read_to_end().await.unwrap();
        assert_eq!(&data[..], b"data: hi\n\n");
    }

    #[tokio::test]
    async fn test_replay_empty() {
        let mut sub = Subscription::replay(Bytes::new());
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_error_is_terminal() {
        let (tx, mut sub) = Subscription::channel();
        tx.send(StreamEvent::Chunk(Bytes::from_static(b"a"))).unwrap();
        tx.send(StreamEvent::Error(CoordinatorError::Upstream("boom".into())))
            .unwrap();
        tx.send(StreamEvent::Chunk(Bytes::from_static(b"b"))).unwrap();

        assert_eq!(sub.next().await.unwrap().unwrap(), Bytes::from_static(b"a"));
        assert!(matches!(
            sub.next().await,
            Some(Err(CoordinatorError::Upstream(_)))
        ));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_sender_is_abandoned() {
        let (tx, sub) = Subscription::channel();
        tx.send(StreamEvent::Chunk(Bytes::from_static(b"partial")))
            .unwrap();
        drop(tx);

        assert_eq!(sub.read_to_end().await, Err(CoordinatorError::Abandoned));
    }

    #[test]
    fn test_pending_until_event() {
        use tokio_test::{assert_pending, assert_ready};

        let (tx, mut sub) = Subscription::channel();
        let mut task = tokio_test::task::spawn(());

        assert_pending!(task.enter(|cx, _| Pin::new(&mut sub).poll_next(cx)));

        tx.send(StreamEvent::End).unwrap();
        assert!(task.is_woken());

        let polled = assert_ready!(task.enter(|cx, _| Pin::new(&mut sub).poll_next(cx)));
        assert!(polled.is_none());
    }
}
