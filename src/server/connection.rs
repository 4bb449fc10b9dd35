//! Per-connection lifecycle for event stream subscribers
//!
//! ```text
//! Opening ──attach()──► Streaming ──disconnect / shutdown──► Closed
//! ```
//!
//! The response body owns the sending half of a oneshot. When the transport
//! drops the body (client went away, or the stream ended) the receiving half
//! in [`Connection::run`] wakes up and the subscriber is deregistered.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::registry::{
    QueueHandle, RoomId, RoomRegistry, Subscriber, SubscriberId, SubscriberStream,
};

/// Lifecycle state of a subscriber connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Subscriber created, not yet registered
    Opening,
    /// Registered with the room and receiving records
    Streaming,
    /// Deregistered
    Closed,
}

/// One long-lived subscribe request
pub struct Connection {
    room_id: RoomId,
    registry: Arc<RoomRegistry>,
    subscriber_id: SubscriberId,
    // Handed to the registry on attach so that the registry holds the only
    // sender and dropping it ends the stream
    pending: Option<Subscriber>,
    state: ConnectionState,
}

impl Connection {
    /// Create the connection and the stream that will feed the response body
    pub fn open(registry: Arc<RoomRegistry>, room_id: RoomId) -> (Self, SubscriberStream) {
        let (subscriber, stream) = registry.new_subscriber();

        let connection = Self {
            room_id,
            registry,
            subscriber_id: subscriber.id(),
            pending: Some(subscriber),
            state: ConnectionState::Opening,
        };

        (connection, stream)
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    /// Register with the room, creating it if needed
    ///
    /// Cancel safe: if the future is dropped before it completes, no room is
    /// left behind without its subscriber.
    pub async fn attach(&mut self) -> QueueHandle {
        let queue = match &self.pending {
            Some(subscriber) => {
                let queue = self
                    .registry
                    .subscribe(self.room_id.as_str(), subscriber)
                    .await;
                self.pending = None;
                self.state = ConnectionState::Streaming;
                queue
            }
            None => self.registry.ensure_room(self.room_id.as_str()).await,
        };

        tracing::debug!(
            room = %self.room_id,
            subscriber = %self.subscriber_id,
            "Connection streaming"
        );

        queue
    }

    /// Wait for the client to go away, then deregister
    ///
    /// Suspends without polling until either the disconnect signal fires or
    /// the server shuts down.
    pub async fn run(mut self, disconnected: DisconnectSignal, shutdown: CancellationToken) {
        tokio::select! {
            _ = disconnected.wait() => {
                tracing::debug!(
                    room = %self.room_id,
                    subscriber = %self.subscriber_id,
                    "Client disconnected"
                );
            }
            _ = shutdown.cancelled() => {
                tracing::debug!(
                    room = %self.room_id,
                    subscriber = %self.subscriber_id,
                    "Closing connection for shutdown"
                );
            }
        }

        self.close().await;
    }

    async fn close(&mut self) {
        if self.state == ConnectionState::Streaming {
            self.registry
                .unsubscribe(self.room_id.as_str(), self.subscriber_id)
                .await;
        }
        self.state = ConnectionState::Closed;
    }
}

/// Fires once the paired [`EventStream`] has been dropped
#[derive(Debug)]
pub struct DisconnectSignal(oneshot::Receiver<()>);

impl DisconnectSignal {
    pub async fn wait(self) {
        // Nothing is ever sent; the error is the drop notification
        let _ = self.0.await;
    }
}

/// Response body stream for one subscriber
///
/// Dropping it is how the transport reports the client as gone.
#[derive(Debug)]
pub struct EventStream {
    inner: SubscriberStream,
    _guard: oneshot::Sender<()>,
}

impl EventStream {
    pub fn new(inner: SubscriberStream) -> (Self, DisconnectSignal) {
        let (guard, signal) = oneshot::channel();
        (
            Self {
                inner,
                _guard: guard,
            },
            DisconnectSignal(signal),
        )
    }
}

impl Stream for EventStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|next| next.map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::registry::{PayloadFormat, RegistryConfig};

    fn registry() -> Arc<RoomRegistry> {
        Arc::new(RoomRegistry::with_config(
            RegistryConfig::default().payload_format(PayloadFormat::Raw),
        ))
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let registry = registry();
        let (mut conn, _stream) = Connection::open(Arc::clone(&registry), RoomId::from("r1"));
        assert_eq!(conn.state(), ConnectionState::Opening);
        assert!(!registry.room_exists("r1").await);

        let queue = conn.attach().await;
        assert_eq!(conn.state(), ConnectionState::Streaming);
        assert!(queue.is_open());
        assert_eq!(registry.room_stats("r1").await.unwrap().subscriber_count, 1);

        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!registry.room_exists("r1").await);
    }

    #[tokio::test]
    async fn test_dropping_body_unsubscribes() {
        let registry = registry();
        let (mut conn, stream) = Connection::open(Arc::clone(&registry), RoomId::from("r1"));
        conn.attach().await;

        let (body, signal) = EventStream::new(stream);
        let task = tokio::spawn(conn.run(signal, CancellationToken::new()));

        assert!(registry.publish("r1", "hello").await);
        drop(body);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("connection did not close")
            .unwrap();

        assert!(!registry.room_exists("r1").await);
        assert!(!registry.publish("r1", "after").await);
    }

    #[tokio::test]
    async fn test_shutdown_ends_stream() {
        let registry = registry();
        let shutdown = CancellationToken::new();
        let (mut conn, stream) = Connection::open(Arc::clone(&registry), RoomId::from("r1"));
        conn.attach().await;

        let (mut body, signal) = EventStream::new(stream);
        tokio::spawn(conn.run(signal, shutdown.clone()));

        assert!(registry.publish("r1", "last words").await);
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(first.as_ref(), b"data: last words\n\n");

        shutdown.cancel();

        let end = tokio::time::timeout(Duration::from_secs(1), body.next())
            .await
            .expect("stream did not end");
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_close_room_ends_body() {
        let registry = registry();
        let (mut conn, stream) = Connection::open(Arc::clone(&registry), RoomId::from("r1"));
        conn.attach().await;

        let (mut body, signal) = EventStream::new(stream);
        let task = tokio::spawn(conn.run(signal, CancellationToken::new()));

        assert!(registry.close_room("r1").await);

        let end = tokio::time::timeout(Duration::from_secs(1), body.next())
            .await
            .expect("stream did not end");
        assert!(end.is_none());

        drop(body);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("connection did not close")
            .unwrap();
    }
}
