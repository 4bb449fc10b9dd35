//! Subscriber handles
//!
//! A subscriber is one live outbound stream. The registry keeps the sending
//! half ([`Subscriber`]) in the room's fan-out set; the transport owns the
//! receiving half ([`SubscriberStream`]) and drains it into the response body.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

use super::message::Record;

/// Unique subscriber identity, never reused within a registry
///
/// Only the registry issues ids; callers cannot make one up:
///
/// ```compile_fail
/// let id = roomcast::registry::SubscriberId(1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(super) fn new(raw: u64) -> Self {
        SubscriberId(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The receiving side went away before the record could be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected(pub SubscriberId);

impl std::fmt::Display for Disconnected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Subscriber {} disconnected", self.0)
    }
}

impl std::error::Error for Disconnected {}

/// Sending half of a subscriber's outbound stream
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Bytes>,
}

impl Subscriber {
    /// Create a subscriber with a bounded outbound buffer
    pub(super) fn channel(id: SubscriberId, buffer: usize) -> (Self, SubscriberStream) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { id, tx }, SubscriberStream { id, rx })
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Write one record to the outbound stream
    ///
    /// Waits while the buffer is full; the record is handed to the transport
    /// as soon as there is room, with no further batching.
    pub async fn deliver(&self, record: &Record) -> Result<(), Disconnected> {
        self.tx
            .send(record.as_bytes().clone())
            .await
            .map_err(|_| Disconnected(self.id))
    }

    /// Whether the receiving side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a subscriber's outbound stream
///
/// Yields encoded records and ends once the registry has released every
/// handle to this subscriber.
#[derive(Debug)]
pub struct SubscriberStream {
    id: SubscriberId,
    rx: mpsc::Receiver<Bytes>,
}

impl SubscriberStream {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receive the next record, or `None` at end-of-stream
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Stream for SubscriberStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
