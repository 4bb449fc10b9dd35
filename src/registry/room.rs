//! Room identity and per-room state
//!
//! This module defines the per-room entry stored in the registry.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::message::Record;
use super::subscriber::{Subscriber, SubscriberId};

/// Opaque room identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RoomId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Entry for a single live room
pub(super) struct RoomEntry {
    /// Incarnation number; a re-created room gets a fresh one
    pub(super) generation: u64,

    /// Sending half of the pending queue. Dropping the entry closes the queue.
    pub(super) queue: mpsc::Sender<Record>,

    /// Fan-out set
    pub(super) subscribers: HashMap<SubscriberId, Subscriber>,

    /// Cancelled when the room is removed; stops the broadcast task
    pub(super) closed: CancellationToken,

    pub(super) created_at: Instant,
}

impl RoomEntry {
    pub(super) fn new(
        generation: u64,
        queue: mpsc::Sender<Record>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            generation,
            queue,
            subscribers: HashMap::new(),
            closed,
            created_at: Instant::now(),
        }
    }

    /// Messages accepted but not yet taken by the broadcast task
    pub(super) fn pending(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    /// Copy of the fan-out set, so delivery runs without holding the lock
    pub(super) fn snapshot(&self) -> Vec<Subscriber> {
        self.subscribers.values().cloned().collect()
    }

    pub(super) fn handle(&self, room_id: &RoomId) -> QueueHandle {
        QueueHandle {
            room_id: room_id.clone(),
            generation: self.generation,
            queue: self.queue.downgrade(),
        }
    }
}

/// Observer handle for a room's pending queue
///
/// Does not keep the queue alive and cannot enqueue; all publishes go
/// through the registry.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    room_id: RoomId,
    generation: u64,
    queue: mpsc::WeakSender<Record>,
}

impl QueueHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Incarnation of the room this handle was issued for
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the room this handle belongs to still exists
    pub fn is_open(&self) -> bool {
        self.queue.upgrade().is_some()
    }

    /// Maximum number of pending messages, or 0 once the room is gone
    pub fn capacity(&self) -> usize {
        self.queue.upgrade().map(|tx| tx.max_capacity()).unwrap_or(0)
    }

    /// Number of pending messages, or 0 once the room is gone
    pub fn pending(&self) -> usize {
        self.queue
            .upgrade()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }
}

/// Statistics for a room
#[derive(Debug, Clone)]
pub struct RoomStats {
    /// Number of registered subscribers
    pub subscriber_count: usize,
    /// Messages waiting in the queue
    pub pending_messages: usize,
    /// Queue capacity
    pub queue_capacity: usize,
    /// When this incarnation of the room was created
    pub created_at: Instant,
}
