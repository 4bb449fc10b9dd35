//! Room registry implementation
//!
//! The central registry that owns every live room, its pending queue and its
//! fan-out set, and routes published messages to subscribers.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use super::config::RegistryConfig;
use super::error::RegistryError;
use super::message::{LogLevel, Message, Record};
use super::room::{QueueHandle, RoomEntry, RoomId, RoomStats};
use super::stats::{RegistryCounters, RegistrySnapshot};
use super::subscriber::{Subscriber, SubscriberId, SubscriberStream};

/// Everything guarded by the registry lock
#[derive(Default)]
struct RoomTable {
    rooms: HashMap<RoomId, RoomEntry>,
    /// Which room each subscriber currently belongs to
    memberships: HashMap<SubscriberId, RoomId>,
}

/// Central registry for all live rooms
///
/// A single `RwLock` guards the room table. Publishes and broadcast snapshots
/// take the read side; room and subscriber creation or removal take the
/// write side. The lock is never held across a subscriber write.
pub struct RoomRegistry {
    table: Arc<RwLock<RoomTable>>,
    counters: Arc<RegistryCounters>,
    config: RegistryConfig,
    next_subscriber_id: AtomicU64,
    next_generation: AtomicU64,
    /// Parent of every room's close token
    shutdown: CancellationToken,
}

impl RoomRegistry {
    /// Create a new room registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new room registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            table: Arc::new(RwLock::new(RoomTable::default())),
            counters: Arc::new(RegistryCounters::default()),
            config,
            next_subscriber_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Create a new subscriber handle and the stream it feeds
    ///
    /// The handle is not attached to any room until [`subscribe`](Self::subscribe).
    pub fn new_subscriber(&self) -> (Subscriber, SubscriberStream) {
        let id = SubscriberId::new(self.next_subscriber_id.fetch_add(1, Ordering::Relaxed));
        Subscriber::channel(id, self.config.subscriber_buffer)
    }

    /// Get the queue of a room, creating the room if it does not exist
    ///
    /// Creating a room starts its broadcast task. Idempotent.
    pub async fn ensure_room(&self, room_id: &str) -> QueueHandle {
        {
            let table = self.table.read().await;
            if let Some(entry) = table.rooms.get(room_id) {
                return entry.handle(&RoomId::from(room_id));
            }
        }

        let room_id = RoomId::from(room_id);
        let mut table = self.table.write().await;
        self.ensure_room_locked(&mut table.rooms, &room_id)
            .handle(&room_id)
    }

    /// Register a subscriber with a room, creating the room if needed
    ///
    /// The room is created and the subscriber added in one critical section,
    /// so a room never exists without a subscriber because a caller gave up
    /// half way. A subscriber belongs to at most one room; if it is already
    /// attached elsewhere it is detached from that room first.
    pub async fn subscribe(&self, room_id: &str, subscriber: &Subscriber) -> QueueHandle {
        let room_id = RoomId::from(room_id);
        let id = subscriber.id();
        let mut guard = self.table.write().await;
        let table = &mut *guard;

        if let Some(previous) = table.memberships.get(&id).cloned() {
            if previous != room_id {
                self.detach_locked(table, previous.as_str(), id);
            }
        }

        let entry = self.ensure_room_locked(&mut table.rooms, &room_id);
        entry.subscribers.insert(id, subscriber.clone());
        let count = entry.subscribers.len();
        let handle = entry.handle(&room_id);
        table.memberships.insert(id, room_id.clone());

        tracing::debug!(
            room = %room_id,
            subscriber = %id,
            subscribers = count,
            "Subscriber added"
        );

        handle
    }

    /// Remove a subscriber from a room
    ///
    /// Removing the last subscriber tears the room down in the same critical
    /// section: no publish can slip into the queue in between. No-op if the
    /// room or the subscriber is already gone.
    pub async fn unsubscribe(&self, room_id: &str, subscriber: SubscriberId) {
        let mut guard = self.table.write().await;
        self.detach_locked(&mut guard, room_id, subscriber);
    }

    /// Force-delete a room regardless of subscribers
    ///
    /// Queued messages are discarded and every subscriber stream ends.
    /// Returns `false` if the room did not exist.
    pub async fn close_room(&self, room_id: &str) -> bool {
        let mut guard = self.table.write().await;
        self.remove_room_locked(&mut guard, room_id, "closed").is_some()
    }

    /// Queue a message for a room
    ///
    /// Never waits for queue space: a full queue is reported, not awaited.
    pub async fn try_publish(
        &self,
        room_id: &str,
        message: impl Into<Message>,
    ) -> Result<(), RegistryError> {
        let record = message.into().encode(self.config.payload_format);
        let table = self.table.read().await;

        let Some(entry) = table.rooms.get(room_id) else {
            RegistryCounters::incr(&self.counters.rejected_not_found);
            return Err(RegistryError::RoomNotFound(RoomId::from(room_id)));
        };

        match entry.queue.try_send(record) {
            Ok(()) => {
                RegistryCounters::incr(&self.counters.accepted);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                RegistryCounters::incr(&self.counters.rejected_full);
                tracing::warn!(
                    room = %room_id,
                    capacity = self.config.queue_capacity,
                    "Room queue full, message dropped"
                );
                Err(RegistryError::QueueFull(RoomId::from(room_id)))
            }
            Err(TrySendError::Closed(_)) => {
                RegistryCounters::incr(&self.counters.rejected_not_found);
                Err(RegistryError::RoomNotFound(RoomId::from(room_id)))
            }
        }
    }

    /// Queue a message for a room
    ///
    /// Returns `true` if the room exists and the message was accepted.
    pub async fn publish(&self, room_id: &str, message: impl Into<Message>) -> bool {
        self.try_publish(room_id, message).await.is_ok()
    }

    /// Queue a message tagged with a severity level
    pub async fn publish_with_level(
        &self,
        room_id: &str,
        text: impl Into<String>,
        level: LogLevel,
    ) -> bool {
        self.publish(room_id, Message::new(text).with_level(level))
            .await
    }

    /// Queue an `info` message
    pub async fn publish_info(&self, room_id: &str, text: impl Into<String>) -> bool {
        self.publish_with_level(room_id, text, LogLevel::Info).await
    }

    /// Queue a `success` message
    pub async fn publish_success(&self, room_id: &str, text: impl Into<String>) -> bool {
        self.publish_with_level(room_id, text, LogLevel::Success)
            .await
    }

    /// Queue a `warning` message
    pub async fn publish_warning(&self, room_id: &str, text: impl Into<String>) -> bool {
        self.publish_with_level(room_id, text, LogLevel::Warning)
            .await
    }

    /// Queue an `error` message
    pub async fn publish_error(&self, room_id: &str, text: impl Into<String>) -> bool {
        self.publish_with_level(room_id, text, LogLevel::Error)
            .await
    }

    /// Queue a `debug` message
    pub async fn publish_debug(&self, room_id: &str, text: impl Into<String>) -> bool {
        self.publish_with_level(room_id, text, LogLevel::Debug)
            .await
    }

    /// Check if a room exists
    pub async fn room_exists(&self, room_id: &str) -> bool {
        self.table.read().await.rooms.contains_key(room_id)
    }

    /// Get total number of rooms
    pub async fn room_count(&self) -> usize {
        self.table.read().await.rooms.len()
    }

    /// Get room statistics
    pub async fn room_stats(&self, room_id: &str) -> Option<RoomStats> {
        let table = self.table.read().await;

        table.rooms.get(room_id).map(|entry| RoomStats {
            subscriber_count: entry.subscribers.len(),
            pending_messages: entry.pending(),
            queue_capacity: entry.queue.max_capacity(),
            created_at: entry.created_at,
        })
    }

    /// Snapshot of registry-wide counters
    pub fn stats(&self) -> RegistrySnapshot {
        self.counters.snapshot()
    }

    fn ensure_room_locked<'a>(
        &self,
        rooms: &'a mut HashMap<RoomId, RoomEntry>,
        room_id: &RoomId,
    ) -> &'a mut RoomEntry {
        match rooms.entry(room_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = mpsc::channel(self.config.queue_capacity);
                let closed = self.shutdown.child_token();

                tokio::spawn(broadcast_loop(
                    Arc::clone(&self.table),
                    Arc::clone(&self.counters),
                    room_id.clone(),
                    generation,
                    rx,
                    closed.clone(),
                ));

                RegistryCounters::incr(&self.counters.rooms_created);
                tracing::info!(room = %room_id, generation = generation, "Room created");

                slot.insert(RoomEntry::new(generation, tx, closed))
            }
        }
    }

    fn detach_locked(&self, table: &mut RoomTable, room_id: &str, id: SubscriberId) -> bool {
        let Some(entry) = table.rooms.get_mut(room_id) else {
            return false;
        };

        if entry.subscribers.remove(&id).is_none() {
            return false;
        }
        table.memberships.remove(&id);

        let remaining = entry.subscribers.len();
        tracing::debug!(
            room = %room_id,
            subscriber = %id,
            subscribers = remaining,
            "Subscriber removed"
        );

        if remaining == 0 {
            self.remove_room_locked(table, room_id, "last subscriber left");
        }

        true
    }

    fn remove_room_locked(
        &self,
        table: &mut RoomTable,
        room_id: &str,
        reason: &'static str,
    ) -> Option<RoomEntry> {
        let (room_id, entry) = table.rooms.remove_entry(room_id)?;

        for id in entry.subscribers.keys() {
            table.memberships.remove(id);
        }
        entry.closed.cancel();
        RegistryCounters::incr(&self.counters.rooms_removed);

        tracing::info!(
            room = %room_id,
            generation = entry.generation,
            evicted = entry.subscribers.len(),
            discarded = entry.pending(),
            reason = reason,
            "Room removed"
        );

        Some(entry)
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RoomRegistry {
    fn drop(&mut self) {
        // Broadcast tasks hold the table; stop them so it can be freed
        self.shutdown.cancel();
    }
}

/// Drain one room's queue and fan each record out to its subscribers
///
/// Runs until the room is removed. Single consumer per room, so records reach
/// every subscriber in publish order.
async fn broadcast_loop(
    table: Arc<RwLock<RoomTable>>,
    counters: Arc<RegistryCounters>,
    room_id: RoomId,
    generation: u64,
    mut queue: mpsc::Receiver<Record>,
    closed: CancellationToken,
) {
    tracing::debug!(room = %room_id, generation = generation, "Broadcast task started");

    loop {
        let record = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            next = queue.recv() => match next {
                Some(record) => record,
                None => break,
            },
        };

        let subscribers = {
            let table = table.read().await;
            match table.rooms.get(&room_id) {
                Some(entry) if entry.generation == generation => entry.snapshot(),
                _ => break,
            }
        };

        tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            _ = fan_out(&counters, &room_id, &subscribers, &record) => {}
        }
    }

    tracing::debug!(room = %room_id, generation = generation, "Broadcast task stopped");
}

async fn fan_out(
    counters: &RegistryCounters,
    room_id: &RoomId,
    subscribers: &[Subscriber],
    record: &Record,
) {
    for subscriber in subscribers {
        match subscriber.deliver(record).await {
            Ok(()) => RegistryCounters::incr(&counters.delivered),
            Err(e) => {
                // The connection's own disconnect signal reclaims it
                RegistryCounters::incr(&counters.delivery_failures);
                tracing::debug!(room = %room_id, error = %e, "Delivery failed");
            }
        }
    }
}
