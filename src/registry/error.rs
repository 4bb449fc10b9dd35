//! Registry error types
//!
//! Publish outcomes that are not an accepted message. Neither is exceptional:
//! a room can disappear at any moment under a concurrent unsubscribe, and a
//! full queue only means the producer should retry later or accept the drop.

use super::room::RoomId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Room has no live queue (never created, or already torn down)
    RoomNotFound(RoomId),
    /// Room exists but its pending queue is at capacity
    QueueFull(RoomId),
}

impl RegistryError {
    /// Room the failed publish was addressed to
    pub fn room_id(&self) -> &RoomId {
        match self {
            RegistryError::RoomNotFound(id) | RegistryError::QueueFull(id) => id,
        }
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::RoomNotFound(id) => write!(f, "Room not found: {}", id),
            RegistryError::QueueFull(id) => write!(f, "Room queue full: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
