//! Room registry for pub/sub fan-out
//!
//! The registry owns every live room: its bounded queue of pending records and
//! its set of subscribers. Each room has exactly one broadcast task that drains
//! the queue and writes every record to every current subscriber.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<RoomRegistry>
//!                   ┌──────────────────────────────┐
//!                   │ RwLock<RoomTable {           │
//!                   │   rooms: HashMap<RoomId,     │
//!                   │     RoomEntry {              │
//!                   │       queue: mpsc::Tx,       │
//!                   │       subscribers,           │
//!                   │     }>,                      │
//!                   │   memberships,               │
//!                   │ }>                           │
//!                   └──────────────┬───────────────┘
//!                                  │
//!        publish() ── try_send ──► queue ──► broadcast_loop (one per room)
//!                                                 │
//!                         ┌───────────────────────┼───────────────────────┐
//!                         ▼                       ▼                       ▼
//!                   [Subscriber]            [Subscriber]            [Subscriber]
//!                   deliver().await         deliver().await         deliver().await
//!                         │                       │                       │
//!                         ▼                       ▼                       ▼
//!                  SubscriberStream ──► HTTP response body ──► client
//! ```
//!
//! # Lifecycle
//!
//! A room is created by the first `ensure_room` or `subscribe` and removed,
//! together with its queue, when its last subscriber leaves or when it is
//! closed. Removal happens under the write lock, so a publish either lands in
//! the queue before removal or sees the room as gone.
//!
//! # Zero-Copy Design
//!
//! A message is encoded into a [`Record`] once, at publish time. Records wrap
//! `bytes::Bytes`, so every subscriber of a room shares the same allocation.

pub mod config;
pub mod error;
pub mod message;
pub mod room;
pub mod stats;
pub mod store;
pub mod subscriber;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use message::{LogLevel, Message, PayloadFormat, Record, UnknownLevel};
pub use room::{QueueHandle, RoomId, RoomStats};
pub use stats::RegistrySnapshot;
pub use store::RoomRegistry;
pub use subscriber::{Disconnected, Subscriber, SubscriberId, SubscriberStream};
