//! Room-based server-sent event fan-out
//!
//! Clients open a long-lived event stream for a named room; producers publish
//! text messages to that room and every current subscriber receives them in
//! publish order.
//!
//! ```no_run
//! use roomcast::{RoomServer, ServerConfig};
//!
//! # async fn example() -> roomcast::error::Result<()> {
//! let server = RoomServer::new(ServerConfig::default());
//!
//! // GET  /events/room/build-42   -> event stream
//! // POST /events/send/build-42   -> {"message": "..."}
//! let registry = server.registry().clone();
//! tokio::spawn(async move {
//!     registry.publish_info("build-42", "compiling").await;
//! });
//!
//! server.run().await
//! # }
//! ```

pub mod error;
pub mod registry;
pub mod server;

pub use registry::{LogLevel, Message, RegistryConfig, RoomRegistry};
pub use server::{RoomServer, ServerConfig};
