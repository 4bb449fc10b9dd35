//! HTTP server for room event streams
//!
//! - [`RoomServer`]: owns the registry, binds the listener, producer API
//! - [`handler`]: axum routes for subscribe and publish
//! - [`connection`]: per-subscriber lifecycle

pub mod config;
pub mod connection;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use connection::{Connection, ConnectionState};
pub use handler::GatewayState;
pub use listener::RoomServer;
