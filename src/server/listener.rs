//! Room event server
//!
//! Binds the HTTP listener, serves the gateway routes and exposes the
//! in-process producer interface.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::registry::{LogLevel, Message, RegistryConfig, RoomRegistry};
use crate::server::config::ServerConfig;
use crate::server::handler::{self, GatewayState};

/// Room event server
///
/// Owns its registry; nothing is process-global. Producers in the same
/// process publish through the server (or a clone of [`registry`](Self::registry)).
pub struct RoomServer {
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
    shutdown: CancellationToken,
}

impl RoomServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry_config(config, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(config: ServerConfig, registry_config: RegistryConfig) -> Self {
        Self::with_registry(config, Arc::new(RoomRegistry::with_config(registry_config)))
    }

    /// Create a new server around an existing registry
    pub fn with_registry(config: ServerConfig, registry: Arc<RoomRegistry>) -> Self {
        Self {
            config,
            registry,
            shutdown: CancellationToken::new(),
        }
    }

    /// Get a reference to the room registry
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Gateway routes mounted under the configured prefix
    ///
    /// Merge this into a host application's router to serve rooms alongside
    /// other routes.
    pub fn router(&self) -> Router {
        let state = GatewayState::new(Arc::clone(&self.registry), self.shutdown.clone())
            .with_allowed_origin(self.config.allowed_origin.as_deref());
        handler::router(state, &self.config.prefix)
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    ///
    /// When `shutdown` resolves, every open event stream is closed so that
    /// in-flight connections can drain.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, prefix = %self.config.prefix, "Room server listening");

        let token = self.shutdown.clone();
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            token.cancel();
        };

        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await?;

        tracing::info!("Room server stopped");
        Ok(())
    }

    /// Close every open event stream served by this server
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Publish a message to a room
    ///
    /// Returns `false` if the room has no subscribers or its queue is full.
    pub async fn publish(&self, room_id: &str, message: impl Into<Message>) -> bool {
        self.registry.publish(room_id, message).await
    }

    /// Publish a message, reporting why it was not accepted
    pub async fn try_publish(&self, room_id: &str, message: impl Into<Message>) -> Result<()> {
        self.registry.try_publish(room_id, message).await?;
        Ok(())
    }

    /// Publish a message tagged with a severity level
    pub async fn publish_with_level(
        &self,
        room_id: &str,
        text: impl Into<String>,
        level: LogLevel,
    ) -> bool {
        self.registry.publish_with_level(room_id, text, level).await
    }

    /// Publish an `info` message
    pub async fn publish_info(&self, room_id: &str, text: impl Into<String>) -> bool {
        self.registry.publish_info(room_id, text).await
    }

    /// Publish a `success` message
    pub async fn publish_success(&self, room_id: &str, text: impl Into<String>) -> bool {
        self.registry.publish_success(room_id, text).await
    }

    /// Publish a `warning` message
    pub async fn publish_warning(&self, room_id: &str, text: impl Into<String>) -> bool {
        self.registry.publish_warning(room_id, text).await
    }

    /// Publish an `error` message
    pub async fn publish_error(&self, room_id: &str, text: impl Into<String>) -> bool {
        self.registry.publish_error(room_id, text).await
    }

    /// Publish a `debug` message
    pub async fn publish_debug(&self, room_id: &str, text: impl Into<String>) -> bool {
        self.registry.publish_debug(room_id, text).await
    }

    /// Force-close a room, ending every subscriber's stream
    pub async fn close_room(&self, room_id: &str) -> bool {
        self.registry.close_room(room_id).await
    }
}
