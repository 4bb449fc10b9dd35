//! HTTP gateway
//!
//! Routes, relative to the configured prefix:
//! - `GET /room/{room_id}` - open an event stream for a room
//! - `POST /send/{room_id}` - publish `{"message": "...", "level": "..."}` to a room
//!
//! The room identifier is pulled out of the path once, by [`RoomPath`], and
//! only the identifier reaches the registry.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::PathRejection, FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::registry::{LogLevel, Message, RegistryError, RoomId, RoomRegistry};

use super::config::normalize_prefix;
use super::connection::{Connection, EventStream};

/// Shared state for the gateway handlers
#[derive(Clone)]
pub struct GatewayState {
    registry: Arc<RoomRegistry>,
    shutdown: CancellationToken,
    allowed_origin: Option<HeaderValue>,
}

impl GatewayState {
    pub fn new(registry: Arc<RoomRegistry>, shutdown: CancellationToken) -> Self {
        Self {
            registry,
            shutdown,
            allowed_origin: None,
        }
    }

    /// Pin the `Access-Control-Allow-Origin` value
    ///
    /// An origin that is not a valid header value is ignored and the
    /// client's origin is echoed instead.
    pub fn with_allowed_origin(mut self, origin: Option<&str>) -> Self {
        self.allowed_origin = origin.and_then(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = o, "Invalid allowed origin, echoing request origin");
                None
            }
        });
        self
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    fn origin_for(&self, headers: &HeaderMap) -> HeaderValue {
        self.allowed_origin
            .clone()
            .or_else(|| headers.get(header::ORIGIN).cloned())
            .unwrap_or_else(|| HeaderValue::from_static("*"))
    }
}

/// Room identifier taken from the `{room_id}` path segment
#[derive(Debug, Clone)]
pub struct RoomPath(pub RoomId);

impl<S> FromRequestParts<S> for RoomPath
where
    S: Send + Sync,
{
    type Rejection = PathRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(room_id) = Path::<String>::from_request_parts(parts, state).await?;
        Ok(RoomPath(RoomId::from(room_id)))
    }
}

/// Body of a publish request
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub level: Option<LogLevel>,
}

/// Why a publish request was refused
#[derive(Debug)]
pub enum PublishRejection {
    /// Body was not a valid publish request
    Malformed(String),
    /// Room missing or its queue saturated
    Unavailable(RegistryError),
}

impl IntoResponse for PublishRejection {
    fn into_response(self) -> Response {
        match self {
            PublishRejection::Malformed(reason) => {
                tracing::debug!(reason = %reason, "Rejected publish body");
                (StatusCode::BAD_REQUEST, "Invalid request body").into_response()
            }
            PublishRejection::Unavailable(e) => {
                tracing::debug!(error = %e, "Publish not accepted");
                (StatusCode::NOT_FOUND, "Room not found or channel full").into_response()
            }
        }
    }
}

/// Build the gateway router mounted under `prefix`
pub fn router(state: GatewayState, prefix: &str) -> Router {
    let routes = Router::new()
        .route("/room/{room_id}", get(handle_subscribe))
        .route("/send/{room_id}", post(handle_publish))
        .with_state(state);

    let prefix = normalize_prefix(prefix);
    if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&prefix, routes)
    }
}

/// Open an event stream for a room
///
/// The subscriber is registered before the response is returned, so anything
/// published after this handler completes reaches the client.
async fn handle_subscribe(
    State(state): State<GatewayState>,
    RoomPath(room_id): RoomPath,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let origin = state.origin_for(&headers);

    tracing::info!(room = %room_id, "Event stream requested");

    let (mut connection, stream) = Connection::open(Arc::clone(&state.registry), room_id);
    connection.attach().await;

    let (body, disconnected) = EventStream::new(stream);
    tokio::spawn(connection.run(disconnected, state.shutdown.clone()));

    // If the response cannot be built the body is dropped, which closes the
    // connection spawned above
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin)
        .header(header::VARY, "Origin")
        .body(Body::from_stream(body))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Publish one message to a room
async fn handle_publish(
    State(state): State<GatewayState>,
    RoomPath(room_id): RoomPath,
    body: Bytes,
) -> Result<String, PublishRejection> {
    let request: PublishRequest =
        serde_json::from_slice(&body).map_err(|e| PublishRejection::Malformed(e.to_string()))?;

    let message = Message::new(request.message).with_level(request.level.unwrap_or_default());

    state
        .registry
        .try_publish(room_id.as_str(), message)
        .await
        .map_err(PublishRejection::Unavailable)?;

    Ok(format!("Message sent to room {}", room_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GatewayState {
        GatewayState::new(Arc::new(RoomRegistry::new()), CancellationToken::new())
    }

    #[test]
    fn test_origin_echoed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://app.example"));

        assert_eq!(state().origin_for(&headers), "https://app.example");
    }

    #[test]
    fn test_origin_wildcard_without_header() {
        assert_eq!(state().origin_for(&HeaderMap::new()), "*");
    }

    #[test]
    fn test_origin_pinned() {
        let state = state().with_allowed_origin(Some("https://pinned.example"));
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://other.example"));

        assert_eq!(state.origin_for(&headers), "https://pinned.example");
    }

    #[test]
    fn test_invalid_pinned_origin_ignored() {
        let state = state().with_allowed_origin(Some("bad\norigin"));
        assert_eq!(state.origin_for(&HeaderMap::new()), "*");
    }

    #[test]
    fn test_publish_request_defaults() {
        let req: PublishRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.message, "");
        assert!(req.level.is_none());

        let req: PublishRequest =
            serde_json::from_str(r#"{"message":"hi","level":"error"}"#).unwrap();
        assert_eq!(req.message, "hi");
        assert_eq!(req.level, Some(LogLevel::Error));

        assert!(serde_json::from_str::<PublishRequest>(r#"{"level":"fatal"}"#).is_err());
    }
}
