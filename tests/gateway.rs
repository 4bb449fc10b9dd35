//! End-to-end tests for the HTTP gateway routes

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::{Stream, StreamExt};
use roomcast::registry::{PayloadFormat, Record};
use roomcast::{LogLevel, Message, RegistryConfig, RoomServer, ServerConfig};
use tower::ServiceExt;

fn raw_server(registry: RegistryConfig) -> RoomServer {
    RoomServer::with_registry_config(
        ServerConfig::default(),
        registry.payload_format(PayloadFormat::Raw),
    )
}

async fn open_stream(
    router: &Router,
    uri: &str,
) -> (
    axum::http::HeaderMap,
    impl Stream<Item = Result<Bytes, axum::Error>>,
) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::ORIGIN, "https://viewer.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    (headers, response.into_body().into_data_stream())
}

async fn send(router: &Router, uri: &str, body: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

async fn next_payload<S>(stream: &mut S) -> String
where
    S: Stream<Item = Result<Bytes, axum::Error>> + Unpin,
{
    let chunk = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("timed out waiting for record")
        .expect("stream ended")
        .unwrap();
    Record::from_bytes(chunk).payload()
}

#[tokio::test]
async fn test_subscribe_publish_roundtrip() {
    let server = raw_server(RegistryConfig::default());
    let router = server.router();

    let (headers, stream) = open_stream(&router, "/events/room/r1").await;
    let mut stream = Box::pin(stream);

    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers[header::CONNECTION], "keep-alive");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://viewer.example"
    );

    let (status, text) = send(&router, "/events/send/r1", r#"{"message":"hello"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Message sent to room r1");

    assert_eq!(next_payload(&mut stream).await, "hello");
}

#[tokio::test]
async fn test_publish_to_unknown_room_is_not_found() {
    let server = raw_server(RegistryConfig::default());
    let router = server.router();

    let (status, text) = send(&router, "/events/send/r2", r#"{"message":"anyone?"}"#).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(text, "Room not found or channel full");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let server = raw_server(RegistryConfig::default());
    let router = server.router();

    let (status, _) = send(&router, "/events/send/r1", "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, "/events/send/r1", r#"{"message":"x","level":"loud"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_saturated_room_rejects() {
    let server = raw_server(
        RegistryConfig::default()
            .queue_capacity(2)
            .subscriber_buffer(1),
    );
    let router = server.router();

    // Held open but never read
    let (_headers, _stream) = open_stream(&router, "/events/room/slow").await;

    let mut statuses = Vec::new();
    for i in 0..10 {
        let (status, _) = send(&router, "/events/send/slow", &format!(r#"{{"message":"m{}"}}"#, i)).await;
        statuses.push(status);
    }

    // Queue, one record in flight and the subscriber buffer absorb at most four
    let first_rejected = statuses
        .iter()
        .position(|s| *s == StatusCode::NOT_FOUND)
        .expect("queue never saturated");
    assert!(first_rejected >= 2 && first_rejected <= 4, "{:?}", statuses);
    assert!(statuses[..first_rejected].iter().all(|s| *s == StatusCode::OK));
    assert!(server.registry().stats().rejected_full > 0);
}

#[tokio::test]
async fn test_disconnect_tears_down_room() {
    let server = raw_server(RegistryConfig::default());
    let router = server.router();

    let (_headers, stream) = open_stream(&router, "/events/room/r1").await;
    let (status, _) = send(&router, "/events/send/r1", r#"{"message":"hi"}"#).await;
    assert_eq!(status, StatusCode::OK);

    drop(stream);

    tokio::time::timeout(Duration::from_secs(1), async {
        while server.registry().room_exists("r1").await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("room was not removed after disconnect");

    let (status, _) = send(&router, "/events/send/r1", r#"{"message":"late"}"#).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_two_subscribers_each_receive() {
    let server = raw_server(RegistryConfig::default());
    let router = server.router();

    let (_, a) = open_stream(&router, "/events/room/shared").await;
    let (_, b) = open_stream(&router, "/events/room/shared").await;
    let mut a = Box::pin(a);
    let mut b = Box::pin(b);

    for text in ["first", "second"] {
        let body = format!(r#"{{"message":"{}"}}"#, text);
        assert_eq!(send(&router, "/events/send/shared", &body).await.0, StatusCode::OK);
    }

    for stream in [&mut a, &mut b] {
        assert_eq!(next_payload(stream).await, "first");
        assert_eq!(next_payload(stream).await, "second");
    }
}

#[tokio::test]
async fn test_structured_payload_with_level() {
    let server = RoomServer::new(ServerConfig::default());
    let router = server.router();

    let (_, stream) = open_stream(&router, "/events/room/ops").await;
    let mut stream = Box::pin(stream);

    let (status, _) = send(
        &router,
        "/events/send/ops",
        r#"{"message":"disk full","level":"error"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let message: Message = serde_json::from_str(&next_payload(&mut stream).await).unwrap();
    assert_eq!(message.level(), LogLevel::Error);
    assert_eq!(message.text(), "disk full");
}

#[tokio::test]
async fn test_close_room_ends_stream() {
    let server = raw_server(RegistryConfig::default());
    let router = server.router();

    let (_, stream) = open_stream(&router, "/events/room/r1").await;
    let mut stream = Box::pin(stream);

    assert!(server.close_room("r1").await);

    let end = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("stream did not end");
    assert!(end.is_none());
    assert!(!server.publish("r1", "gone").await);
}

#[tokio::test]
async fn test_root_prefix() {
    let server = RoomServer::with_registry_config(
        ServerConfig::default().prefix("/"),
        RegistryConfig::default().payload_format(PayloadFormat::Raw),
    );
    let router = server.router();

    let (_, stream) = open_stream(&router, "/room/top").await;
    let mut stream = Box::pin(stream);

    assert!(server.publish_debug("top", "at root").await);
    assert_eq!(next_payload(&mut stream).await, "at root");
}
