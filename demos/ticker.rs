//! Room event server with a ticking producer
//!
//! Run with: cargo run --example ticker [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example ticker                   # binds to 0.0.0.0:8080
//!   cargo run --example ticker 127.0.0.1:9000    # binds to 127.0.0.1:9000
//!
//! ## Subscribing
//!
//!   curl -N http://localhost:8080/events/room/room1
//!
//! ## Publishing
//!
//!   curl -X POST http://localhost:8080/events/send/room1 -d '{"message":"hi","level":"success"}'
//!
//! While at least one client is subscribed to `room1`, a message is published
//! to it ten times per second. With nobody listening the publish is rejected.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use roomcast::{RoomServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,roomcast=debug")),
        )
        .init();

    let addr: SocketAddr = match std::env::args().nth(1) {
        Some(arg) if arg == "localhost" => "127.0.0.1:8080".parse()?,
        Some(arg) => arg.parse()?,
        None => "0.0.0.0:8080".parse()?,
    };

    let server = Arc::new(RoomServer::new(ServerConfig::with_addr(addr)));

    let producer = Arc::clone(&server);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        let mut i: u64 = 0;
        loop {
            ticker.tick().await;
            i += 1;

            let text = format!(
                "{} - Message {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                i
            );
            if producer.publish_info("room1", text.as_str()).await {
                tracing::debug!(room = "room1", message = %text, "Sent");
            } else {
                tracing::trace!(room = "room1", "No listeners or queue full");
            }

            if i % 50 == 0 {
                if let Some(stats) = producer.registry().room_stats("room1").await {
                    println!(
                        "room1: subscribers={} pending={}/{}",
                        stats.subscriber_count, stats.pending_messages, stats.queue_capacity
                    );
                }
            }
        }
    });

    println!("Room server listening on {}", server.bind_addr());
    println!("Subscribe: curl -N http://{}/events/room/room1", server.bind_addr());

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let stats = server.registry().stats();
    println!(
        "Accepted={} rejected={} delivered={}",
        stats.accepted,
        stats.rejected(),
        stats.delivered
    );

    Ok(())
}
