//! Chat rooms over the in-memory broker.
//!
//! Two clients share one `MemoryBroker`: one listens on `chat.*`, the other
//! posts to a couple of rooms.
//!
//! Run with: cargo run --example memory_chat

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn
)]

use std::time::Duration;

use redis_pubsub::{create_memory_client, ClientConfig, MemoryBroker, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

#[derive(Debug, Serialize, Deserialize)]
struct ChatLine {
    from: String,
    text: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .init();

    let broker = MemoryBroker::new();

    let listener = create_memory_client(&broker, &ClientConfig::default().with_client_id("listener"))?;
    let poster = create_memory_client(&broker, &ClientConfig::default().with_client_id("poster"))?;

    listener.on_error(|err| eprintln!("listener error: {err}"));
    listener.on_ready(|| println!("listener ready"));

    listener.on("chat.*", |payload, channel| {
        match serde_json::from_value::<ChatLine>(payload.clone()) {
            Ok(line) => println!("[{channel}] {}: {}", line.from, line.text),
            Err(err) => eprintln!("[{channel}] unexpected payload {payload}: {err}"),
        }
    });

    listener.once("chat.lobby", |_, _| println!("first lobby message seen"));

    for (room, text) in [("lobby", "hello"), ("rust", "borrowck says hi"), ("lobby", "bye")] {
        poster.publish(
            &format!("chat.{room}"),
            &ChatLine {
                from: "ana".into(),
                text: text.into(),
            },
        )?;
    }

    // give the listener's event pump a moment to drain
    tokio::time::sleep(Duration::from_millis(50)).await;

    poster.close().await?;
    listener.close().await?;
    Ok(())
}
