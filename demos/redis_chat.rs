//! Chat rooms over a real Redis server.
//!
//! Expects Redis on `REDIS_HOST:REDIS_PORT` (default `127.0.0.1:6379`).
//!
//! Run with: cargo run --example redis_chat

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn
)]

use std::time::Duration;

use redis_pubsub::{create_client, ClientConfig, Result, DEFAULT_PORT};
use serde_json::json;
use tokio::sync::oneshot;
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .init();

    let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port = std::env::var("REDIS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let config = ClientConfig::new(port, host)
        .with_client_id("redis-chat")
        .with_max_connect_attempts(3)
        .with_reconnect_delay(Duration::from_millis(500));

    let client = create_client(&config)?;

    client.on_error(|err| eprintln!("error: {err}"));

    let (ready_tx, ready_rx) = oneshot::channel();
    let ready_tx = std::sync::Mutex::new(Some(ready_tx));
    client.on_ready(move || {
        if let Some(tx) = ready_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    });

    client.on("chat.*", |payload, channel| println!("[{channel}] {payload}"));

    if tokio::time::timeout(Duration::from_secs(5), ready_rx).await.is_err() {
        eprintln!("redis not reachable");
        client.close().await?;
        return Ok(());
    }

    client.publish("chat.lobby", &json!({ "from": "ana", "text": "hello" }))?;
    client.publish("chat.rust", &json!({ "from": "bo", "text": "hi" }))?;

    tokio::time::sleep(Duration::from_millis(200)).await;

    client.close().await?;
    Ok(())
}
