//! # Echo Client Example
//!
//! Drives a [`WebSocket`] the way a game loop would:
//!
//! 1. Spawn the connection attempt in the background
//! 2. Send a few messages once the connection opens
//! 3. Call `process_incoming` once per "frame" and print what arrives
//! 4. Close gracefully on Ctrl+C or after the echoes come back
//!
//! ## Running
//!
//! ```sh
//! # Start any echo server on localhost:8080, then:
//! cargo run --example echo_client
//!
//! # Override the server URL:
//! ECHO_URL=ws://my-server:9000/ws cargo run --example echo_client
//! ```

use std::sync::Arc;
use std::time::Duration;

use polling_websocket::{ConnectionState, WebSocket, WebSocketConfig, WebSocketEvent};

/// Default server URL when `ECHO_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8080";

/// Roughly 60 polls per second.
const FRAME: Duration = Duration::from_millis(16);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let url = std::env::var("ECHO_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let config = WebSocketConfig::new(url).with_max_receive_bytes(64 * 1024);

    // Notifications land in a channel; the loop below reads it after every poll.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let socket = Arc::new(WebSocket::new(config, event_tx));

    let runner = Arc::clone(&socket);
    let connection = tokio::spawn(async move { runner.connect().await });

    let mut sent = false;
    let mut echoes = 0;
    let mut ticker = tokio::time::interval(FRAME);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, closing");
                socket.close().await;
            }
        }

        if !sent && socket.state() == ConnectionState::Open {
            socket.send_text("hello from the game loop")?;
            socket.send_binary(vec![0xCA, 0xFE])?;
            sent = true;
        }

        socket.process_incoming();
        while let Ok(event) = event_rx.try_recv() {
            match event {
                WebSocketEvent::Opened => tracing::info!("Opened"),
                WebSocketEvent::Message(message) => {
                    tracing::info!("Message ({} bytes): {message:?}", message.len());
                    echoes += 1;
                    if echoes == 2 {
                        socket.close().await;
                    }
                }
                WebSocketEvent::Error(error) => tracing::warn!("Error: {error}"),
                WebSocketEvent::Closed(code) => {
                    tracing::info!("Closed: {code} ({})", code.description());
                    connection.await??;
                    return Ok(());
                }
            }
        }
    }
}
