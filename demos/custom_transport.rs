//! # Custom Transport Example
//!
//! Shows how to implement the [`Transport`] trait with an in-process loopback
//! that echoes every message back. Useful for:
//!
//! - **Testing**: exercise your polling loop without a real server
//! - **Custom backends**: adapt any framed I/O layer to the engine
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_transport
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use polling_websocket::transport::{ConnectRequest, FrameKind, ReceiveResult};
use polling_websocket::{
    ConnectionState, Message, Transport, WebSocket, WebSocketConfig, WebSocketError,
    WebSocketEvent,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: Define a loopback transport
// ─────────────────────────────────────────────────────────────────────

/// Everything sent comes straight back. Messages larger than the receive
/// buffer are handed out in several chunks, like a fragmented message.
struct LoopbackTransport {
    state: Mutex<(ConnectionState, Option<u16>)>,
    tx: mpsc::UnboundedSender<Option<Message>>,
    rx: tokio::sync::Mutex<(mpsc::UnboundedReceiver<Option<Message>>, Option<(Message, usize)>)>,
}

impl LoopbackTransport {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new((ConnectionState::Connecting, None)),
            tx,
            rx: tokio::sync::Mutex::new((rx, None)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement the Transport trait
// ─────────────────────────────────────────────────────────────────────

#[async_trait]
impl Transport for LoopbackTransport {
    fn state(&self) -> ConnectionState {
        self.state.lock().0
    }

    fn close_status(&self) -> Option<u16> {
        self.state.lock().1
    }

    async fn connect(&self, request: &ConnectRequest) -> Result<(), WebSocketError> {
        tracing::info!("Loopback 'connected' to {}", request.url);
        self.state.lock().0 = ConnectionState::Open;
        Ok(())
    }

    async fn receive(&self, buffer: &mut [u8]) -> Result<ReceiveResult, WebSocketError> {
        let mut guard = self.rx.lock().await;
        let (rx, pending) = &mut *guard;

        if pending.is_none() {
            match rx.recv().await {
                Some(Some(message)) => *pending = Some((message, 0)),
                // `None` inside the channel is our close frame.
                Some(None) | None => {
                    self.state.lock().0 = ConnectionState::Closed;
                    return Ok(ReceiveResult::close());
                }
            }
        }

        let Some((message, offset)) = pending.as_mut() else {
            return Err(WebSocketError::TransportReceive("no pending message".into()));
        };
        let remaining = message.as_bytes().get(*offset..).unwrap_or_default();
        let count = remaining.len().min(buffer.len());
        if let (Some(dst), Some(src)) = (buffer.get_mut(..count), remaining.get(..count)) {
            dst.copy_from_slice(src);
        }
        *offset += count;

        let kind = if message.is_text() {
            FrameKind::Text
        } else {
            FrameKind::Binary
        };
        let end = *offset >= message.len();
        if end {
            *pending = None;
        }
        Ok(ReceiveResult::data(kind, count, end))
    }

    async fn send(&self, message: Message) -> Result<(), WebSocketError> {
        self.tx
            .send(Some(message))
            .map_err(|e| WebSocketError::TransportSend(e.to_string()))
    }

    async fn close(&self, code: u16, _reason: &str) -> Result<(), WebSocketError> {
        *self.state.lock() = (ConnectionState::Closing, Some(code));
        self.tx
            .send(None)
            .map_err(|e| WebSocketError::TransportSend(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Wire it into the engine and poll
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // A tiny receive buffer forces multi-chunk reassembly.
    let config = WebSocketConfig::new("loopback://demo")
        .with_receive_buffer_size(4)
        .with_max_receive_bytes(32)
        .with_suppress_keep_alive(true);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let socket = Arc::new(WebSocket::with_connector(
        config,
        event_tx,
        || -> Arc<dyn Transport> { Arc::new(LoopbackTransport::new()) },
    ));

    let runner = Arc::clone(&socket);
    let connection = tokio::spawn(async move { runner.connect().await });

    while socket.state() != ConnectionState::Open {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    socket.send_text("reassembled from chunks")?;
    socket.send_text("this one is far too long for the configured cap")?;
    socket.send_binary(vec![1, 2, 3])?;

    let mut seen = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(16)).await;
        socket.process_incoming();
        while let Ok(event) = event_rx.try_recv() {
            tracing::info!("Event: {event:?}");
            match event {
                WebSocketEvent::Message(_) | WebSocketEvent::Error(_) => {
                    seen += 1;
                    if seen == 3 {
                        socket.close().await;
                    }
                }
                WebSocketEvent::Closed(code) => {
                    connection.await??;
                    tracing::info!("Done, closed with {code}. Custom transport works!");
                    return Ok(());
                }
                WebSocketEvent::Opened => {}
            }
        }
    }
}
