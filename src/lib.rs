//! # Polling WebSocket
//!
//! Client-side WebSocket engine for hosts that poll for events on their own
//! schedule, such as a game loop.
//!
//! A [`WebSocket`] owns one connection attempt at a time. While connected, a
//! receive pump reassembles frames into [`Message`]s (enforcing a size cap)
//! and a send pump writes queued messages in order. Received messages and
//! errors wait in queues until the host calls
//! [`WebSocket::process_incoming`], which hands them to an [`EventHandler`]
//! errors first.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement the [`Transport`] trait for any backend
//! - **WebSocket built-in**: default `transport-websocket` feature provides
//!   `TungsteniteTransport`
//! - **Bounded reassembly**: oversized messages are drained and reported
//!   instead of buffered
//! - **Polled delivery**: callbacks only run inside `process_incoming`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn example() {
//! use std::sync::Arc;
//! use polling_websocket::{WebSocket, WebSocketConfig, WebSocketEvent};
//!
//! let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let socket = Arc::new(WebSocket::new(WebSocketConfig::new("ws://localhost:8080"), tx));
//!
//! let runner = Arc::clone(&socket);
//! tokio::spawn(async move { runner.connect().await });
//!
//! loop {
//!     socket.process_incoming();
//!     while let Ok(event) = events.try_recv() {
//!         if let WebSocketEvent::Closed(code) = event {
//!             println!("closed: {code}");
//!             return;
//!         }
//!     }
//!     tokio::time::sleep(std::time::Duration::from_millis(16)).await;
//! }
//! # }
//! ```

pub mod client;
pub mod close_code;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
mod pump;
mod queue;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::WebSocket;
pub use close_code::CloseCode;
pub use config::WebSocketConfig;
pub use error::WebSocketError;
pub use event::{EventHandler, WebSocketEvent};
pub use message::Message;
pub use transport::{ConnectionState, Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{TungsteniteConnector, TungsteniteTransport};
