//! Frame transport abstraction.
//!
//! The [`Transport`] trait is the engine's view of a single WebSocket
//! connection: an opening handshake, frame-level reads into a caller-owned
//! buffer, whole-message writes and a close handshake. The engine never owns
//! the socket directly; it asks a [`Connector`] for a fresh transport on every
//! connection attempt and shares it between the receive and send pumps via
//! `Arc`, which is why every method takes `&self`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use polling_websocket::transport::{ConnectRequest, ConnectionState, ReceiveResult, Transport};
//! use polling_websocket::{Message, WebSocketError};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     fn state(&self) -> ConnectionState {
//!         todo!()
//!     }
//!
//!     fn close_status(&self) -> Option<u16> {
//!         todo!()
//!     }
//!
//!     async fn connect(&self, request: &ConnectRequest) -> Result<(), WebSocketError> {
//!         todo!()
//!     }
//!
//!     async fn receive(&self, buffer: &mut [u8]) -> Result<ReceiveResult, WebSocketError> {
//!         todo!()
//!     }
//!
//!     async fn send(&self, message: Message) -> Result<(), WebSocketError> {
//!         todo!()
//!     }
//!
//!     async fn close(&self, code: u16, reason: &str) -> Result<(), WebSocketError> {
//!         todo!()
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WebSocketError;
use crate::message::Message;

/// Lifecycle state of a connection, always read from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// The opening handshake is in progress.
    Connecting,
    /// The handshake completed and frames may flow in both directions.
    Open,
    /// A close handshake has been started.
    Closing,
    /// The connection is closed, or no transport exists.
    Closed,
}

/// Kind of payload carried by a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// UTF-8 text payload.
    Text,
    /// Binary payload.
    Binary,
    /// The peer closed the connection; no payload was read.
    Close,
}

/// Outcome of a single [`Transport::receive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveResult {
    /// Number of payload bytes written into the caller's buffer.
    pub count: usize,
    /// Kind of the message this frame belongs to.
    pub kind: FrameKind,
    /// `true` on the last frame of a message.
    pub end_of_message: bool,
}

impl ReceiveResult {
    /// A payload-carrying frame.
    pub fn data(kind: FrameKind, count: usize, end_of_message: bool) -> Self {
        Self {
            count,
            kind,
            end_of_message,
        }
    }

    /// The close marker.
    pub fn close() -> Self {
        Self {
            count: 0,
            kind: FrameKind::Close,
            end_of_message: true,
        }
    }
}

/// Parameters for the opening handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Target `ws://` or `wss://` URL.
    pub url: String,
    /// Subprotocols offered in `Sec-WebSocket-Protocol`.
    pub subprotocols: Vec<String>,
    /// Extra HTTP headers for the upgrade request.
    pub headers: BTreeMap<String, String>,
}

/// A single WebSocket connection at frame granularity.
///
/// # Concurrency
///
/// The receive pump calls [`receive`](Transport::receive) while the send pump
/// concurrently calls [`send`](Transport::send). Implementations must allow
/// these to make progress independently (e.g. by locking the read and write
/// halves separately).
///
/// # Cancel Safety
///
/// In-flight calls are dropped when a connection attempt is cancelled. The
/// transport is discarded afterwards, so implementations need not preserve
/// partially read data across a cancelled call.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Current lifecycle state. Must be cheap; the pumps poll it every loop.
    fn state(&self) -> ConnectionState;

    /// Close status received from (or sent to) the peer, if any.
    fn close_status(&self) -> Option<u16>;

    /// Perform the opening handshake.
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::Connect`] (or a more specific variant) if the
    /// handshake fails.
    async fn connect(&self, request: &ConnectRequest) -> Result<(), WebSocketError>;

    /// Read the next frame, or the next chunk of one, into `buffer`.
    ///
    /// Returns [`FrameKind::Close`] once the peer has closed the connection.
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::TransportReceive`] on a read failure.
    async fn receive(&self, buffer: &mut [u8]) -> Result<ReceiveResult, WebSocketError>;

    /// Write `message` as one complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::TransportClosed`] when the connection is not
    /// open, or [`WebSocketError::TransportSend`] on a write failure.
    async fn send(&self, message: Message) -> Result<(), WebSocketError>;

    /// Write a keep-alive ping. Transports without a ping concept may ignore it.
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::TransportSend`] on a write failure.
    async fn ping(&self) -> Result<(), WebSocketError> {
        Ok(())
    }

    /// Start the close handshake with `code` and `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::TransportSend`] if the close frame could not
    /// be written.
    async fn close(&self, code: u16, reason: &str) -> Result<(), WebSocketError>;
}

/// Creates a fresh, unconnected [`Transport`] for each connection attempt.
pub trait Connector: Send + Sync + 'static {
    /// Build a new transport in the [`Connecting`](ConnectionState::Connecting) state.
    fn create(&self) -> Arc<dyn Transport>;
}

impl<F> Connector for F
where
    F: Fn() -> Arc<dyn Transport> + Send + Sync + 'static,
{
    fn create(&self) -> Arc<dyn Transport> {
        self()
    }
}
