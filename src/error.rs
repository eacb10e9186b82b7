//! Error types for the WebSocket engine.

use thiserror::Error;

/// Errors that can occur inside the WebSocket engine or its transports.
///
/// Most of these never reach the caller directly: connection failures are
/// reported through [`EventHandler::on_error`](crate::EventHandler::on_error)
/// as strings. Only precondition violations (e.g. [`AlreadyConnected`]) are
/// returned from the public API.
///
/// [`AlreadyConnected`]: WebSocketError::AlreadyConnected
#[derive(Debug, Error)]
pub enum WebSocketError {
    /// The opening handshake failed.
    #[error("connect error: {0}")]
    Connect(String),

    /// Failed to write a frame to the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to read a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport is not open.
    #[error("transport connection closed")]
    TransportClosed,

    /// `connect` was called while a previous attempt is still running.
    #[error("already connected")]
    AlreadyConnected,

    /// An operation that requires a connection attempt was called without one.
    #[error("not connected")]
    NotConnected,

    /// A configured header name or value is not valid HTTP.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The opening handshake did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// Failed to serialize or deserialize a JSON message payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized [`Result`] type for WebSocket engine operations.
pub type Result<T> = std::result::Result<T, WebSocketError>;
