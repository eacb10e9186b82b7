//! Connection configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::ConnectRequest;

/// Default cap on the size of a single received message (1 MiB).
pub const DEFAULT_MAX_RECEIVE_BYTES: usize = 1024 * 1024;

/// Default size of the reusable frame read buffer.
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 8192;

/// Default interval between keep-alive pings.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for a [`WebSocket`](crate::WebSocket).
///
/// The only required field is `url`; all others have defaults. Missing fields
/// also take their defaults when the config is deserialized.
///
/// # Example
///
/// ```
/// use polling_websocket::WebSocketConfig;
///
/// let config = WebSocketConfig::new("ws://localhost:8080/ws")
///     .with_subprotocol("chat.v1")
///     .with_header("Authorization", "Bearer abc")
///     .with_max_receive_bytes(64 * 1024);
/// assert_eq!(config.max_receive_bytes, 64 * 1024);
/// assert!(!config.suppress_keep_alive);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Target `ws://` or `wss://` URL.
    pub url: String,
    /// Subprotocols offered during the handshake.
    pub subprotocols: Vec<String>,
    /// Extra HTTP headers sent with the upgrade request.
    pub headers: BTreeMap<String, String>,
    /// Largest message accepted from the peer, in bytes.
    ///
    /// Larger messages are drained from the wire and reported as an error.
    /// Defaults to **1 MiB**. Values below 1 are clamped to 1.
    pub max_receive_bytes: usize,
    /// Size of the reusable buffer each frame is read into.
    ///
    /// Defaults to **8192**. Values below 1 are clamped to 1.
    pub receive_buffer_size: usize,
    /// Disable keep-alive pings entirely.
    pub suppress_keep_alive: bool,
    /// Interval between keep-alive pings when not suppressed.
    ///
    /// Defaults to **30 seconds**. A zero interval disables pings.
    pub keep_alive_interval: Duration,
    /// Upper bound on the opening handshake. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            subprotocols: Vec::new(),
            headers: BTreeMap::new(),
            max_receive_bytes: DEFAULT_MAX_RECEIVE_BYTES,
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            suppress_keep_alive: false,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            connect_timeout: None,
        }
    }
}

impl WebSocketConfig {
    /// Create a configuration for `url` with default values.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Offer an additional subprotocol.
    #[must_use]
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocols.push(protocol.into());
        self
    }

    /// Add a header to the upgrade request, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the largest accepted message size. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_max_receive_bytes(mut self, max: usize) -> Self {
        self.max_receive_bytes = max.max(1);
        self
    }

    /// Set the frame read buffer size. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = size.max(1);
        self
    }

    /// Enable or disable keep-alive suppression.
    #[must_use]
    pub fn with_suppress_keep_alive(mut self, suppress: bool) -> Self {
        self.suppress_keep_alive = suppress;
        self
    }

    /// Set the keep-alive ping interval.
    #[must_use]
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Bound the opening handshake.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Keep-alive interval in effect, or `None` when pings are off.
    pub(crate) fn keep_alive(&self) -> Option<Duration> {
        if self.suppress_keep_alive || self.keep_alive_interval.is_zero() {
            None
        } else {
            Some(self.keep_alive_interval)
        }
    }

    pub(crate) fn connect_request(&self) -> ConnectRequest {
        ConnectRequest {
            url: self.url.clone(),
            subprotocols: self.subprotocols.clone(),
            headers: self.headers.clone(),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = WebSocketConfig::new("ws://example.test");
        assert_eq!(config.url, "ws://example.test");
        assert!(config.subprotocols.is_empty());
        assert!(config.headers.is_empty());
        assert_eq!(config.max_receive_bytes, 1024 * 1024);
        assert_eq!(config.receive_buffer_size, 8192);
        assert!(!config.suppress_keep_alive);
        assert_eq!(config.keep_alive_interval, Duration::from_secs(30));
        assert!(config.connect_timeout.is_none());
    }

    #[test]
    fn sizes_are_clamped_to_one() {
        let config = WebSocketConfig::new("ws://x")
            .with_max_receive_bytes(0)
            .with_receive_buffer_size(0);
        assert_eq!(config.max_receive_bytes, 1);
        assert_eq!(config.receive_buffer_size, 1);
    }

    #[test]
    fn keep_alive_respects_suppression_and_zero_interval() {
        let config = WebSocketConfig::new("ws://x");
        assert_eq!(config.keep_alive(), Some(Duration::from_secs(30)));
        assert_eq!(config.clone().with_suppress_keep_alive(true).keep_alive(), None);
        assert_eq!(
            config.with_keep_alive_interval(Duration::ZERO).keep_alive(),
            None
        );
    }

    #[test]
    fn connect_request_carries_protocols_and_headers() {
        let request = WebSocketConfig::new("ws://x")
            .with_subprotocol("a")
            .with_subprotocol("b")
            .with_header("X-Token", "1")
            .connect_request();
        assert_eq!(request.url, "ws://x");
        assert_eq!(request.subprotocols, vec!["a", "b"]);
        assert_eq!(request.headers.get("X-Token").map(String::as_str), Some("1"));
    }

    #[test]
    fn deserializes_with_defaults_for_missing_fields() {
        let config: WebSocketConfig = serde_json::from_str(
            r#"{"url":"wss://game.test/ws","max_receive_bytes":4096,"suppress_keep_alive":true}"#,
        )
        .unwrap();
        assert_eq!(config.url, "wss://game.test/ws");
        assert_eq!(config.max_receive_bytes, 4096);
        assert!(config.suppress_keep_alive);
        assert_eq!(config.receive_buffer_size, DEFAULT_RECEIVE_BUFFER_SIZE);
    }
}
