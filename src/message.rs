//! Application-level WebSocket messages.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// One complete text or binary message.
///
/// Incoming messages are produced by the receive pump once every frame of a
/// message has arrived; outgoing messages are written as a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A UTF-8 text message.
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
}

impl Message {
    /// Create a text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a binary message.
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(data.into())
    }

    /// Serialize `value` as a JSON text message.
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::Serialization`](crate::WebSocketError::Serialization)
    /// if `value` cannot be serialized.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Text(serde_json::to_string(value)?))
    }

    /// Parse the payload of this message as JSON. Works for both text and
    /// binary messages.
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::Serialization`](crate::WebSocketError::Serialization)
    /// if the payload is not valid JSON for `T`.
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(self.as_bytes())?)
    }

    /// Returns `true` for [`Message::Text`].
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Returns `true` for [`Message::Binary`].
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// Consume the message and return the raw payload bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(data) => data,
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
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
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Move {
        x: i32,
        y: i32,
    }

    #[test]
    fn conversions_preserve_tag() {
        assert!(Message::from("hi").is_text());
        assert!(Message::from(String::from("hi")).is_text());
        assert!(Message::from(vec![1u8, 2, 3]).is_binary());
    }

    #[test]
    fn len_counts_bytes_not_chars() {
        let msg = Message::text("héllo");
        assert_eq!(msg.len(), 6);
        assert!(!msg.is_empty());
        assert!(Message::binary(Vec::new()).is_empty());
    }

    #[test]
    fn json_helpers() {
        let msg = Message::json(&Move { x: 1, y: -2 }).unwrap();
        assert!(msg.is_text());
        assert_eq!(msg.parse_json::<Move>().unwrap(), Move { x: 1, y: -2 });

        let binary = Message::binary(br#"{"x":3,"y":4}"#.to_vec());
        assert_eq!(binary.parse_json::<Move>().unwrap(), Move { x: 3, y: 4 });
    }

    #[test]
    fn parse_json_rejects_garbage() {
        let err = Message::text("not json").parse_json::<Move>().unwrap_err();
        assert!(matches!(err, crate::WebSocketError::Serialization(_)));
    }

    #[test]
    fn into_bytes_returns_payload() {
        assert_eq!(Message::text("ab").into_bytes(), b"ab".to_vec());
        assert_eq!(Message::binary(vec![9u8]).into_bytes(), vec![9u8]);
    }
}
