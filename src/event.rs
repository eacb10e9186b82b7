//! Notifications delivered to the consumer.
//!
//! The engine reports everything through an [`EventHandler`]. `on_open` and
//! `on_close` are called from the task awaiting
//! [`WebSocket::connect`](crate::WebSocket::connect); `on_error` and
//! `on_message` for data received in the background are called from
//! [`WebSocket::process_incoming`](crate::WebSocket::process_incoming).

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::close_code::CloseCode;
use crate::message::Message;

/// Observer for connection notifications. Every method defaults to a no-op.
pub trait EventHandler: Send + Sync + 'static {
    /// The opening handshake completed.
    fn on_open(&self) {}

    /// A complete message was received.
    fn on_message(&self, message: Message) {
        let _ = message;
    }

    /// A connection or protocol error occurred.
    fn on_error(&self, error: String) {
        let _ = error;
    }

    /// The connection attempt ended. Called exactly once per attempt.
    fn on_close(&self, code: CloseCode) {
        let _ = code;
    }
}

/// Lets the caller keep its own handle to a shared handler.
impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    fn on_open(&self) {
        (**self).on_open();
    }

    fn on_message(&self, message: Message) {
        (**self).on_message(message);
    }

    fn on_error(&self, error: String) {
        (**self).on_error(error);
    }

    fn on_close(&self, code: CloseCode) {
        (**self).on_close(code);
    }
}

/// Notifications as a value, for channel-based consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebSocketEvent {
    /// See [`EventHandler::on_open`].
    Opened,
    /// See [`EventHandler::on_message`].
    Message(Message),
    /// See [`EventHandler::on_error`].
    Error(String),
    /// See [`EventHandler::on_close`].
    Closed(CloseCode),
}

/// Forwards every notification into an unbounded channel. Events are dropped
/// silently once the receiver is gone.
impl EventHandler for mpsc::UnboundedSender<WebSocketEvent> {
    fn on_open(&self) {
        let _ = self.send(WebSocketEvent::Opened);
    }

    fn on_message(&self, message: Message) {
        let _ = self.send(WebSocketEvent::Message(message));
    }

    fn on_error(&self, error: String) {
        let _ = self.send(WebSocketEvent::Error(error));
    }

    fn on_close(&self, code: CloseCode) {
        let _ = self.send(WebSocketEvent::Closed(code));
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
    fn channel_handler_forwards_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.on_open();
        tx.on_error("boom".into());
        tx.on_message(Message::text("hi"));
        tx.on_close(CloseCode::Normal);

        assert_eq!(rx.try_recv().unwrap(), WebSocketEvent::Opened);
        assert_eq!(rx.try_recv().unwrap(), WebSocketEvent::Error("boom".into()));
        assert_eq!(
            rx.try_recv().unwrap(),
            WebSocketEvent::Message(Message::text("hi"))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            WebSocketEvent::Closed(CloseCode::Normal)
        );
    }

    #[test]
    fn channel_handler_ignores_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.on_open();
        tx.on_close(CloseCode::Abnormal);
    }
}
