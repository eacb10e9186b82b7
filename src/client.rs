//! Connection lifecycle controller.
//!
//! [`WebSocket`] owns one connection attempt at a time. [`connect`] runs the
//! whole attempt: handshake, then the receive and send pumps side by side
//! until either finishes or the attempt is cancelled, then the close code is
//! reported. Data that arrives in the meantime is queued and only handed to
//! the [`EventHandler`] when the consumer calls [`process_incoming`].
//!
//! # Example
//!
//! ```rust,ignore
//! let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let socket = Arc::new(WebSocket::new(WebSocketConfig::new("ws://localhost:8080"), tx));
//!
//! let runner = Arc::clone(&socket);
//! tokio::spawn(async move { runner.connect().await });
//!
//! loop {
//!     socket.process_incoming();
//!     while let Ok(event) = events.try_recv() { /* … */ }
//!     tick().await;
//! }
//! ```
//!
//! [`connect`]: WebSocket::connect
//! [`process_incoming`]: WebSocket::process_incoming

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::close_code::CloseCode;
use crate::config::WebSocketConfig;
use crate::error::{Result, WebSocketError};
use crate::event::EventHandler;
use crate::message::Message;
use crate::pump::{receive_pump, send_pump};
use crate::queue::{EventQueue, OutgoingQueue};
use crate::transport::{ConnectionState, Connector, Transport};

/// Normal-closure status sent by [`WebSocket::close`].
const NORMAL_CLOSURE: u16 = 1000;

// ── Attempt state ───────────────────────────────────────────────────

/// Everything that belongs to a single `connect` call.
struct Attempt {
    id: Uuid,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
}

// ── Engine handle ───────────────────────────────────────────────────

/// A single client-side WebSocket connection with polled event delivery.
///
/// All methods take `&self`, so the usual setup is an `Arc<WebSocket>` shared
/// between the task awaiting [`connect`](WebSocket::connect) and the consumer
/// that calls [`process_incoming`](WebSocket::process_incoming).
pub struct WebSocket {
    config: WebSocketConfig,
    handler: Arc<dyn EventHandler>,
    connector: Arc<dyn Connector>,
    attempt: Mutex<Option<Attempt>>,
    outgoing: OutgoingQueue<Message>,
    incoming: EventQueue<Message>,
    errors: EventQueue<String>,
}

impl WebSocket {
    /// Create an engine that connects with the built-in `tokio-tungstenite`
    /// transport.
    #[cfg(feature = "transport-websocket")]
    pub fn new(config: WebSocketConfig, handler: impl EventHandler) -> Self {
        Self::with_connector(
            config,
            handler,
            crate::transports::websocket::TungsteniteConnector::new(),
        )
    }

    /// Create an engine that obtains a fresh transport from `connector` on
    /// every connection attempt.
    pub fn with_connector(
        config: WebSocketConfig,
        handler: impl EventHandler,
        connector: impl Connector,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
            connector: Arc::new(connector),
            attempt: Mutex::new(None),
            outgoing: OutgoingQueue::new(),
            incoming: EventQueue::new(),
            errors: EventQueue::new(),
        }
    }

    /// Run one connection attempt to completion.
    ///
    /// Fires `on_open` once the handshake succeeds and `on_close` exactly once
    /// when the attempt ends, whatever the reason. Failures other than a
    /// requested cancellation are reported through `on_error`; they are never
    /// returned from this method.
    ///
    /// By the time `on_close` runs the attempt has been torn down: unsent
    /// messages are gone, [`send`](WebSocket::send) reports `NotConnected`,
    /// and a new `connect` may start right away.
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::AlreadyConnected`] if another attempt is in
    /// progress. No notification fires in that case.
    pub async fn connect(&self) -> Result<()> {
        let (id, transport, cancel) = {
            let mut slot = self.attempt.lock();
            if slot.is_some() {
                return Err(WebSocketError::AlreadyConnected);
            }
            let attempt = Attempt {
                id: Uuid::new_v4(),
                transport: self.connector.create(),
                cancel: CancellationToken::new(),
            };
            let parts = (
                attempt.id,
                Arc::clone(&attempt.transport),
                attempt.cancel.clone(),
            );
            *slot = Some(attempt);
            parts
        };

        info!(attempt = %id, url = %self.config.url, "connecting");

        match self.run(transport.as_ref(), &cancel).await {
            Ok(()) => debug!(attempt = %id, "connection finished"),
            Err(e) if cancel.is_cancelled() => {
                debug!(attempt = %id, "connection cancelled: {e}");
            }
            Err(e) => {
                error!(attempt = %id, "connection failed: {e}");
                self.handler.on_error(e.to_string());
            }
        }

        let code = CloseCode::from_status(transport.close_status());

        // Tear down before notifying so `on_close` sees a disconnected engine.
        {
            let mut slot = self.attempt.lock();
            *slot = None;
            let unsent = self.outgoing.len();
            if unsent > 0 {
                debug!(attempt = %id, unsent, "discarding unsent messages");
            }
            self.outgoing.clear();
        }

        info!(attempt = %id, %code, "connection closed");
        self.handler.on_close(code);
        Ok(())
    }

    /// Handshake, then both pumps until one finishes or `cancel` fires.
    async fn run(&self, transport: &dyn Transport, cancel: &CancellationToken) -> Result<()> {
        let request = self.config.connect_request();
        let handshake = async {
            match self.config.connect_timeout {
                Some(limit) => tokio::time::timeout(limit, transport.connect(&request))
                    .await
                    .unwrap_or(Err(WebSocketError::Timeout)),
                None => transport.connect(&request).await,
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("cancelled during handshake");
                return Ok(());
            }
            result = handshake => result?,
        }

        self.handler.on_open();

        let receive = receive_pump(
            transport,
            self.config.max_receive_bytes,
            self.config.receive_buffer_size,
            &self.incoming,
            &self.errors,
        );
        let send = send_pump(transport, &self.outgoing, self.config.keep_alive());

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("cancelled while open");
                Ok(())
            }
            result = receive => {
                debug!("receive pump exited");
                result
            }
            result = send => {
                debug!("send pump exited");
                result
            }
        }
    }

    /// Close the connection gracefully.
    ///
    /// Sends a normal-closure frame when open, cancels the attempt when the
    /// handshake is still running, and does nothing otherwise. The close frame
    /// is written regardless of the attempt's cancellation token.
    pub async fn close(&self) {
        let current = self
            .attempt
            .lock()
            .as_ref()
            .map(|a| (Arc::clone(&a.transport), a.cancel.clone()));
        let Some((transport, cancel)) = current else {
            return;
        };

        match transport.state() {
            ConnectionState::Open => {
                debug!("starting close handshake");
                if let Err(e) = transport.close(NORMAL_CLOSURE, "").await {
                    warn!("close handshake failed: {e}");
                    self.errors.push(e.to_string());
                }
            }
            ConnectionState::Connecting => {
                debug!("close requested during handshake, cancelling");
                cancel.cancel();
            }
            ConnectionState::Closing | ConnectionState::Closed => {}
        }
    }

    /// Abort the current attempt immediately, without a close handshake.
    pub fn cancel(&self) {
        if let Some(attempt) = self.attempt.lock().as_ref() {
            debug!(attempt = %attempt.id, "cancel requested");
            attempt.cancel.cancel();
        }
    }

    /// Queue `message` for the send pump. Never blocks.
    ///
    /// Messages queued while the handshake is still running are sent once the
    /// connection opens. Messages still queued when the attempt ends are
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::NotConnected`] if no attempt is in progress.
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        // Hold the slot while queueing so teardown cannot clear in between.
        let slot = self.attempt.lock();
        if slot.is_none() {
            return Err(WebSocketError::NotConnected);
        }
        self.outgoing.push(message.into());
        Ok(())
    }

    /// Queue a text message. See [`send`](WebSocket::send).
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::NotConnected`] if no attempt is in progress.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::Text(text.into()))
    }

    /// Queue a binary message. See [`send`](WebSocket::send).
    ///
    /// # Errors
    ///
    /// Returns [`WebSocketError::NotConnected`] if no attempt is in progress.
    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::Binary(data.into()))
    }

    /// Deliver everything queued since the last call.
    ///
    /// All queued errors are dispatched before all queued messages, each in
    /// arrival order. Both queues are emptied before any callback runs, so
    /// callbacks may freely call back into the engine.
    pub fn process_incoming(&self) {
        let errors = self.errors.drain();
        let messages = self.incoming.drain();
        if errors.is_empty() && messages.is_empty() {
            return;
        }

        for error in errors {
            self.handler.on_error(error);
        }
        for message in messages {
            self.handler.on_message(message);
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current connection state, read from the transport.
    pub fn state(&self) -> ConnectionState {
        self.attempt
            .lock()
            .as_ref()
            .map_or(ConnectionState::Closed, |a| a.transport.state())
    }

    /// Number of messages waiting for the send pump.
    pub fn pending_outgoing(&self) -> usize {
        self.outgoing.len()
    }

    /// Number of messages and errors waiting for [`process_incoming`](WebSocket::process_incoming).
    pub fn pending_incoming(&self) -> usize {
        self.incoming.len() + self.errors.len()
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .field("pending_outgoing", &self.pending_outgoing())
            .field("pending_incoming", &self.pending_incoming())
            .finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::event::WebSocketEvent;
    use crate::transport::mock::{text, MockTransport, Scripted};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Connector handing out one pre-built mock per attempt.
    fn connector_for(transport: Arc<MockTransport>) -> impl Connector {
        move || -> Arc<dyn Transport> { Arc::clone(&transport) as Arc<dyn Transport> }
    }

    fn start(
        transport: Arc<MockTransport>,
    ) -> (
        Arc<WebSocket>,
        mpsc::UnboundedReceiver<WebSocketEvent>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket = Arc::new(WebSocket::with_connector(
            WebSocketConfig::new("ws://mock").with_max_receive_bytes(100),
            tx,
            connector_for(transport),
        ));
        let runner = Arc::clone(&socket);
        let task = tokio::spawn(async move { runner.connect().await });
        (socket, rx, task)
    }

    fn idle_socket() -> (WebSocket, mpsc::UnboundedReceiver<WebSocketEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket = WebSocket::with_connector(
            WebSocketConfig::new("ws://mock"),
            tx,
            connector_for(MockTransport::open()),
        );
        (socket, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<WebSocketEvent>) -> WebSocketEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn open_then_messages_via_process_incoming() {
        let transport = MockTransport::open();
        transport.push(text("hi", true));
        let (socket, mut rx, task) = start(Arc::clone(&transport));

        assert_eq!(next_event(&mut rx).await, WebSocketEvent::Opened);
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Nothing is delivered until the consumer polls.
        assert!(rx.try_recv().is_err());

        socket.process_incoming();
        assert_eq!(
            next_event(&mut rx).await,
            WebSocketEvent::Message(Message::text("hi"))
        );

        transport.push(Scripted::Close(Some(1000)));
        assert_eq!(
            next_event(&mut rx).await,
            WebSocketEvent::Closed(CloseCode::Normal)
        );
        task.await.unwrap().unwrap();
        assert_eq!(socket.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let transport = MockTransport::open();
        let (socket, mut rx, _task) = start(transport);
        assert_eq!(next_event(&mut rx).await, WebSocketEvent::Opened);

        let err = socket.connect().await.unwrap_err();
        assert!(matches!(err, WebSocketError::AlreadyConnected));
        socket.cancel();
        assert!(matches!(next_event(&mut rx).await, WebSocketEvent::Closed(_)));
    }

    #[tokio::test]
    async fn cancel_while_open_suppresses_error() {
        let transport = MockTransport::open();
        let (socket, mut rx, task) = start(transport);
        assert_eq!(next_event(&mut rx).await, WebSocketEvent::Opened);

        socket.cancel();
        assert_eq!(
            next_event(&mut rx).await,
            WebSocketEvent::Closed(CloseCode::Abnormal)
        );
        task.await.unwrap().unwrap();
        socket.process_incoming();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_sends_normal_closure() {
        let transport = MockTransport::open();
        let (socket, mut rx, task) = start(transport);
        assert_eq!(next_event(&mut rx).await, WebSocketEvent::Opened);

        socket.close().await;
        assert_eq!(
            next_event(&mut rx).await,
            WebSocketEvent::Closed(CloseCode::Normal)
        );
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn receive_failure_reports_error_then_close() {
        let transport = MockTransport::open();
        transport.push(Scripted::Fail("connection reset".into()));
        let (_socket, mut rx, task) = start(transport);

        assert_eq!(next_event(&mut rx).await, WebSocketEvent::Opened);
        match next_event(&mut rx).await {
            WebSocketEvent::Error(e) => assert!(e.contains("connection reset"), "{e}"),
            other => panic!("expected Error, got {other:?}"),
        }
        assert_eq!(
            next_event(&mut rx).await,
            WebSocketEvent::Closed(CloseCode::Abnormal)
        );
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn send_without_attempt_is_rejected() {
        let (socket, _rx) = idle_socket();
        assert!(matches!(
            socket.send_text("nope"),
            Err(WebSocketError::NotConnected)
        ));
        assert_eq!(socket.state(), ConnectionState::Closed);
        // Close and cancel without a transport are no-ops.
        socket.close().await;
        socket.cancel();
    }

    #[tokio::test]
    async fn process_incoming_on_empty_queues_is_silent() {
        let (socket, mut rx) = idle_socket();
        for _ in 0..3 {
            socket.process_incoming();
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn errors_dispatch_before_messages() {
        let (socket, mut rx) = idle_socket();
        socket.incoming.push(Message::text("first"));
        socket.errors.push("late error".into());
        socket.incoming.push(Message::text("second"));
        assert_eq!(socket.pending_incoming(), 3);

        socket.process_incoming();
        assert_eq!(rx.try_recv().unwrap(), WebSocketEvent::Error("late error".into()));
        assert_eq!(
            rx.try_recv().unwrap(),
            WebSocketEvent::Message(Message::text("first"))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            WebSocketEvent::Message(Message::text("second"))
        );
        assert_eq!(socket.pending_incoming(), 0);
    }

    #[test]
    fn websocket_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WebSocket>();
    }
}
