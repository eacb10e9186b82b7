#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the WebSocket engine integration tests.
//!
//! Provides a scripted [`MockTransport`], a [`MockConnector`] that hands out
//! prepared transports one attempt at a time, and a [`Recorder`] event handler.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use polling_websocket::transport::{ConnectRequest, FrameKind, ReceiveResult};
use polling_websocket::{
    CloseCode, ConnectionState, Connector, EventHandler, Message, Transport, WebSocket,
    WebSocketConfig, WebSocketError, WebSocketEvent,
};
use tokio::sync::mpsc;

// ── MockTransport ───────────────────────────────────────────────────

/// How the mock behaves during the opening handshake.
#[derive(Debug, Clone)]
pub enum Handshake {
    /// Open immediately.
    Succeed,
    /// Fail with a connect error carrying this text.
    Fail(String),
    /// Never complete.
    Hang,
}

/// One scripted receive event.
#[derive(Debug, Clone)]
pub enum Scripted {
    Frame {
        kind: FrameKind,
        data: Vec<u8>,
        end: bool,
    },
    Close(Option<u16>),
    Fail(String),
}

pub fn text_frame(data: &str, end: bool) -> Scripted {
    Scripted::Frame {
        kind: FrameKind::Text,
        data: data.as_bytes().to_vec(),
        end,
    }
}

pub fn binary_frame(data: &[u8], end: bool) -> Scripted {
    Scripted::Frame {
        kind: FrameKind::Binary,
        data: data.to_vec(),
        end,
    }
}

/// A scripted transport. Frames pushed with [`MockTransport::push`] are
/// returned by `receive` in order; `receive` waits when nothing is queued.
pub struct MockTransport {
    handshake: Handshake,
    state: StdMutex<(ConnectionState, Option<u16>)>,
    script: tokio::sync::Mutex<mpsc::UnboundedReceiver<Scripted>>,
    feed: mpsc::UnboundedSender<Scripted>,
    /// Every message written by the send pump.
    pub sent: StdMutex<Vec<Message>>,
    /// Number of keep-alive pings written.
    pub pings: AtomicUsize,
    /// The last handshake request seen.
    pub request: StdMutex<Option<ConnectRequest>>,
}

impl MockTransport {
    pub fn new(handshake: Handshake) -> Arc<Self> {
        let (feed, script) = mpsc::unbounded_channel();
        Arc::new(Self {
            handshake,
            state: StdMutex::new((ConnectionState::Connecting, None)),
            script: tokio::sync::Mutex::new(script),
            feed,
            sent: StdMutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
            request: StdMutex::new(None),
        })
    }

    pub fn push(&self, item: Scripted) {
        let _ = self.feed.send(item);
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.lock().unwrap().0 = state;
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn state(&self) -> ConnectionState {
        self.state.lock().unwrap().0
    }

    fn close_status(&self) -> Option<u16> {
        self.state.lock().unwrap().1
    }

    async fn connect(&self, request: &ConnectRequest) -> Result<(), WebSocketError> {
        *self.request.lock().unwrap() = Some(request.clone());
        match &self.handshake {
            Handshake::Succeed => {
                self.set_state(ConnectionState::Open);
                Ok(())
            }
            Handshake::Fail(reason) => {
                self.set_state(ConnectionState::Closed);
                Err(WebSocketError::Connect(reason.clone()))
            }
            Handshake::Hang => std::future::pending().await,
        }
    }

    async fn receive(&self, buffer: &mut [u8]) -> Result<ReceiveResult, WebSocketError> {
        let next = self.script.lock().await.recv().await;
        match next {
            Some(Scripted::Frame { kind, data, end }) => {
                buffer[..data.len()].copy_from_slice(&data);
                Ok(ReceiveResult::data(kind, data.len(), end))
            }
            Some(Scripted::Close(status)) => {
                let mut state = self.state.lock().unwrap();
                state.0 = ConnectionState::Closed;
                state.1 = state.1.or(status);
                Ok(ReceiveResult::close())
            }
            Some(Scripted::Fail(reason)) => {
                self.set_state(ConnectionState::Closed);
                Err(WebSocketError::TransportReceive(reason))
            }
            None => {
                self.set_state(ConnectionState::Closed);
                Ok(ReceiveResult::close())
            }
        }
    }

    async fn send(&self, message: Message) -> Result<(), WebSocketError> {
        if self.state() != ConnectionState::Open {
            return Err(WebSocketError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn ping(&self) -> Result<(), WebSocketError> {
        self.pings.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self, code: u16, _reason: &str) -> Result<(), WebSocketError> {
        {
            let mut state = self.state.lock().unwrap();
            state.0 = ConnectionState::Closing;
            state.1 = Some(code);
        }
        // The peer echoes the close frame.
        self.push(Scripted::Close(Some(code)));
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out prepared transports in order, one per connection attempt.
pub struct MockConnector {
    transports: StdMutex<VecDeque<Arc<MockTransport>>>,
}

impl MockConnector {
    pub fn new(transports: Vec<Arc<MockTransport>>) -> Self {
        Self {
            transports: StdMutex::new(VecDeque::from(transports)),
        }
    }
}

impl Connector for MockConnector {
    fn create(&self) -> Arc<dyn Transport> {
        match self.transports.lock().unwrap().pop_front() {
            Some(transport) => transport,
            None => MockTransport::new(Handshake::Fail("no transport scripted".into())),
        }
    }
}

// ── Recorder ────────────────────────────────────────────────────────

/// Event handler that records every notification in order.
#[derive(Default)]
pub struct Recorder {
    events: StdMutex<Vec<WebSocketEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<WebSocketEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WebSocketEvent::Message(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WebSocketEvent::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> Vec<CloseCode> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WebSocketEvent::Closed(code) => Some(code),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: WebSocketEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl EventHandler for Recorder {
    fn on_open(&self) {
        self.record(WebSocketEvent::Opened);
    }

    fn on_message(&self, message: Message) {
        self.record(WebSocketEvent::Message(message));
    }

    fn on_error(&self, error: String) {
        self.record(WebSocketEvent::Error(error));
    }

    fn on_close(&self, code: CloseCode) {
        self.record(WebSocketEvent::Closed(code));
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a socket over the given transports and spawn its first attempt.
pub fn start(
    config: WebSocketConfig,
    transports: Vec<Arc<MockTransport>>,
) -> (
    Arc<WebSocket>,
    Arc<Recorder>,
    tokio::task::JoinHandle<Result<(), WebSocketError>>,
) {
    let recorder = Arc::new(Recorder::default());
    let socket = Arc::new(WebSocket::with_connector(
        config,
        Arc::clone(&recorder),
        MockConnector::new(transports),
    ));
    let task = spawn_connect(&socket);
    (socket, recorder, task)
}

pub fn spawn_connect(
    socket: &Arc<WebSocket>,
) -> tokio::task::JoinHandle<Result<(), WebSocketError>> {
    let runner = Arc::clone(socket);
    tokio::spawn(async move { runner.connect().await })
}

/// Poll `condition` until it holds or a second passes.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within timeout");
}

/// Keep calling `process_incoming` until `condition` holds.
pub async fn pump_until(socket: &WebSocket, mut condition: impl FnMut() -> bool) {
    wait_until(|| {
        socket.process_incoming();
        condition()
    })
    .await;
}
