//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`TungsteniteTransport`] implements [`Transport`] on top of a
//! `tokio-tungstenite` stream. Both `ws://` and `wss://` URLs are supported;
//! TLS is handled by [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! Tungstenite already reassembles continuation frames, so the transport hands
//! each message to the receive pump in buffer-sized chunks, flagging the last
//! chunk as end-of-message. Ping and pong frames never reach the pump.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is enabled
//! (it is enabled by default).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WireCloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig as ProtocolConfig;
use tokio_tungstenite::tungstenite::Bytes;
use tracing::{debug, info};

use crate::error::WebSocketError;
use crate::message::Message;
use crate::transport::{
    ConnectRequest, ConnectionState, Connector, FrameKind, ReceiveResult, Transport,
};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSING: u8 = 2;
const CLOSED: u8 = 3;

/// A message being handed out to the pump chunk by chunk.
#[derive(Debug)]
struct Pending {
    kind: FrameKind,
    payload: Bytes,
    offset: usize,
}

#[derive(Debug, Default)]
struct ReadHalf {
    stream: Option<SplitStream<WsStream>>,
    pending: Option<Pending>,
}

/// A [`Transport`] backed by a `tokio-tungstenite` WebSocket connection.
///
/// Read and write halves are locked independently so the receive pump can
/// wait for data while the send pump writes.
///
/// # Memory bound
///
/// Tungstenite buffers each whole message before the receive pump sees its
/// first chunk, so peak memory per message is bounded by tungstenite's own
/// limit (64 MiB by default), not by
/// [`max_receive_bytes`](crate::WebSocketConfig::max_receive_bytes). Messages
/// between the two limits are drained and reported by the pump as usual. A
/// message over the tungstenite limit fails the read and ends the connection.
/// Lower the limit with [`with_max_message_size`](Self::with_max_message_size).
#[derive(Debug)]
pub struct TungsteniteTransport {
    protocol: ProtocolConfig,
    state: AtomicU8,
    close_status: parking_lot::Mutex<Option<u16>>,
    reader: tokio::sync::Mutex<ReadHalf>,
    writer: tokio::sync::Mutex<Option<SplitSink<WsStream, WsMessage>>>,
}

impl Default for TungsteniteTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TungsteniteTransport {
    /// Create an unconnected transport with tungstenite's default limits.
    pub fn new() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            state: AtomicU8::new(CONNECTING),
            close_status: parking_lot::Mutex::new(None),
            reader: tokio::sync::Mutex::new(ReadHalf::default()),
            writer: tokio::sync::Mutex::new(None),
        }
    }

    /// Cap the size of a single incoming message (and frame) accepted by
    /// tungstenite. Larger messages fail the read instead of being buffered.
    #[must_use]
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.protocol = self
            .protocol
            .max_message_size(Some(bytes))
            .max_frame_size(Some(bytes));
        self
    }

    fn set_state(&self, state: u8) {
        self.state.store(state, Ordering::Release);
    }

    /// Remember the first close status seen in either direction.
    fn record_close(&self, status: Option<u16>) {
        let mut current = self.close_status.lock();
        if current.is_none() {
            *current = status;
        }
    }

    fn build_request(
        request: &ConnectRequest,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, WebSocketError> {
        let mut http = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| WebSocketError::Connect(e.to_string()))?;

        let headers = http.headers_mut();
        for (name, value) in &request.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WebSocketError::InvalidHeader(format!("{name}: {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| WebSocketError::InvalidHeader(format!("{name}: {e}")))?;
            headers.insert(header_name, header_value);
        }
        if !request.subprotocols.is_empty() {
            let protocols = request.subprotocols.join(", ");
            let value = HeaderValue::from_str(&protocols).map_err(|e| {
                WebSocketError::InvalidHeader(format!("{SEC_WEBSOCKET_PROTOCOL}: {e}"))
            })?;
            headers.insert(SEC_WEBSOCKET_PROTOCOL, value);
        }
        Ok(http)
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            CONNECTING => ConnectionState::Connecting,
            OPEN => ConnectionState::Open,
            CLOSING => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    fn close_status(&self) -> Option<u16> {
        *self.close_status.lock()
    }

    async fn connect(&self, request: &ConnectRequest) -> Result<(), WebSocketError> {
        if self.state() != ConnectionState::Connecting {
            return Err(WebSocketError::Connect(
                "transport has already been used".into(),
            ));
        }

        let http = Self::build_request(request).inspect_err(|_| self.set_state(CLOSED))?;
        debug!(url = %request.url, "connecting to WebSocket server");

        let (stream, response) =
            tokio_tungstenite::connect_async_with_config(http, Some(self.protocol), false)
                .await
                .map_err(|e| {
                    self.set_state(CLOSED);
                    WebSocketError::Connect(e.to_string())
                })?;

        let protocol = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        info!(url = %request.url, protocol, "WebSocket connection established");

        let (sink, stream) = stream.split();
        *self.writer.lock().await = Some(sink);
        self.reader.lock().await.stream = Some(stream);
        self.set_state(OPEN);
        Ok(())
    }

    async fn receive(&self, buffer: &mut [u8]) -> Result<ReceiveResult, WebSocketError> {
        let mut guard = self.reader.lock().await;
        let reader = &mut *guard;

        loop {
            if let Some(pending) = reader.pending.as_mut() {
                let remaining = pending.payload.get(pending.offset..).unwrap_or_default();
                let count = remaining.len().min(buffer.len());
                if let (Some(dst), Some(src)) = (buffer.get_mut(..count), remaining.get(..count)) {
                    dst.copy_from_slice(src);
                }
                pending.offset += count;
                let kind = pending.kind;
                let end_of_message = pending.offset >= pending.payload.len();
                if end_of_message {
                    reader.pending = None;
                }
                return Ok(ReceiveResult::data(kind, count, end_of_message));
            }

            let Some(stream) = reader.stream.as_mut() else {
                return Err(WebSocketError::TransportClosed);
            };

            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    reader.pending = Some(Pending {
                        kind: FrameKind::Text,
                        payload: Bytes::from(text),
                        offset: 0,
                    });
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    reader.pending = Some(Pending {
                        kind: FrameKind::Binary,
                        payload: data,
                        offset: 0,
                    });
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "received WebSocket close frame");
                    self.record_close(frame.map(|f| u16::from(f.code)));
                    self.set_state(CLOSED);
                    return Ok(ReceiveResult::close());
                }
                Some(Ok(WsMessage::Ping(_))) => {
                    // tungstenite auto-queues a Pong reply.
                    debug!("received WebSocket ping");
                }
                Some(Ok(WsMessage::Pong(_))) => {
                    debug!("received WebSocket pong");
                }
                Some(Ok(WsMessage::Frame(_))) => {
                    // Never produced by the read half.
                    debug!("received raw WebSocket frame, skipping");
                }
                Some(Err(e)) => {
                    self.set_state(CLOSED);
                    return Err(WebSocketError::TransportReceive(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    self.set_state(CLOSED);
                    return Ok(ReceiveResult::close());
                }
            }
        }
    }

    async fn send(&self, message: Message) -> Result<(), WebSocketError> {
        if self.state() != ConnectionState::Open {
            return Err(WebSocketError::TransportClosed);
        }
        let frame = match message {
            Message::Text(text) => WsMessage::Text(text.into()),
            Message::Binary(data) => WsMessage::Binary(data.into()),
        };
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(WebSocketError::TransportClosed)?;
        sink.send(frame)
            .await
            .map_err(|e| WebSocketError::TransportSend(e.to_string()))
    }

    async fn ping(&self) -> Result<(), WebSocketError> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(WebSocketError::TransportClosed)?;
        sink.send(WsMessage::Ping(Bytes::new()))
            .await
            .map_err(|e| WebSocketError::TransportSend(e.to_string()))
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), WebSocketError> {
        if self.state() != ConnectionState::Open {
            return Ok(());
        }
        self.set_state(CLOSING);
        self.record_close(Some(code));

        let frame = CloseFrame {
            code: WireCloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(WebSocketError::TransportClosed)?;
        sink.send(WsMessage::Close(Some(frame)))
            .await
            .map_err(|e| WebSocketError::TransportSend(e.to_string()))
    }
}

/// [`Connector`] producing a fresh [`TungsteniteTransport`] per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector {
    max_message_size: Option<usize>,
}

impl TungsteniteConnector {
    /// Connector using tungstenite's default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply [`TungsteniteTransport::with_max_message_size`] to every
    /// transport this connector creates.
    #[must_use]
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = Some(bytes);
        self
    }
}

impl Connector for TungsteniteConnector {
    fn create(&self) -> Arc<dyn Transport> {
        let transport = TungsteniteTransport::new();
        Arc::new(match self.max_message_size {
            Some(bytes) => transport.with_max_message_size(bytes),
            None => transport,
        })
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
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
    fn tungstenite_transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TungsteniteTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let transport = TungsteniteTransport::new();
        let request = ConnectRequest {
            url: "not-a-valid-url".into(),
            ..Default::default()
        };
        let err = transport.connect(&request).await.unwrap_err();
        assert!(matches!(err, WebSocketError::Connect(_)));
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let transport = TungsteniteTransport::new();
        let request = ConnectRequest {
            url: "ws://127.0.0.1:1".into(),
            ..Default::default()
        };
        let err = transport.connect(&request).await.unwrap_err();
        assert!(matches!(err, WebSocketError::Connect(_)));
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn invalid_header_is_rejected_before_connecting() {
        let transport = TungsteniteTransport::new();
        let mut request = ConnectRequest {
            url: "ws://127.0.0.1:1".into(),
            ..Default::default()
        };
        request.headers.insert("bad header".into(), "x".into());
        let err = transport.connect(&request).await.unwrap_err();
        assert!(matches!(err, WebSocketError::InvalidHeader(_)));
    }

    #[tokio::test]
    async fn send_before_connect_is_rejected() {
        let transport = TungsteniteTransport::new();
        let err = transport.send(Message::text("early")).await.unwrap_err();
        assert!(matches!(err, WebSocketError::TransportClosed));
        assert_eq!(transport.state(), ConnectionState::Connecting);
        assert_eq!(transport.close_status(), None);
    }

    // ── Mock-server helpers ──────────────────────────────────────────────

    use tokio::net::TcpListener;

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    async fn connected(url: &str) -> TungsteniteTransport {
        let transport = TungsteniteTransport::new();
        transport
            .connect(&ConnectRequest {
                url: url.into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(transport.state(), ConnectionState::Open);
        transport
    }

    // ── Mock-server tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn large_message_is_chunked_into_buffer() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(WsMessage::Binary(vec![7u8; 10].into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let transport = connected(&url).await;
        let mut buffer = [0u8; 4];
        let mut sizes = Vec::new();
        loop {
            let result = transport.receive(&mut buffer).await.unwrap();
            assert_eq!(result.kind, FrameKind::Binary);
            assert!(buffer[..result.count].iter().all(|b| *b == 7));
            sizes.push(result.count);
            if result.end_of_message {
                break;
            }
        }
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn message_over_protocol_limit_fails_the_read() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(WsMessage::Binary(vec![1u8; 2000].into()))
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let transport = TungsteniteTransport::new().with_max_message_size(1000);
        transport
            .connect(&ConnectRequest {
                url,
                ..Default::default()
            })
            .await
            .unwrap();

        let mut buffer = [0u8; 256];
        let err = transport.receive(&mut buffer).await.unwrap_err();
        assert!(matches!(err, WebSocketError::TransportReceive(_)), "{err:?}");
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[test]
    fn connector_applies_message_limit() {
        let connector = TungsteniteConnector::new().with_max_message_size(4096);
        assert_eq!(connector.max_message_size, Some(4096));
        assert_eq!(TungsteniteConnector::default().max_message_size, None);
    }

    #[tokio::test]
    async fn text_message_fits_in_one_read() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(WsMessage::Text("hello".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let transport = connected(&url).await;
        let mut buffer = [0u8; 64];
        let result = transport.receive(&mut buffer).await.unwrap();
        assert_eq!(result, ReceiveResult::data(FrameKind::Text, 5, true));
        assert_eq!(&buffer[..5], b"hello");
    }

    #[tokio::test]
    async fn peer_close_reports_status() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(Some(CloseFrame {
                code: WireCloseCode::Away,
                reason: "bye".into(),
            }))
            .await
            .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let transport = connected(&url).await;
        let mut buffer = [0u8; 16];
        let result = transport.receive(&mut buffer).await.unwrap();
        assert_eq!(result.kind, FrameKind::Close);
        assert_eq!(transport.close_status(), Some(1001));
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn send_round_trip() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() || msg.is_binary() {
                    ws.send(msg).await.unwrap();
                }
            }
        })
        .await;

        let transport = connected(&url).await;
        transport.send(Message::text("echo")).await.unwrap();
        transport.send(Message::binary(vec![1u8, 2])).await.unwrap();

        let mut buffer = [0u8; 16];
        let first = transport.receive(&mut buffer).await.unwrap();
        assert_eq!(first, ReceiveResult::data(FrameKind::Text, 4, true));
        assert_eq!(&buffer[..4], b"echo");
        let second = transport.receive(&mut buffer).await.unwrap();
        assert_eq!(second, ReceiveResult::data(FrameKind::Binary, 2, true));
        assert_eq!(&buffer[..2], &[1, 2]);
    }

    #[tokio::test]
    async fn close_moves_to_closing_and_records_code() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let transport = connected(&url).await;
        transport.close(1000, "").await.unwrap();
        assert_eq!(transport.state(), ConnectionState::Closing);
        assert_eq!(transport.close_status(), Some(1000));

        let err = transport.send(Message::text("late")).await.unwrap_err();
        assert!(matches!(err, WebSocketError::TransportClosed));

        // The peer echoes the close frame.
        let mut buffer = [0u8; 16];
        let result = transport.receive(&mut buffer).await.unwrap();
        assert_eq!(result.kind, FrameKind::Close);
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn headers_and_subprotocols_reach_the_server() {
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

        let seen = Arc::new(parking_lot::Mutex::new(None::<(String, String)>));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_seen = Arc::clone(&seen);
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = move |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                let header = |name: &str| {
                    req.headers()
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string()
                };
                *server_seen.lock() = Some((header("x-token"), header("sec-websocket-protocol")));
                resp.headers_mut()
                    .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("chat.v1"));
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let transport = TungsteniteTransport::new();
        let mut request = ConnectRequest {
            url: format!("ws://{addr}"),
            subprotocols: vec!["chat.v1".into(), "chat.v0".into()],
            ..Default::default()
        };
        request.headers.insert("X-Token".into(), "secret".into());
        transport.connect(&request).await.unwrap();

        let (token, protocols) = seen.lock().clone().unwrap();
        assert_eq!(token, "secret");
        assert_eq!(protocols, "chat.v1, chat.v0");
    }
}
