#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the connection lifecycle, the pumps and polled
//! delivery, driven by the scripted `MockTransport` from `tests/common`.

mod common;

use std::sync::{Arc, Mutex as StdMutex, OnceLock, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use polling_websocket::{
    CloseCode, ConnectionState, EventHandler, Message, Transport, WebSocket, WebSocketConfig,
    WebSocketError, WebSocketEvent,
};

use common::{
    binary_frame, pump_until, spawn_connect, start, text_frame, wait_until, Handshake,
    MockConnector, MockTransport, Scripted,
};

fn config(max_receive_bytes: usize) -> WebSocketConfig {
    WebSocketConfig::new("ws://mock.test/ws")
        .with_max_receive_bytes(max_receive_bytes)
        .with_suppress_keep_alive(true)
}

// ════════════════════════════════════════════════════════════════════
// Send path
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn sends_are_written_in_order_with_tags() {
    let transport = MockTransport::new(Handshake::Succeed);
    let (socket, recorder, _task) = start(config(1024), vec![transport.clone()]);
    wait_until(|| recorder.events().contains(&WebSocketEvent::Opened)).await;

    socket.send_text("hello").unwrap();
    socket.send_binary(vec![1u8, 2, 3]).unwrap();

    wait_until(|| transport.sent().len() == 2).await;
    assert_eq!(
        transport.sent(),
        vec![Message::text("hello"), Message::binary(vec![1u8, 2, 3])]
    );
    socket.cancel();
}

#[tokio::test]
async fn many_sends_preserve_fifo_order() {
    let transport = MockTransport::new(Handshake::Succeed);
    let (socket, recorder, _task) = start(config(1024), vec![transport.clone()]);
    wait_until(|| recorder.events().contains(&WebSocketEvent::Opened)).await;

    let expected: Vec<Message> = (0..200)
        .map(|i| {
            if i % 3 == 0 {
                Message::binary(vec![i as u8])
            } else {
                Message::text(format!("msg-{i}"))
            }
        })
        .collect();
    for message in &expected {
        socket.send(message.clone()).unwrap();
    }

    wait_until(|| transport.sent().len() == expected.len()).await;
    assert_eq!(transport.sent(), expected);
    socket.cancel();
}

#[tokio::test]
async fn messages_queued_while_connecting_are_sent_once_open() {
    let transport = MockTransport::new(Handshake::Succeed);
    let recorder = Arc::new(common::Recorder::default());
    let socket = Arc::new(WebSocket::with_connector(
        config(1024),
        Arc::clone(&recorder),
        common::MockConnector::new(vec![transport.clone()]),
    ));

    // Not connected yet: rejected.
    assert!(matches!(
        socket.send_text("too early"),
        Err(WebSocketError::NotConnected)
    ));

    let _task = spawn_connect(&socket);
    wait_until(|| socket.send_text("queued").is_ok()).await;

    wait_until(|| !transport.sent().is_empty()).await;
    assert_eq!(transport.sent()[0], Message::text("queued"));
    socket.cancel();
}

// ════════════════════════════════════════════════════════════════════
// Receive path and polled delivery
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn fragmented_text_is_reassembled() {
    let transport = MockTransport::new(Handshake::Succeed);
    transport.push(text_frame("ab", false));
    transport.push(text_frame("cd", false));
    transport.push(text_frame("ef", true));
    let (socket, recorder, _task) = start(config(100), vec![transport]);

    pump_until(&socket, || !recorder.messages().is_empty()).await;
    assert_eq!(recorder.messages(), vec![Message::text("abcdef")]);
    assert!(recorder.errors().is_empty());
    socket.cancel();
}

#[tokio::test]
async fn oversized_message_is_rejected_and_stream_realigned() {
    let transport = MockTransport::new(Handshake::Succeed);
    let chunk = vec![0xABu8; 100];
    for i in 0..20 {
        transport.push(binary_frame(&chunk, i == 19));
    }
    transport.push(binary_frame(&[1, 2, 3], true));
    let (socket, recorder, _task) = start(config(1000), vec![transport]);

    pump_until(&socket, || !recorder.messages().is_empty()).await;

    let errors = recorder.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("exceeded"), "{}", errors[0]);
    assert!(errors[0].contains("1000"), "{}", errors[0]);
    assert!(errors[0].contains("2000"), "{}", errors[0]);
    assert_eq!(recorder.messages(), vec![Message::binary(vec![1u8, 2, 3])]);
    socket.cancel();
}

#[tokio::test]
async fn nothing_is_delivered_without_polling() {
    let transport = MockTransport::new(Handshake::Succeed);
    transport.push(text_frame("waiting", true));
    let (socket, recorder, _task) = start(config(100), vec![transport]);

    wait_until(|| socket.pending_incoming() == 1).await;
    assert_eq!(recorder.events(), vec![WebSocketEvent::Opened]);

    socket.process_incoming();
    assert_eq!(recorder.messages(), vec![Message::text("waiting")]);
    socket.cancel();
}

#[tokio::test]
async fn errors_are_dispatched_before_messages_in_one_poll() {
    let transport = MockTransport::new(Handshake::Succeed);
    transport.push(text_frame("first", true));
    transport.push(text_frame(&"x".repeat(20), true));
    transport.push(text_frame("second", true));
    let (socket, recorder, _task) = start(config(10), vec![transport]);

    wait_until(|| socket.pending_incoming() == 3).await;
    socket.process_incoming();

    let events = recorder.events();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], WebSocketEvent::Opened);
    assert!(matches!(events[1], WebSocketEvent::Error(_)));
    assert_eq!(events[2], WebSocketEvent::Message(Message::text("first")));
    assert_eq!(events[3], WebSocketEvent::Message(Message::text("second")));
    socket.cancel();
}

#[tokio::test]
async fn polling_is_idempotent_and_delivers_at_most_once() {
    let transport = MockTransport::new(Handshake::Succeed);
    transport.push(text_frame("once", true));
    let (socket, recorder, _task) = start(config(100), vec![transport]);

    pump_until(&socket, || !recorder.messages().is_empty()).await;
    let before = recorder.events();
    for _ in 0..5 {
        socket.process_incoming();
    }
    assert_eq!(recorder.events(), before);
    assert_eq!(recorder.messages().len(), 1);
    socket.cancel();
}

// ════════════════════════════════════════════════════════════════════
// Lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn cancel_during_connecting_closes_abnormally_without_error() {
    let transport = MockTransport::new(Handshake::Hang);
    let (socket, recorder, task) = start(config(100), vec![transport]);

    wait_until(|| socket.state() == ConnectionState::Connecting).await;
    socket.cancel();
    task.await.unwrap().unwrap();

    socket.process_incoming();
    assert_eq!(
        recorder.events(),
        vec![WebSocketEvent::Closed(CloseCode::Abnormal)]
    );
    assert_eq!(socket.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn close_during_connecting_cancels_the_attempt() {
    let transport = MockTransport::new(Handshake::Hang);
    let (socket, recorder, task) = start(config(100), vec![transport]);

    wait_until(|| socket.state() == ConnectionState::Connecting).await;
    socket.close().await;
    task.await.unwrap().unwrap();

    assert_eq!(
        recorder.events(),
        vec![WebSocketEvent::Closed(CloseCode::Abnormal)]
    );
}

#[tokio::test]
async fn handshake_failure_reports_error_then_close() {
    let transport = MockTransport::new(Handshake::Fail("connection refused".into()));
    let (_socket, recorder, task) = start(config(100), vec![transport]);
    task.await.unwrap().unwrap();

    let events = recorder.events();
    assert_eq!(events.len(), 2);
    match &events[0] {
        WebSocketEvent::Error(e) => assert!(e.contains("connection refused"), "{e}"),
        other => panic!("expected Error, got {other:?}"),
    }
    assert_eq!(events[1], WebSocketEvent::Closed(CloseCode::Abnormal));
}

#[tokio::test]
async fn connect_timeout_is_reported() {
    let transport = MockTransport::new(Handshake::Hang);
    let (_socket, recorder, task) = start(
        config(100).with_connect_timeout(Duration::from_millis(20)),
        vec![transport],
    );
    task.await.unwrap().unwrap();

    let events = recorder.events();
    assert!(
        matches!(&events[0], WebSocketEvent::Error(e) if e.contains("timed out")),
        "{events:?}"
    );
    assert_eq!(events[1], WebSocketEvent::Closed(CloseCode::Abnormal));
}

#[tokio::test]
async fn graceful_close_reports_normal() {
    let transport = MockTransport::new(Handshake::Succeed);
    let (socket, recorder, task) = start(config(100), vec![transport.clone()]);
    wait_until(|| socket.state() == ConnectionState::Open).await;

    socket.close().await;
    task.await.unwrap().unwrap();

    assert_eq!(recorder.closes(), vec![CloseCode::Normal]);
    assert!(recorder.errors().is_empty());
    assert_eq!(transport.close_status(), Some(1000));
    assert_eq!(socket.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn peer_close_code_is_translated() {
    let transport = MockTransport::new(Handshake::Succeed);
    let (_socket, recorder, task) = start(config(100), vec![transport.clone()]);
    wait_until(|| recorder.events().contains(&WebSocketEvent::Opened)).await;

    transport.push(Scripted::Close(Some(1009)));
    task.await.unwrap().unwrap();
    assert_eq!(recorder.closes(), vec![CloseCode::MessageTooBig]);
}

#[tokio::test]
async fn unknown_peer_close_code_is_undefined() {
    let transport = MockTransport::new(Handshake::Succeed);
    let (_socket, recorder, task) = start(config(100), vec![transport.clone()]);
    wait_until(|| recorder.events().contains(&WebSocketEvent::Opened)).await;

    transport.push(Scripted::Close(Some(4321)));
    task.await.unwrap().unwrap();
    assert_eq!(recorder.closes(), vec![CloseCode::Undefined]);
}

#[tokio::test]
async fn receive_failure_is_reported_once_with_single_close() {
    let transport = MockTransport::new(Handshake::Succeed);
    let (socket, recorder, task) = start(config(100), vec![transport.clone()]);
    wait_until(|| recorder.events().contains(&WebSocketEvent::Opened)).await;

    transport.push(Scripted::Fail("reset by peer".into()));
    task.await.unwrap().unwrap();
    socket.process_incoming();

    assert_eq!(recorder.errors().len(), 1);
    assert!(recorder.errors()[0].contains("reset by peer"));
    assert_eq!(recorder.closes(), vec![CloseCode::Abnormal]);
}

#[tokio::test]
async fn reconnect_after_cancel_uses_fresh_transport_and_token() {
    let first = MockTransport::new(Handshake::Succeed);
    let second = MockTransport::new(Handshake::Succeed);
    let (socket, recorder, task) = start(config(100), vec![first, second.clone()]);
    wait_until(|| socket.state() == ConnectionState::Open).await;

    socket.cancel();
    task.await.unwrap().unwrap();
    assert_eq!(recorder.closes(), vec![CloseCode::Abnormal]);

    let task = spawn_connect(&socket);
    wait_until(|| socket.state() == ConnectionState::Open).await;
    second.push(text_frame("again", true));
    pump_until(&socket, || !recorder.messages().is_empty()).await;
    assert_eq!(recorder.messages(), vec![Message::text("again")]);

    let opens = recorder
        .events()
        .into_iter()
        .filter(|e| *e == WebSocketEvent::Opened)
        .count();
    assert_eq!(opens, 2);

    socket.close().await;
    task.await.unwrap().unwrap();
    assert_eq!(recorder.closes(), vec![CloseCode::Abnormal, CloseCode::Normal]);
}

#[tokio::test]
async fn connect_twice_is_rejected_without_notifications() {
    let transport = MockTransport::new(Handshake::Succeed);
    let (socket, recorder, _task) = start(config(100), vec![transport]);
    wait_until(|| socket.state() == ConnectionState::Open).await;

    let err = socket.connect().await.unwrap_err();
    assert!(matches!(err, WebSocketError::AlreadyConnected));
    assert_eq!(recorder.events(), vec![WebSocketEvent::Opened]);
    socket.cancel();
}

/// Handler that reacts to the first close by sending and reconnecting.
#[derive(Default)]
struct ReactOnClose {
    socket: OnceLock<Weak<WebSocket>>,
    events: StdMutex<Vec<WebSocketEvent>>,
    send_result: StdMutex<Option<Result<(), WebSocketError>>>,
    reconnect_result: StdMutex<Option<Option<Result<(), WebSocketError>>>>,
}

impl EventHandler for ReactOnClose {
    fn on_error(&self, error: String) {
        self.events.lock().unwrap().push(WebSocketEvent::Error(error));
    }

    fn on_close(&self, code: CloseCode) {
        self.events.lock().unwrap().push(WebSocketEvent::Closed(code));
        if self.send_result.lock().unwrap().is_some() {
            return;
        }
        let socket = self.socket.get().and_then(Weak::upgrade).unwrap();
        *self.send_result.lock().unwrap() = Some(socket.send_text("after-close"));
        let reconnect = socket.connect().now_or_never();
        *self.reconnect_result.lock().unwrap() = Some(reconnect);
    }
}

#[tokio::test]
async fn engine_is_reset_before_close_is_reported() {
    let first = MockTransport::new(Handshake::Succeed);
    let second = MockTransport::new(Handshake::Fail("refused".into()));
    let handler = Arc::new(ReactOnClose::default());
    let socket = Arc::new(WebSocket::with_connector(
        config(100),
        Arc::clone(&handler),
        MockConnector::new(vec![first, second]),
    ));
    handler.socket.set(Arc::downgrade(&socket)).unwrap();

    let task = spawn_connect(&socket);
    wait_until(|| socket.state() == ConnectionState::Open).await;
    socket.cancel();
    task.await.unwrap().unwrap();

    let send = handler.send_result.lock().unwrap().take().unwrap();
    assert!(matches!(send, Err(WebSocketError::NotConnected)));
    assert_eq!(socket.pending_outgoing(), 0);

    // The second attempt starts instead of being rejected; its handshake
    // fails synchronously, so it finishes within a single poll.
    let reconnect = handler.reconnect_result.lock().unwrap().take().unwrap();
    assert!(matches!(reconnect, Some(Ok(()))), "{reconnect:?}");
    assert_eq!(
        *handler.events.lock().unwrap(),
        vec![
            WebSocketEvent::Closed(CloseCode::Abnormal),
            WebSocketEvent::Error("connect error: refused".into()),
            WebSocketEvent::Closed(CloseCode::Abnormal),
        ]
    );
    assert_eq!(socket.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn handshake_request_carries_config() {
    let transport = MockTransport::new(Handshake::Succeed);
    let (socket, _recorder, _task) = start(
        config(100)
            .with_subprotocol("game.v2")
            .with_header("Authorization", "Bearer t"),
        vec![transport.clone()],
    );
    wait_until(|| socket.state() == ConnectionState::Open).await;

    let request = transport.request.lock().unwrap().clone().unwrap();
    assert_eq!(request.url, "ws://mock.test/ws");
    assert_eq!(request.subprotocols, vec!["game.v2"]);
    assert_eq!(
        request.headers.get("Authorization").map(String::as_str),
        Some("Bearer t")
    );
    socket.cancel();
}

// ════════════════════════════════════════════════════════════════════
// Keep-alive
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn keep_alive_pings_when_enabled() {
    let transport = MockTransport::new(Handshake::Succeed);
    let config = WebSocketConfig::new("ws://mock.test/ws")
        .with_keep_alive_interval(Duration::from_millis(10));
    let (socket, _recorder, _task) = start(config, vec![transport.clone()]);

    wait_until(|| transport.pings.load(std::sync::atomic::Ordering::Relaxed) >= 2).await;
    socket.cancel();
}

#[tokio::test]
async fn keep_alive_suppressed_sends_no_pings() {
    let transport = MockTransport::new(Handshake::Succeed);
    let config = WebSocketConfig::new("ws://mock.test/ws")
        .with_keep_alive_interval(Duration::from_millis(5))
        .with_suppress_keep_alive(true);
    let (socket, _recorder, _task) = start(config, vec![transport.clone()]);
    wait_until(|| socket.state() == ConnectionState::Open).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.pings.load(std::sync::atomic::Ordering::Relaxed), 0);
    socket.cancel();
}
