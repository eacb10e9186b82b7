//! Receive and send pumps.
//!
//! Both loops run for the lifetime of one connection attempt and stop as soon
//! as the transport leaves [`ConnectionState::Open`]. They only ever touch the
//! transport through `&self` methods and talk to the consumer exclusively
//! through the queues.

use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::Result;
use crate::message::Message;
use crate::queue::{EventQueue, OutgoingQueue};
use crate::transport::{ConnectionState, FrameKind, Transport};

/// Read loop: reassemble frames into messages and queue them.
///
/// Returns `Ok(())` once the transport is no longer open or the peer closed
/// the connection. Read failures are returned to the caller.
pub(crate) async fn receive_pump(
    transport: &dyn Transport,
    max_bytes: usize,
    buffer_size: usize,
    incoming: &EventQueue<Message>,
    errors: &EventQueue<String>,
) -> Result<()> {
    let max_bytes = max_bytes.max(1);
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut scratch: Vec<u8> = Vec::with_capacity(buffer.len());

    while transport.state() == ConnectionState::Open {
        scratch.clear();
        let mut total: usize = 0;
        let mut overflowed = false;

        let last = loop {
            let result = transport.receive(&mut buffer).await?;
            if result.kind == FrameKind::Close {
                break result;
            }

            total = total.saturating_add(result.count);
            if !overflowed && total > max_bytes {
                overflowed = true;
                scratch = Vec::new();
                debug!(total, max_bytes, "message exceeds cap, draining remaining frames");
            }
            if !overflowed {
                if let Some(chunk) = buffer.get(..result.count) {
                    scratch.extend_from_slice(chunk);
                }
            }

            if result.end_of_message {
                break result;
            }
        };

        if last.kind == FrameKind::Close {
            debug!("peer closed the connection during receive");
            break;
        }

        if overflowed {
            warn!(total, max_bytes, "dropping oversized message");
            errors.push(format!(
                "received message exceeded the maximum of {max_bytes} bytes (got {total} bytes)"
            ));
            continue;
        }

        let payload = std::mem::take(&mut scratch);
        let message = match last.kind {
            FrameKind::Binary => Message::Binary(payload),
            _ => Message::Text(
                String::from_utf8(payload)
                    .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()),
            ),
        };
        incoming.push(message);
    }

    Ok(())
}

/// Write loop: flush every queued message as its own frame, then yield.
///
/// Parks on the queue when there is nothing to send. When `keep_alive` is set,
/// a ping is written each time the interval elapses.
pub(crate) async fn send_pump(
    transport: &dyn Transport,
    outgoing: &OutgoingQueue<Message>,
    keep_alive: Option<Duration>,
) -> Result<()> {
    let mut ticker = keep_alive.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    while transport.state() == ConnectionState::Open {
        while let Some(message) = outgoing.pop() {
            transport.send(message).await?;
            if transport.state() != ConnectionState::Open {
                break;
            }
        }
        tokio::task::yield_now().await;

        if transport.state() != ConnectionState::Open {
            break;
        }

        match ticker.as_mut() {
            Some(ticker) => {
                tokio::select! {
                    () = outgoing.wait() => {}
                    _ = ticker.tick() => {
                        if let Err(e) = transport.ping().await {
                            warn!("keep-alive ping failed: {e}");
                            return Err(e);
                        }
                    }
                }
            }
            None => outgoing.wait().await,
        }
    }

    let unsent = outgoing.len();
    if unsent > 0 {
        debug!(unsent, "send pump stopped with messages still queued");
    }
    Ok(())
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
    use crate::transport::mock::{binary, text, MockTransport, Scripted};
    use crate::WebSocketError;
    use std::sync::Arc;

    async fn run_receive(transport: &MockTransport, max: usize) -> (Vec<Message>, Vec<String>) {
        let incoming = EventQueue::new();
        let errors = EventQueue::new();
        receive_pump(transport, max, 64, &incoming, &errors)
            .await
            .unwrap();
        (
            incoming.drain().into_iter().collect(),
            errors.drain().into_iter().collect(),
        )
    }

    #[tokio::test]
    async fn fragments_are_concatenated() {
        let transport = MockTransport::open();
        transport.push(text("ab", false));
        transport.push(text("cd", false));
        transport.push(text("ef", true));
        transport.push(Scripted::Close(Some(1000)));

        let (messages, errors) = run_receive(&transport, 100).await;
        assert_eq!(messages, vec![Message::text("abcdef")]);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn binary_tag_is_preserved() {
        let transport = MockTransport::open();
        transport.push(binary(&[1, 2], false));
        transport.push(binary(&[3], true));
        transport.push(Scripted::Close(None));

        let (messages, _) = run_receive(&transport, 100).await;
        assert_eq!(messages, vec![Message::binary(vec![1u8, 2, 3])]);
    }

    #[tokio::test]
    async fn message_at_exact_cap_is_accepted() {
        let transport = MockTransport::open();
        transport.push(text("12345", false));
        transport.push(text("67890", true));
        transport.push(Scripted::Close(None));

        let (messages, errors) = run_receive(&transport, 10).await;
        assert_eq!(messages, vec![Message::text("1234567890")]);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn oversized_message_is_drained_and_reported() {
        let transport = MockTransport::open();
        let chunk = "x".repeat(50);
        for _ in 0..39 {
            transport.push(text(&chunk, false));
        }
        transport.push(text(&chunk, true));
        transport.push(text("next", true));
        transport.push(Scripted::Close(None));

        let (messages, errors) = run_receive(&transport, 1000).await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("exceeded"), "{}", errors[0]);
        assert!(errors[0].contains("1000"), "{}", errors[0]);
        assert!(errors[0].contains("2000"), "{}", errors[0]);
        // The following message starts on a clean boundary.
        assert_eq!(messages, vec![Message::text("next")]);
    }

    #[tokio::test]
    async fn close_mid_message_produces_nothing() {
        let transport = MockTransport::open();
        transport.push(text("partial", false));
        transport.push(Scripted::Close(Some(1001)));

        let (messages, errors) = run_receive(&transport, 100).await;
        assert!(messages.is_empty());
        assert!(errors.is_empty());
        assert_eq!(transport.close_status(), Some(1001));
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let transport = MockTransport::open();
        transport.push(Scripted::Frame {
            kind: FrameKind::Text,
            data: vec![b'o', b'k', 0xFF],
            end: true,
        });
        transport.push(Scripted::Close(None));

        let (messages, _) = run_receive(&transport, 100).await;
        assert_eq!(messages, vec![Message::text("ok\u{FFFD}")]);
    }

    #[tokio::test]
    async fn empty_message_is_delivered() {
        let transport = MockTransport::open();
        transport.push(text("", true));
        transport.push(Scripted::Close(None));

        let (messages, _) = run_receive(&transport, 100).await;
        assert_eq!(messages, vec![Message::text("")]);
    }

    #[tokio::test]
    async fn read_failure_is_returned() {
        let transport = MockTransport::open();
        transport.push(Scripted::Fail("reset by peer".into()));

        let incoming = EventQueue::new();
        let errors = EventQueue::new();
        let err = receive_pump(transport.as_ref(), 100, 64, &incoming, &errors)
            .await
            .unwrap_err();
        assert!(matches!(err, WebSocketError::TransportReceive(_)));
    }

    #[tokio::test]
    async fn send_pump_writes_fifo_one_frame_each() {
        let transport = MockTransport::open();
        let outgoing = Arc::new(OutgoingQueue::new());
        outgoing.push(Message::text("hello"));
        outgoing.push(Message::binary(vec![1u8, 2, 3]));
        outgoing.push(Message::text("bye"));

        let pump = {
            let transport = Arc::clone(&transport);
            let outgoing = Arc::clone(&outgoing);
            tokio::spawn(async move { send_pump(transport.as_ref(), &outgoing, None).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        outgoing.push(Message::text("later"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            *transport.sent.lock(),
            vec![
                Message::text("hello"),
                Message::binary(vec![1u8, 2, 3]),
                Message::text("bye"),
                Message::text("later"),
            ]
        );
        pump.abort();
    }

    #[tokio::test]
    async fn send_pump_stops_when_transport_closes() {
        let transport = MockTransport::open();
        let outgoing = Arc::new(OutgoingQueue::new());

        let pump = {
            let transport = Arc::clone(&transport);
            let outgoing = Arc::clone(&outgoing);
            tokio::spawn(async move { send_pump(transport.as_ref(), &outgoing, None).await })
        };

        transport.close(1000, "").await.unwrap();
        // Wake the pump so it re-checks the state.
        outgoing.push(Message::text("dropped"));

        let result = tokio::time::timeout(Duration::from_millis(200), pump)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(transport.sent.lock().is_empty());
        assert_eq!(outgoing.len(), 1);
    }

    #[tokio::test]
    async fn close_mid_batch_leaves_the_rest_queued() {
        let transport = MockTransport::open_with_send_delay(Duration::from_millis(5));
        let outgoing = Arc::new(OutgoingQueue::new());
        for i in 0..10 {
            outgoing.push(Message::text(format!("m{i}")));
        }

        let pump = {
            let transport = Arc::clone(&transport);
            let outgoing = Arc::clone(&outgoing);
            tokio::spawn(async move { send_pump(transport.as_ref(), &outgoing, None).await })
        };

        tokio::time::sleep(Duration::from_millis(12)).await;
        transport.close(1000, "").await.unwrap();

        let result = tokio::time::timeout(Duration::from_millis(200), pump)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());

        let sent = transport.sent.lock().clone();
        assert!(sent.len() < 10, "close should stop the batch");
        assert_eq!(sent.len() + outgoing.len(), 10);
        let expected: Vec<_> = (0..sent.len())
            .map(|i| Message::text(format!("m{i}")))
            .collect();
        assert_eq!(sent, expected);
    }
}
