//! Lock-guarded FIFO queues shared between the pumps and the consumer.
//!
//! Each queue owns its own [`parking_lot::Mutex`]; no lock is ever shared
//! between queues, and no lock is held while a callback runs.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// A multi-producer FIFO drained in bulk by a single consumer.
#[derive(Debug)]
pub(crate) struct EventQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> EventQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn push(&self, item: T) {
        self.items.lock().push_back(item);
    }

    /// Take everything queued so far, leaving the queue empty. The lock is
    /// held only for the swap.
    pub(crate) fn drain(&self) -> VecDeque<T> {
        std::mem::take(&mut *self.items.lock())
    }

    pub(crate) fn pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.items.lock().clear();
    }
}

/// Outgoing queue with a wake-up signal for the send pump.
#[derive(Debug)]
pub(crate) struct OutgoingQueue<T> {
    queue: EventQueue<T>,
    ready: Notify,
}

impl<T> OutgoingQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            queue: EventQueue::new(),
            ready: Notify::new(),
        }
    }

    pub(crate) fn push(&self, item: T) {
        self.queue.push(item);
        self.ready.notify_one();
    }

    /// Take the oldest message. Anything not yet taken stays queued if the
    /// pump stops early.
    pub(crate) fn pop(&self) -> Option<T> {
        self.queue.pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn clear(&self) {
        self.queue.clear();
    }

    /// Wait until something has been pushed since the last wake-up.
    ///
    /// `notify_one` stores a permit when nobody is waiting, so a push that
    /// races with the pump's drain is never missed.
    pub(crate) async fn wait(&self) {
        self.ready.notified().await;
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
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn drain_preserves_order_and_empties() {
        let queue = EventQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.drain(), VecDeque::from(vec![1, 2, 3]));
        assert_eq!(queue.len(), 0);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let queue = Arc::new(EventQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        queue.push(t * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let drained = queue.drain();
        assert_eq!(drained.len(), 1000);
        // Per-producer order is preserved.
        for t in 0..4 {
            let mine: Vec<_> = drained.iter().filter(|v| **v / 1000 == t).collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[tokio::test]
    async fn push_before_wait_is_not_lost() {
        let queue = OutgoingQueue::new();
        queue.push("early");
        tokio::time::timeout(Duration::from_millis(100), queue.wait())
            .await
            .expect("stored permit should wake the waiter");
        assert_eq!(queue.pop(), Some("early"));
        assert_eq!(queue.pop(), None);
    }

    #[tokio::test]
    async fn wait_blocks_until_push() {
        let queue = Arc::new(OutgoingQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        queue.push(7);
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
