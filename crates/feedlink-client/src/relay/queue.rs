//! Bounded FIFO hand-off between the upstream and downstream sessions.
//!
//! The consumer peeks at the head, writes it, and only then acknowledges it
//! by sequence number. Acknowledging by sequence keeps the queue consistent
//! when the head was evicted by the drop-oldest policy during a write.

use std::collections::VecDeque;
use std::sync::Arc;

use feedlink_core::Envelope;
use feedlink_core::config::OverflowPolicy;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// An envelope waiting in the queue, tagged with its insertion sequence.
#[derive(Debug, Clone)]
pub struct Queued {
    pub seq: u64,
    pub envelope: Arc<Envelope>,
}

/// Result of [`OutboundQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The queue was full; the pushed envelope was discarded.
    DroppedNewest,
    /// The queue was full; the oldest envelope was evicted to make room.
    EvictedOldest,
}

impl PushOutcome {
    pub const fn lost_envelope(self) -> bool {
        !matches!(self, Self::Queued)
    }
}

#[derive(Debug)]
struct Inner {
    items: VecDeque<Queued>,
    next_seq: u64,
}

/// Capacity-bounded, in-memory outbound queue.
#[derive(Debug)]
pub struct OutboundQueue {
    inner: Mutex<Inner>,
    capacity: usize,
    policy: OverflowPolicy,
    notify: Notify,
}

impl OutboundQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(4096)),
                next_seq: 0,
            }),
            capacity,
            policy,
            notify: Notify::new(),
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an envelope, applying the overflow policy when full.
    pub fn push(&self, envelope: Envelope) -> PushOutcome {
        let outcome = {
            let mut inner = self.inner.lock();
            let outcome = if inner.items.len() < self.capacity {
                PushOutcome::Queued
            } else {
                match self.policy {
                    OverflowPolicy::DropNewest => return PushOutcome::DroppedNewest,
                    OverflowPolicy::DropOldest => {
                        inner.items.pop_front();
                        PushOutcome::EvictedOldest
                    }
                }
            };
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.items.push_back(Queued {
                seq,
                envelope: Arc::new(envelope),
            });
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    /// Clone of the head entry, without removing it.
    pub fn peek(&self) -> Option<Queued> {
        self.inner.lock().items.front().cloned()
    }

    /// Wait until the queue has a head entry and return a clone of it.
    ///
    /// Cancel safe; meant for a single consumer.
    pub async fn next(&self) -> Queued {
        loop {
            let notified = self.notify.notified();
            if let Some(head) = self.peek() {
                return head;
            }
            notified.await;
        }
    }

    /// Remove the head entry if it is still `seq`. Returns whether it was.
    pub fn ack(&self, seq: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.items.front().is_some_and(|head| head.seq == seq) {
            inner.items.pop_front();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    impl OutboundQueue {
        fn payloads(&self) -> Vec<String> {
            self.inner
                .lock()
                .items
                .iter()
                .map(|q| q.envelope.payload().to_string())
                .collect()
        }
    }

    fn envelope(payload: &str) -> Envelope {
        Envelope::new(Arc::from("test"), payload)
    }

    fn fill(queue: &OutboundQueue, count: usize) -> Vec<PushOutcome> {
        (0..count)
            .map(|i| queue.push(envelope(&format!("L{i}"))))
            .collect()
    }

    #[test]
    fn preserves_insertion_order() {
        let queue = OutboundQueue::new(8, OverflowPolicy::DropNewest);
        fill(&queue, 3);
        assert_eq!(queue.payloads(), ["L0", "L1", "L2"]);

        let head = queue.peek().unwrap();
        assert!(queue.ack(head.seq));
        assert_eq!(queue.payloads(), ["L1", "L2"]);
    }

    #[test]
    fn drop_newest_keeps_first_k() {
        let queue = OutboundQueue::new(5, OverflowPolicy::DropNewest);
        let outcomes = fill(&queue, 8);

        assert_eq!(queue.len(), 5);
        assert_eq!(queue.payloads(), ["L0", "L1", "L2", "L3", "L4"]);
        assert_eq!(
            outcomes.iter().filter(|o| o.lost_envelope()).count(),
            3
        );
        assert!(outcomes[5..].iter().all(|o| *o == PushOutcome::DroppedNewest));
    }

    #[test]
    fn drop_oldest_keeps_last_k() {
        let queue = OutboundQueue::new(5, OverflowPolicy::DropOldest);
        let outcomes = fill(&queue, 8);

        assert_eq!(queue.payloads(), ["L3", "L4", "L5", "L6", "L7"]);
        assert!(outcomes[5..].iter().all(|o| *o == PushOutcome::EvictedOldest));
    }

    #[test]
    fn ack_of_evicted_head_is_ignored() {
        let queue = OutboundQueue::new(2, OverflowPolicy::DropOldest);
        fill(&queue, 2);
        let head = queue.peek().unwrap();

        // Head is evicted while the consumer is still writing it.
        queue.push(envelope("L2"));
        assert!(!queue.ack(head.seq));
        assert_eq!(queue.payloads(), ["L1", "L2"]);
    }

    #[test]
    fn sequence_numbers_increase() {
        let queue = OutboundQueue::new(4, OverflowPolicy::DropNewest);
        fill(&queue, 2);
        let first = queue.peek().unwrap();
        queue.ack(first.seq);
        let second = queue.peek().unwrap();
        assert!(second.seq > first.seq);
    }

    #[tokio::test]
    async fn next_waits_for_producer() {
        let queue = Arc::new(OutboundQueue::new(4, OverflowPolicy::DropNewest));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.push(envelope("late"));
        let head = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.envelope.payload(), "late");
        // `next` does not dequeue.
        assert_eq!(queue.len(), 1);
    }
}
