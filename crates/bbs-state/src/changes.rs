//! Bounded, lossy change-notification queue.
//!
//! Producers never block: when the queue is full the oldest notification
//! is evicted to admit the newest. Subscribers only care about recency,
//! so dropping stale summaries is acceptable.

use std::collections::VecDeque;
use std::sync::Arc;

use bbs_protocol::{ContentHeader, PubKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Summary of one committed board update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changes {
    pub board: PubKey,
    pub seq: u64,
    pub new: Vec<ContentHeader>,
}

#[derive(Debug)]
struct Shared {
    queue: Mutex<VecDeque<Changes>>,
    capacity: usize,
    notify: Notify,
}

/// Write end of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangesQueue {
    shared: Arc<Shared>,
}

/// Read end of the queue. Several receivers share one queue; each
/// notification is taken by exactly one of them.
#[derive(Debug, Clone)]
pub struct ChangesReceiver {
    shared: Arc<Shared>,
}

impl ChangesQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity: capacity.max(1),
                notify: Notify::new(),
            }),
        }
    }

    /// Enqueue without blocking. Returns the evicted notification, if any.
    pub fn push(&self, changes: Changes) -> Option<Changes> {
        let evicted = {
            let mut queue = self.shared.queue.lock();
            let evicted = if queue.len() >= self.shared.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(changes);
            evicted
        };
        self.shared.notify.notify_one();
        evicted
    }

    pub fn receiver(&self) -> ChangesReceiver {
        ChangesReceiver {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl ChangesReceiver {
    pub fn try_recv(&self) -> Option<Changes> {
        self.shared.queue.lock().pop_front()
    }

    /// Wait for the next notification.
    pub async fn recv(&self) -> Changes {
        loop {
            let notified = self.shared.notify.notified();
            if let Some(changes) = self.try_recv() {
                return changes;
            }
            notified.await;
        }
    }

    /// Take everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<Changes> {
        self.shared.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes(seq: u64) -> Changes {
        Changes {
            board: PubKey([0; 32]),
            seq,
            new: Vec::new(),
        }
    }

    #[test]
    fn test_keeps_most_recent() {
        let queue = ChangesQueue::new(10);
        let rx = queue.receiver();
        for seq in 1..=15 {
            queue.push(changes(seq));
        }
        let seqs: Vec<u64> = rx.drain().into_iter().map(|c| c.seq).collect();
        assert_eq!(seqs, (6..=15).collect::<Vec<_>>());
    }

    #[test]
    fn test_push_reports_eviction() {
        let queue = ChangesQueue::new(1);
        assert!(queue.push(changes(1)).is_none());
        assert_eq!(queue.push(changes(2)).map(|c| c.seq), Some(1));
    }

    #[tokio::test]
    async fn test_recv_wakes_on_push() {
        let queue = ChangesQueue::new(10);
        let rx = queue.receiver();
        let waiter = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        queue.push(changes(4));
        assert_eq!(waiter.await.unwrap().seq, 4);
    }
}
