//! Bounded handoff between the producer thread and the consumer port.
//!
//! Capacity is in batches, not events: a slow consumer falls behind one
//! batch at a time. On overflow the oldest batch is dropped and a counter
//! is bumped rather than blocking the producer, so a stalled consumer can
//! never stall the watcher thread or the OS-level backend behind it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::event::Batch;

struct Inner {
    batches: Mutex<VecDeque<Batch>>,
    not_empty: Condvar,
    capacity: usize,
    dropped: AtomicU64,
    closed: std::sync::atomic::AtomicBool,
}

/// The producer-facing half of a [`BatchQueue`].
#[derive(Clone)]
pub struct QueueSender {
    inner: Arc<Inner>,
}

/// The consumer-facing half of a [`BatchQueue`].
#[derive(Clone)]
pub struct QueueReceiver {
    inner: Arc<Inner>,
}

/// Creates a bounded batch queue with room for `capacity` batches.
pub fn channel(capacity: usize) -> (QueueSender, QueueReceiver) {
    let inner = Arc::new(Inner {
        batches: Mutex::new(VecDeque::with_capacity(capacity)),
        not_empty: Condvar::new(),
        capacity,
        dropped: AtomicU64::new(0),
        closed: std::sync::atomic::AtomicBool::new(false),
    });
    (
        QueueSender {
            inner: inner.clone(),
        },
        QueueReceiver { inner },
    )
}

impl QueueSender {
    /// Pushes a batch, dropping the oldest queued batch if at capacity.
    pub fn push(&self, batch: Batch) {
        let mut batches = self.inner.batches.lock();
        if batches.len() == self.inner.capacity {
            batches.pop_front();
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        batches.push_back(batch);
        self.inner.not_empty.notify_one();
    }

    /// Count of batches dropped so far due to the consumer falling behind.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Wakes any blocked receiver with no batch; used when the producer
    /// thread is shutting down so `pull` doesn't wait out its full timeout.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.not_empty.notify_all();
    }
}

impl QueueReceiver {
    /// Blocks for up to `timeout`, returning the oldest pending batch if
    /// one arrives (or already existed) before the deadline.
    pub fn pull(&self, timeout: Duration) -> Option<Batch> {
        let mut batches = self.inner.batches.lock();
        if let Some(batch) = batches.pop_front() {
            return Some(batch);
        }
        if self.inner.closed.load(Ordering::Acquire) {
            return None;
        }
        let result = self
            .inner
            .not_empty
            .wait_for(&mut batches, timeout, |b| !b.is_empty());
        if result.timed_out() {
            return None;
        }
        batches.pop_front()
    }

    /// Number of batches dropped so far due to the consumer falling behind.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, ObjectKind};
    use std::path::PathBuf;

    fn batch(n: u8) -> Batch {
        vec![Event::Create(PathBuf::from(format!("/w/{n}")), ObjectKind::File)]
    }

    #[test]
    fn pulls_in_fifo_order() {
        let (tx, rx) = channel(4);
        tx.push(batch(1));
        tx.push(batch(2));
        assert_eq!(rx.pull(Duration::from_millis(10)), Some(batch(1)));
        assert_eq!(rx.pull(Duration::from_millis(10)), Some(batch(2)));
    }

    #[test]
    fn overflow_drops_oldest_and_counts_it() {
        let (tx, rx) = channel(2);
        tx.push(batch(1));
        tx.push(batch(2));
        tx.push(batch(3));
        assert_eq!(rx.dropped_count(), 1);
        assert_eq!(rx.pull(Duration::from_millis(10)), Some(batch(2)));
        assert_eq!(rx.pull(Duration::from_millis(10)), Some(batch(3)));
    }

    #[test]
    fn pull_times_out_when_empty() {
        let (_tx, rx) = channel(2);
        assert_eq!(rx.pull(Duration::from_millis(20)), None);
    }

    #[test]
    fn close_unblocks_pending_pull() {
        let (tx, rx) = channel(2);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(10));
                tx.close();
            });
            assert_eq!(rx.pull(Duration::from_secs(5)), None);
        });
    }
}
