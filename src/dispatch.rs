//! Back-pressured dispatch between the network reader and the worker pool.
//!
//! Inbound binary payloads land in a bounded queue. When the queue is full
//! the payload is dropped; the transition is reported exactly once until
//! the depth falls back under the 90% high watermark, at which point the
//! recovery is reported exactly once. Workers poll the queue, idling one
//! second when it is empty, and exit once the session is both closed and
//! stopped with nothing left to drain.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub(crate) const MAX_OPTIONS_QUEUE_DEPTH: usize = 20_000;
pub(crate) const MAX_EQUITIES_QUEUE_DEPTH: usize = 10_000;

/// Worker pool sizing. The quote-heavy bias reflects the relative message
/// rates on the feeds: quotes outnumber trades by roughly an order of
/// magnitude.
pub(crate) fn options_worker_count(has_trade: bool, has_quote: bool) -> usize {
    1 + usize::from(has_trade) + 8 * usize::from(has_quote)
}

pub(crate) fn equities_worker_count(has_quote: bool) -> usize {
    2 + 2 * usize::from(has_quote)
}

/// Result of offering a payload to the bounded queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    /// Enqueued.
    Queued,
    /// Enqueued, and the queue just recovered below the high watermark
    /// after having been full. Log once.
    QueuedDraining,
    /// Dropped, first drop since the queue filled. Log once.
    DroppedFirst,
    /// Dropped while the queue remains full.
    Dropped,
}

/// Sending half of the bounded read queue, with full/draining hysteresis.
pub(crate) struct ReadQueue {
    tx: mpsc::Sender<Vec<u8>>,
    depth: Arc<AtomicUsize>,
    high_watermark: usize,
    full: AtomicBool,
}

/// Receiving half shared by the worker pool.
#[derive(Clone)]
pub(crate) struct ReadQueueReceiver {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>>,
    depth: Arc<AtomicUsize>,
}

pub(crate) fn read_queue(capacity: usize) -> (ReadQueue, ReadQueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let depth = Arc::new(AtomicUsize::new(0));
    (
        ReadQueue {
            tx,
            depth: depth.clone(),
            high_watermark: capacity * 9 / 10,
            full: AtomicBool::new(false),
        },
        ReadQueueReceiver {
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            depth,
        },
    )
}

impl ReadQueue {
    /// Offer a payload. Never blocks; a full queue drops the payload.
    pub(crate) fn push(&self, payload: Vec<u8>) -> PushOutcome {
        match self.tx.try_send(payload) {
            Ok(()) => {
                let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
                if self.full.load(Ordering::SeqCst) && depth < self.high_watermark {
                    self.full.store(false, Ordering::SeqCst);
                    PushOutcome::QueuedDraining
                } else {
                    PushOutcome::Queued
                }
            }
            Err(_) => {
                if self.full.swap(true, Ordering::SeqCst) {
                    PushOutcome::Dropped
                } else {
                    PushOutcome::DroppedFirst
                }
            }
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

impl ReadQueueReceiver {
    /// Take the next payload if one is queued.
    pub(crate) async fn try_pop(&self) -> Option<Vec<u8>> {
        let mut rx = self.rx.lock().await;
        match rx.try_recv() {
            Ok(payload) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Some(payload)
            }
            Err(_) => None,
        }
    }
}

/// Spawn `count` workers draining the queue into `work`. Workers idle one
/// second when the queue is empty and exit when the session is closed and
/// stopped with the queue drained.
pub(crate) fn spawn_workers(
    count: usize,
    receiver: ReadQueueReceiver,
    closed: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    work: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker| {
            let receiver = receiver.clone();
            let closed = Arc::clone(&closed);
            let stopped = Arc::clone(&stopped);
            let work = Arc::clone(&work);
            tokio::spawn(async move {
                loop {
                    match receiver.try_pop().await {
                        Some(payload) => work(payload),
                        None => {
                            if closed.load(Ordering::SeqCst) && stopped.load(Ordering::SeqCst) {
                                info!(worker, "Client - worker exiting");
                                return;
                            }
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            })
        })
        .collect()
}

/// Log a push outcome. State transitions log exactly once; steady-state
/// drops stay quiet.
pub(crate) fn log_push_outcome(outcome: PushOutcome) {
    match outcome {
        PushOutcome::DroppedFirst => warn!("Client - read channel full"),
        PushOutcome::QueuedDraining => info!("Client - read channel draining"),
        PushOutcome::Queued | PushOutcome::Dropped => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_pop_depth() {
        let (queue, receiver) = read_queue(4);
        assert_eq!(queue.push(vec![1]), PushOutcome::Queued);
        assert_eq!(queue.push(vec![2]), PushOutcome::Queued);
        assert_eq!(queue.depth(), 2);
        assert_eq!(receiver.try_pop().await.unwrap(), vec![1]);
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn test_full_logs_once_until_drained() {
        let (queue, receiver) = read_queue(10);
        for i in 0..10 {
            assert_eq!(queue.push(vec![i]), PushOutcome::Queued);
        }
        // First overflow reports, subsequent overflows stay quiet.
        assert_eq!(queue.push(vec![99]), PushOutcome::DroppedFirst);
        assert_eq!(queue.push(vec![99]), PushOutcome::Dropped);

        // Drain below the 90% watermark (9): depth must land under 9 after
        // the next successful push.
        receiver.try_pop().await.unwrap();
        receiver.try_pop().await.unwrap();
        receiver.try_pop().await.unwrap();
        assert_eq!(queue.push(vec![100]), PushOutcome::QueuedDraining);
        assert_eq!(queue.push(vec![101]), PushOutcome::Queued);

        // Refill: a fresh transition reports again.
        assert_eq!(queue.push(vec![102]), PushOutcome::Queued);
        assert_eq!(queue.push(vec![103]), PushOutcome::DroppedFirst);
    }

    #[tokio::test]
    async fn test_worker_exits_when_closed_and_stopped() {
        let (queue, receiver) = read_queue(4);
        queue.push(vec![7]);

        let closed = Arc::new(AtomicBool::new(true));
        let stopped = Arc::new(AtomicBool::new(true));
        let seen = Arc::new(AtomicUsize::new(0));
        let work: Arc<dyn Fn(Vec<u8>) + Send + Sync> = Arc::new({
            let seen = seen.clone();
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        let handles = spawn_workers(2, receiver, closed, stopped, work);
        for handle in handles {
            handle.await.unwrap();
        }
        // The queued payload is drained before exit.
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_pool_sizing() {
        assert_eq!(options_worker_count(false, false), 1);
        assert_eq!(options_worker_count(true, false), 2);
        assert_eq!(options_worker_count(true, true), 10);
        assert_eq!(equities_worker_count(false), 2);
        assert_eq!(equities_worker_count(true), 4);
    }
}
