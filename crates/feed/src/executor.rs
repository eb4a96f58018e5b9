//! Per-feed publish executor.
//!
//! Each feed owns one worker task fed by an unbounded channel: publishing
//! enqueues and returns immediately, jobs run in enqueue order (FIFO per
//! topic), and independent feeds proceed in parallel under the runtime.
//! There is no internal backpressure; the queue-depth gauge is the
//! operator's signal to scale.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tracing::warn;

use crate::metrics;

type Job = Box<dyn FnOnce() + Send>;

/// Single-worker executor preserving publish order for one feed.
///
/// Dropping the executor closes the channel and stops the worker after it
/// drains the jobs already enqueued.
pub(crate) struct FeedExecutor {
    feed: &'static str,
    tx: mpsc::UnboundedSender<Job>,
    depth: Arc<AtomicUsize>,
}

impl FeedExecutor {
    /// Spawns the worker task on the current runtime.
    pub fn new(feed: &'static str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let depth = Arc::new(AtomicUsize::new(0));

        let worker_depth = Arc::clone(&depth);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let remaining = worker_depth.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
                metrics::set_queue_depth(feed, remaining);
                job();
            }
        });

        Self { feed, tx, depth }
    }

    /// Enqueues a job; never blocks and never fails the caller.
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::set_queue_depth(self.feed, depth);

        if self.tx.send(Box::new(job)).is_err() {
            // Worker is gone (runtime shutdown); drop the event.
            self.depth.fetch_sub(1, Ordering::Relaxed);
            warn!(feed = self.feed, "publish executor stopped, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use parking_lot::Mutex;

    use super::*;

    #[tokio::test]
    async fn test_jobs_run_in_enqueue_order() {
        let executor = FeedExecutor::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10u32 {
            let seen = Arc::clone(&seen);
            executor.enqueue(move || seen.lock().push(i));
        }

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
        while tokio::time::Instant::now() < deadline {
            if seen.lock().len() == 10 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_enqueue_never_blocks() {
        let executor = FeedExecutor::new("test-burst");
        let counter = Arc::new(AtomicU64::new(0));
        for _ in 0..1000 {
            let counter = Arc::clone(&counter);
            executor.enqueue(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
        while tokio::time::Instant::now() < deadline {
            if counter.load(Ordering::Relaxed) == 1000 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        assert_eq!(counter.load(Ordering::Relaxed), 1000);
    }
}
