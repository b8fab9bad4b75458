//! Minimal in-process background job queue.
//!
//! Bulk maintenance work (workspace-wide summary regeneration, large
//! re-index runs) is queued here and processed sequentially by a single
//! detached worker, so request-path callers return immediately. Job
//! failures are the job's own problem: the worker never stops, and the
//! queue only tracks counts.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    pub scheduled: usize,
    pub processed: usize,
}

impl JobStatus {
    pub fn pending(&self) -> usize {
        self.scheduled.saturating_sub(self.processed)
    }
}

pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
    scheduled: Arc<AtomicUsize>,
    processed: Arc<AtomicUsize>,
}

impl JobQueue {
    /// Create the queue and spawn its worker on the current runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let scheduled = Arc::new(AtomicUsize::new(0));
        let processed = Arc::new(AtomicUsize::new(0));

        let worker_processed = processed.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
                worker_processed.fetch_add(1, Ordering::SeqCst);
            }
            debug!("job queue closed, worker exiting");
        });

        Self {
            tx,
            scheduled,
            processed,
        }
    }

    /// Queue one job. Returns false if the worker is gone (runtime
    /// shutdown), in which case the job is dropped.
    pub fn enqueue<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tx.send(Box::pin(job)).is_ok() {
            self.scheduled.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            scheduled: self.scheduled.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
