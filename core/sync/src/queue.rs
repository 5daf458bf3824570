// blockfill/core/sync/src/queue.rs

//! Work queue seam and the in-process worker pool behind it.

use crate::config::BackoffPolicy;
use crate::error::QueueError;
use crate::executor::{ExecutionStats, JobHandler, JobOutcome};
use crate::types::SyncJob;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where the scheduler hands off batches.
///
/// `depth` is whatever backpressure should see: jobs waiting, running, or
/// parked for a retry.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn depth(&self) -> Result<usize, QueueError>;

    async fn submit(&self, job: SyncJob) -> Result<(), QueueError>;
}

#[async_trait]
impl<T: WorkQueue + ?Sized> WorkQueue for Arc<T> {
    async fn depth(&self) -> Result<usize, QueueError> {
        (**self).depth().await
    }

    async fn submit(&self, job: SyncJob) -> Result<(), QueueError> {
        (**self).submit(job).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Jobs executed concurrently
    pub workers: usize,
    /// Jobs buffered ahead of the workers
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            capacity: 1000,
        }
    }
}

/// State shared between the queue handle, its workers and retry timers.
struct Shared {
    handler: Arc<dyn JobHandler>,
    sender: mpsc::Sender<SyncJob>,
    pending: watch::Sender<usize>,
    stats: Mutex<ExecutionStats>,
    backoff: BackoffPolicy,
    shutdown: CancellationToken,
}

impl Shared {
    fn job_finished(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Park a failed job and resubmit it after the backoff delay. The job
    /// stays counted in the depth while parked.
    fn schedule_retry(self: &Arc<Self>, job: &SyncJob) {
        let next = job.next_attempt();
        let delay = self.backoff.delay(job.attempt);
        self.pending.send_modify(|n| *n += 1);

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = shared.shutdown.cancelled() => {
                    shared.job_finished();
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            debug!(job = next.id, attempt = next.attempt, "Resubmitting batch");
            if shared.sender.send(next).await.is_err() {
                warn!("Queue closed before retry could be resubmitted");
                shared.job_finished();
            }
        });
    }
}

/// Bounded in-process queue drained by a fixed pool of workers.
pub struct JobQueue {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueue {
    /// Spawn the worker pool. Must be called inside a Tokio runtime.
    pub fn start(handler: Arc<dyn JobHandler>, config: &QueueConfig, backoff: BackoffPolicy) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let (pending, _) = watch::channel(0usize);

        let shared = Arc::new(Shared {
            handler,
            sender,
            pending,
            stats: Mutex::new(ExecutionStats::new()),
            backoff,
            shutdown: CancellationToken::new(),
        });

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&receiver),
                    Arc::clone(&shared),
                ))
            })
            .collect();

        info!(workers = config.workers.max(1), capacity = config.capacity, "Job queue started");
        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Totals over every execution so far
    pub fn stats(&self) -> ExecutionStats {
        self.shared.stats.lock().clone()
    }

    pub fn pending(&self) -> usize {
        *self.shared.pending.borrow()
    }

    /// Wait until no job is queued, running or parked for a retry.
    pub async fn drain(&self) {
        let mut pending = self.shared.pending.subscribe();
        // the sender lives in `shared`, so the channel cannot close here
        let _ = pending.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting work, abandon parked retries and wait for the workers
    /// to finish their current job.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Queue worker terminated abnormally");
            }
        }
        info!(stats = ?self.stats(), "Job queue stopped");
    }
}

#[async_trait]
impl WorkQueue for JobQueue {
    async fn depth(&self) -> Result<usize, QueueError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }
        Ok(self.pending())
    }

    async fn submit(&self, job: SyncJob) -> Result<(), QueueError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }
        self.shared.pending.send_modify(|n| *n += 1);
        if self.shared.sender.send(job).await.is_err() {
            self.shared.job_finished();
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<SyncJob>>>,
    shared: Arc<Shared>,
) {
    debug!(worker_id, "Queue worker started");
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                _ = shared.shutdown.cancelled() => break,
                job = receiver.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            }
        };

        // run on its own task so a panicking handler cannot take the worker down
        let handler = Arc::clone(&shared.handler);
        let running = job.clone();
        match tokio::spawn(async move { handler.execute(&running).await }).await {
            Ok(report) => {
                shared.stats.lock().record(&report);
                if report.outcome == JobOutcome::Retry {
                    shared.schedule_retry(&job);
                }
            }
            Err(e) => error!(worker_id, job = job.id, error = %e, "Job execution panicked"),
        }
        shared.job_finished();
    }
    debug!(worker_id, "Queue worker stopped");
}
