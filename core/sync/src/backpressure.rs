// blockfill/core/sync/src/backpressure.rs

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::metrics;
use crate::queue::WorkQueue;
use crate::wait::sleep_or_cancel;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a successful admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Depth observed on the admitting check
    pub depth: usize,
    /// Time spent waiting for the queue to drain
    pub waited: Duration,
    /// Depth checks that came back at or above the threshold
    pub rejected_polls: u32,
    /// Progress lines logged on `report_interval` while waiting
    pub progress_reports: u32,
}

/// Gates chunk admission on observed queue depth.
///
/// Check depth; admit when it is below the threshold, otherwise poll on a
/// fixed interval until it is. A failed depth observation counts as an empty
/// queue. Cancellation aborts the wait with [`SyncError::Cancelled`].
pub struct BackpressureController<Q: ?Sized> {
    queue: Arc<Q>,
    threshold: usize,
    poll_interval: Duration,
    report_interval: Duration,
}

impl<Q: WorkQueue + ?Sized> BackpressureController<Q> {
    pub fn new(queue: Arc<Q>, config: &SyncConfig) -> Self {
        Self {
            queue,
            threshold: config.queue_threshold,
            poll_interval: config.poll_interval(),
            report_interval: config.report_interval(),
        }
    }

    pub async fn admit(&self, cancel: &CancellationToken) -> Result<Admission, SyncError> {
        let started = Instant::now();
        let mut last_report = started;
        let mut rejected_polls = 0u32;
        let mut progress_reports = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let depth = self.observe_depth().await;
            if depth < self.threshold {
                let waited = started.elapsed();
                if rejected_polls > 0 {
                    info!(depth, waited_secs = waited.as_secs(), "Queue drained; admitting chunk");
                }
                return Ok(Admission {
                    depth,
                    waited,
                    rejected_polls,
                    progress_reports,
                });
            }

            if rejected_polls == 0 {
                debug!(depth, threshold = self.threshold, "Queue saturated; waiting");
            } else if last_report.elapsed() >= self.report_interval {
                info!(
                    depth,
                    threshold = self.threshold,
                    waited_secs = started.elapsed().as_secs(),
                    "Still waiting for queue to drain"
                );
                last_report = Instant::now();
                progress_reports += 1;
            }
            rejected_polls += 1;

            sleep_or_cancel(self.poll_interval, cancel).await?;
        }
    }

    /// Wait until the queue reports nothing queued, running or parked.
    /// Polls on the same interval as [`admit`](Self::admit) and, like it,
    /// treats an unreachable queue as empty.
    pub async fn wait_idle(&self, cancel: &CancellationToken) -> Result<Duration, SyncError> {
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let depth = self.observe_depth().await;
            if depth == 0 {
                return Ok(started.elapsed());
            }
            debug!(depth, "Waiting for in-flight batches before next pass");
            sleep_or_cancel(self.poll_interval, cancel).await?;
        }
    }

    async fn observe_depth(&self) -> usize {
        match self.queue.depth().await {
            Ok(depth) => {
                metrics::record_queue_depth(depth);
                depth
            }
            Err(e) => {
                warn!(error = %e, "Queue depth unavailable; treating as empty");
                metrics::record_queue_unreachable();
                0
            }
        }
    }
}
