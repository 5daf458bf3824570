// blockfill/core/sync/src/scheduler.rs

use crate::backpressure::BackpressureController;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::gap::{GapDetector, GapReport};
use crate::metrics;
use crate::planner::ChunkPlanner;
use crate::queue::WorkQueue;
use crate::types::{Gap, SyncJob};
use crate::wait::sleep_or_cancel;
use crate::Height;
use blockfill_rpc::BlockSource;
use blockfill_storage::BlockStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// What one pass found and handed to the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub target_height: Height,
    /// Gaps selected for this pass
    pub gaps: usize,
    /// Heights submitted across all admitted chunks
    pub heights_scheduled: u64,
    pub chunks_admitted: usize,
    pub batches_submitted: usize,
    /// Interior gaps left for a later pass because of `max_gap_size`
    pub skipped_gaps: Vec<Gap>,
    /// Detection stopped at `gap_limit`
    pub truncated: bool,
}

/// Drives sync passes: detect what is missing, plan it, and feed it to the
/// queue no faster than the queue drains.
///
/// A pass returns once every chunk is admitted; it does not wait for the
/// submitted jobs to complete.
pub struct SyncScheduler<St: ?Sized, S: ?Sized, Q: ?Sized> {
    store: Arc<St>,
    source: Arc<S>,
    queue: Arc<Q>,
    detector: GapDetector,
    backpressure: BackpressureController<Q>,
    config: SyncConfig,
    next_job_id: AtomicU64,
    passes: AtomicU64,
}

impl<St, S, Q> SyncScheduler<St, S, Q>
where
    St: BlockStore + ?Sized,
    S: BlockSource + ?Sized,
    Q: WorkQueue + ?Sized,
{
    pub fn new(
        store: Arc<St>,
        source: Arc<S>,
        queue: Arc<Q>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self {
            detector: GapDetector::from_config(&config),
            backpressure: BackpressureController::new(Arc::clone(&queue), &config),
            store,
            source,
            queue,
            config,
            next_job_id: AtomicU64::new(1),
            passes: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current remote tip.
    pub async fn target_height(&self) -> Result<Height, SyncError> {
        Ok(self.source.latest_height().await?)
    }

    /// Missing heights up to `target`, without scheduling anything.
    pub fn detect_gaps(&self, target: Height) -> Result<GapReport, SyncError> {
        Ok(self.detector.detect_in(&*self.store, target)?)
    }

    /// One full pass. Cancellation is honoured between chunks and while
    /// waiting for admission.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<PassSummary, SyncError> {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        let result = self
            .schedule(cancel)
            .instrument(info_span!("sync_pass", pass))
            .await;
        metrics::record_pass_finished(match &result {
            Ok(_) => "completed",
            Err(SyncError::Cancelled) => "cancelled",
            Err(_) => "failed",
        });
        result
    }

    async fn schedule(&self, cancel: &CancellationToken) -> Result<PassSummary, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let target = self.target_height().await?;
        let report = self.detect_gaps(target)?;
        metrics::record_pass_plan(target, report.missing_heights());

        for gap in &report.skipped {
            warn!(%gap, len = gap.len(), "Gap exceeds max_gap_size; leaving it for a later pass");
        }
        if report.truncated {
            info!(limit = ?self.config.gap_limit, "Gap limit reached; remaining gaps wait for the next pass");
        }

        let mut summary = PassSummary {
            target_height: target,
            gaps: report.gaps.len(),
            skipped_gaps: report.skipped.clone(),
            truncated: report.truncated,
            ..Default::default()
        };

        if report.gaps.is_empty() {
            info!(target, "Store is complete up to remote tip");
            return Ok(summary);
        }

        info!(
            target,
            gaps = report.gaps.len(),
            missing = report.missing_heights(),
            "Scheduling missing heights"
        );

        let planner = ChunkPlanner::new(
            report.heights(),
            self.config.batch_size,
            self.config.chunk_size,
        );
        for chunk in planner {
            let admission = self.backpressure.admit(cancel).await?;
            let heights = chunk.total_heights();

            for batch in chunk.into_batches() {
                let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
                debug!(job = id, %batch, "Submitting batch");
                self.queue.submit(SyncJob::new(id, batch)).await?;
                summary.batches_submitted += 1;
            }

            summary.chunks_admitted += 1;
            summary.heights_scheduled += heights as u64;
            metrics::record_chunk_admitted(heights, admission.waited);
        }

        info!(
            target,
            heights = summary.heights_scheduled,
            chunks = summary.chunks_admitted,
            batches = summary.batches_submitted,
            "Sync pass scheduled"
        );
        Ok(summary)
    }

    /// Run passes back to back until cancelled. Before the next pass the
    /// loop waits for the queue to empty, so heights still in flight are not
    /// detected as gaps again, then sleeps `poll_interval`. A failed pass is
    /// logged and retried on the next tick; configuration errors end the loop.
    pub async fn follow(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        loop {
            match self.run_pass(cancel).await {
                Ok(summary) => {
                    debug!(?summary, "Pass finished");
                    match self.backpressure.wait_idle(cancel).await {
                        Ok(waited) => debug!(waited_secs = waited.as_secs(), "Queue idle"),
                        Err(SyncError::Cancelled) => return Ok(()),
                        Err(e) => return Err(e),
                    }
                }
                Err(SyncError::Cancelled) => return Ok(()),
                Err(e @ SyncError::Config(_)) => return Err(e),
                Err(e) => error!(error = %e, "Sync pass failed"),
            }

            match sleep_or_cancel(self.config.poll_interval(), cancel).await {
                Ok(()) => {}
                Err(SyncError::Cancelled) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}
