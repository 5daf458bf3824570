// blockfill/core/sync/src/executor.rs

use crate::config::SyncConfig;
use crate::fetcher::BatchFetcher;
use crate::metrics;
use crate::types::SyncJob;
use crate::Height;
use async_trait::async_trait;
use blockfill_rpc::BlockSource;
use blockfill_storage::BlockStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// How a single execution of a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobOutcome {
    /// Every height fetched and persisted
    Success,
    /// Some heights failed, at most the failure threshold; not retried
    PartialSuccess,
    /// Majority failure with attempts left; resubmit after backoff
    Retry,
    /// Majority failure on the last allowed attempt
    TerminalFailure,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Success => "success",
            JobOutcome::PartialSuccess => "partial_success",
            JobOutcome::Retry => "retry",
            JobOutcome::TerminalFailure => "terminal_failure",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an execution from its failure count.
///
/// The failure ratio is taken over the configured `batch_size`, so a short
/// trailing batch is judged like a full one. A ratio above `threshold`
/// retries while `attempt < max_attempts`.
pub fn classify(
    failed: usize,
    batch_size: usize,
    attempt: u32,
    max_attempts: u32,
    threshold: f64,
) -> JobOutcome {
    if failed == 0 {
        return JobOutcome::Success;
    }
    let ratio = failure_ratio(failed, batch_size);
    if ratio <= threshold {
        JobOutcome::PartialSuccess
    } else if attempt < max_attempts {
        JobOutcome::Retry
    } else {
        JobOutcome::TerminalFailure
    }
}

fn failure_ratio(failed: usize, batch_size: usize) -> f64 {
    failed as f64 / batch_size.max(1) as f64
}

/// Result of executing one job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: u64,
    pub attempt: u32,
    pub outcome: JobOutcome,
    pub batch_len: usize,
    pub persisted: usize,
    /// Heights that failed to fetch or to persist, ascending
    pub failed: Vec<Height>,
    /// Failed heights over the configured batch size
    pub failure_ratio: f64,
    pub elapsed: Duration,
}

/// Running totals over executed jobs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub succeeded: usize,
    pub partial: usize,
    pub retried: usize,
    pub terminal: usize,
    pub heights_persisted: usize,
    pub heights_failed: usize,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: &JobReport) {
        match report.outcome {
            JobOutcome::Success => self.succeeded += 1,
            JobOutcome::PartialSuccess => self.partial += 1,
            JobOutcome::Retry => self.retried += 1,
            JobOutcome::TerminalFailure => self.terminal += 1,
        }
        self.heights_persisted += report.persisted;
        self.heights_failed += report.failed.len();
    }

    /// Total executions, retries included
    pub fn executions(&self) -> usize {
        self.succeeded + self.partial + self.retried + self.terminal
    }

    /// Persisted heights as a percentage of attempted heights
    pub fn success_rate(&self) -> f64 {
        let total = self.heights_persisted + self.heights_failed;
        if total == 0 {
            return 100.0;
        }
        (self.heights_persisted as f64 / total as f64) * 100.0
    }

    /// Merge another set of totals into this one
    pub fn merge(&mut self, other: &ExecutionStats) {
        self.succeeded += other.succeeded;
        self.partial += other.partial;
        self.retried += other.retried;
        self.terminal += other.terminal;
        self.heights_persisted += other.heights_persisted;
        self.heights_failed += other.heights_failed;
    }
}

/// Something that can run a job to completion. Queue workers only see this.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, job: &SyncJob) -> JobReport;
}

/// Fetches a job's batch, persists what arrived and classifies the outcome.
pub struct JobExecutor<St: ?Sized, S: ?Sized> {
    fetcher: BatchFetcher<S>,
    store: Arc<St>,
    batch_size: usize,
    max_attempts: u32,
    failure_threshold: f64,
}

impl<St, S> JobExecutor<St, S>
where
    St: BlockStore + ?Sized + 'static,
    S: BlockSource + ?Sized + 'static,
{
    pub fn new(store: Arc<St>, source: Arc<S>, config: &SyncConfig) -> Self {
        Self {
            fetcher: BatchFetcher::new(source, config),
            store,
            batch_size: config.batch_size,
            max_attempts: config.max_attempts,
            failure_threshold: config.failure_threshold,
        }
    }

    pub async fn run(&self, job: &SyncJob) -> JobReport {
        let started = Instant::now();
        let fetched = self.fetcher.fetch_batch(&job.batch).await;

        let mut persisted = 0;
        let mut failed = Vec::new();
        for (height, result) in fetched {
            match result {
                Ok(payload) => match self.store.write(height, &payload) {
                    Ok(()) => persisted += 1,
                    Err(e) => {
                        warn!(height, error = %e, "Failed to persist block");
                        failed.push(height);
                    }
                },
                Err(_) => failed.push(height),
            }
        }

        let outcome = classify(
            failed.len(),
            self.batch_size,
            job.attempt,
            self.max_attempts,
            self.failure_threshold,
        );
        let report = JobReport {
            job_id: job.id,
            attempt: job.attempt,
            outcome,
            batch_len: job.batch.len(),
            persisted,
            failure_ratio: failure_ratio(failed.len(), self.batch_size),
            failed,
            elapsed: started.elapsed(),
        };

        log_report(job, &report);
        metrics::record_job(outcome, report.persisted, report.failed.len(), report.elapsed);
        report
    }
}

fn log_report(job: &SyncJob, report: &JobReport) {
    match report.outcome {
        JobOutcome::Success => debug!(
            job = job.id,
            batch = %job.batch,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Batch synced"
        ),
        JobOutcome::PartialSuccess => info!(
            job = job.id,
            batch = %job.batch,
            failed = ?report.failed,
            "Batch partially synced; failed heights left for a later pass"
        ),
        JobOutcome::Retry => warn!(
            job = job.id,
            batch = %job.batch,
            attempt = job.attempt,
            failure_ratio = report.failure_ratio,
            "Batch mostly failed; retrying"
        ),
        JobOutcome::TerminalFailure => error!(
            job = job.id,
            batch = %job.batch,
            attempt = job.attempt,
            failed = report.failed.len(),
            "Batch failed on final attempt"
        ),
    }
}

#[async_trait]
impl<St, S> JobHandler for JobExecutor<St, S>
where
    St: BlockStore + ?Sized + 'static,
    S: BlockSource + ?Sized + 'static,
{
    async fn execute(&self, job: &SyncJob) -> JobReport {
        self.run(job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Batch;
    use crate::BlockPayload;
    use blockfill_rpc::RpcError;
    use blockfill_storage::{MemoryStore, StorageError, StoreStats};
    use std::collections::HashSet;

    struct FailingSource {
        failing: HashSet<Height>,
    }

    #[async_trait]
    impl BlockSource for FailingSource {
        async fn latest_height(&self) -> Result<Height, RpcError> {
            Ok(0)
        }

        async fn fetch_block(&self, height: Height) -> Result<BlockPayload, RpcError> {
            if self.failing.contains(&height) {
                Err(RpcError::Transport("connection reset".to_string()))
            } else {
                Ok(BlockPayload::from(vec![height as u8]))
            }
        }
    }

    /// Store that rejects writes for a fixed set of heights.
    struct RejectingStore {
        inner: MemoryStore,
        rejected: HashSet<Height>,
    }

    impl BlockStore for RejectingStore {
        fn exists(&self, height: Height) -> Result<bool, StorageError> {
            self.inner.exists(height)
        }

        fn stats(&self) -> Result<StoreStats, StorageError> {
            self.inner.stats()
        }

        fn write(&self, height: Height, payload: &BlockPayload) -> Result<(), StorageError> {
            if self.rejected.contains(&height) {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.write(height, payload)
        }

        fn read(&self, height: Height) -> Result<Option<BlockPayload>, StorageError> {
            self.inner.read(height)
        }

        fn heights_in(&self, start: Height, end: Height) -> Result<Vec<Height>, StorageError> {
            self.inner.heights_in(start, end)
        }
    }

    fn job(heights: std::ops::Range<Height>, attempt: u32) -> SyncJob {
        SyncJob {
            id: 1,
            batch: Batch::new(heights.collect()).unwrap(),
            attempt,
        }
    }

    fn batches_of_ten() -> SyncConfig {
        SyncConfig {
            batch_size: 10,
            ..Default::default()
        }
    }

    fn executor_with(
        store: Arc<MemoryStore>,
        failing: impl IntoIterator<Item = Height>,
        config: &SyncConfig,
    ) -> JobExecutor<MemoryStore, FailingSource> {
        let source = Arc::new(FailingSource {
            failing: failing.into_iter().collect(),
        });
        JobExecutor::new(store, source, config)
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(classify(0, 10, 1, 3, 0.5), JobOutcome::Success);
        assert_eq!(classify(3, 10, 1, 3, 0.5), JobOutcome::PartialSuccess);
        assert_eq!(classify(5, 10, 1, 3, 0.5), JobOutcome::PartialSuccess);
        assert_eq!(classify(6, 10, 1, 3, 0.5), JobOutcome::Retry);
        assert_eq!(classify(6, 10, 2, 3, 0.5), JobOutcome::Retry);
        assert_eq!(classify(6, 10, 3, 3, 0.5), JobOutcome::TerminalFailure);
        assert_eq!(classify(10, 10, 1, 1, 0.5), JobOutcome::TerminalFailure);
    }

    #[tokio::test]
    async fn test_three_of_ten_fail_is_partial_success() {
        let store = Arc::new(MemoryStore::new());
        let executor = executor_with(store.clone(), [1, 4, 8], &batches_of_ten());

        let report = executor.run(&job(0..10, 1)).await;

        assert_eq!(report.outcome, JobOutcome::PartialSuccess);
        assert_eq!(report.persisted, 7);
        assert_eq!(report.failed, vec![1, 4, 8]);
        assert_eq!(store.len(), 7);
    }

    #[tokio::test]
    async fn test_six_of_ten_fail_retries_then_terminates() {
        let store = Arc::new(MemoryStore::new());
        let executor = executor_with(store.clone(), 0..6, &batches_of_ten());

        let first = executor.run(&job(0..10, 1)).await;
        assert_eq!(first.outcome, JobOutcome::Retry);
        assert!((first.failure_ratio - 0.6).abs() < f64::EPSILON);

        let last = executor.run(&job(0..10, 3)).await;
        assert_eq!(last.outcome, JobOutcome::TerminalFailure);
        // successful heights are persisted regardless of the outcome
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_write_failures_count_as_failed_heights() {
        let store = Arc::new(RejectingStore {
            inner: MemoryStore::new(),
            rejected: (0..8).collect(),
        });
        let source = Arc::new(FailingSource {
            failing: HashSet::new(),
        });
        let executor = JobExecutor::new(store.clone(), source, &batches_of_ten());

        let report = executor.run(&job(0..10, 1)).await;

        assert_eq!(report.outcome, JobOutcome::Retry);
        assert_eq!(report.persisted, 2);
        assert_eq!(report.failed.len(), 8);
    }

    #[tokio::test]
    async fn test_short_trailing_batch_measured_against_batch_size() {
        let store = Arc::new(MemoryStore::new());
        let config = SyncConfig {
            batch_size: 200,
            ..Default::default()
        };
        let executor = executor_with(store, [1000, 1001], &config);

        let report = executor.run(&job(1000..1002, 1)).await;
        assert_eq!(report.outcome, JobOutcome::PartialSuccess);
        assert!((report.failure_ratio - 0.01).abs() < f64::EPSILON);
        assert_eq!(report.failed, vec![1000, 1001]);
    }

    #[test]
    fn test_classify_uses_batch_size_not_batch_len() {
        // two failures out of a two-height batch, batch_size 200
        assert_eq!(classify(2, 200, 1, 3, 0.5), JobOutcome::PartialSuccess);
        assert_eq!(classify(101, 200, 1, 3, 0.5), JobOutcome::Retry);
    }

    #[test]
    fn test_execution_stats_merge() {
        let mut a = ExecutionStats {
            succeeded: 3,
            heights_persisted: 30,
            ..Default::default()
        };
        let b = ExecutionStats {
            partial: 1,
            retried: 2,
            heights_persisted: 7,
            heights_failed: 3,
            ..Default::default()
        };
        a.merge(&b);

        assert_eq!(a.executions(), 6);
        assert_eq!(a.heights_persisted, 37);
        assert!((a.success_rate() - 92.5).abs() < 0.01);
    }
}
