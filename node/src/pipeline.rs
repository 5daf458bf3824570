// blockfill/node/src/pipeline.rs

//! Wiring of store, remote client, job queue and scheduler.

use crate::config::{NodeConfig, StorageConfig};
use crate::metrics::{record_store_stats, MetricsTimer, METRIC_PASS_DURATION};
use anyhow::Context;
use blockfill_primitives::{Height, StoreStats};
use blockfill_rpc::{BlockSource, JsonRpcClient};
use blockfill_storage::{BlockStore, MemoryStore, RocksBlockStore};
use blockfill_sync::{
    CancellationToken, ExecutionStats, GapDetector, GapReport, JobExecutor, JobQueue, PassSummary,
    SyncConfig, SyncError, SyncScheduler,
};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub type SharedStore = Arc<dyn BlockStore>;
pub type SharedSource = Arc<dyn BlockSource>;

pub fn open_store(config: &StorageConfig) -> anyhow::Result<SharedStore> {
    if config.in_memory {
        warn!("Using in-memory store; synced blocks are lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = RocksBlockStore::open(&config.data_dir)
        .with_context(|| format!("Failed to open block store at {}", config.data_dir.display()))?;
    Ok(Arc::new(store))
}

pub fn connect(config: &NodeConfig) -> anyhow::Result<SharedSource> {
    let client = JsonRpcClient::new(&config.rpc)?;
    Ok(Arc::new(client))
}

/// A running queue plus the scheduler that feeds it.
pub struct Pipeline {
    store: SharedStore,
    queue: Arc<JobQueue>,
    scheduler: SyncScheduler<dyn BlockStore, dyn BlockSource, JobQueue>,
}

impl Pipeline {
    /// Start the worker pool. Must be called inside a Tokio runtime.
    pub fn start(
        config: &NodeConfig,
        store: SharedStore,
        source: SharedSource,
    ) -> Result<Self, SyncError> {
        config.sync.validate()?;

        let executor = JobExecutor::new(Arc::clone(&store), Arc::clone(&source), &config.sync);
        let queue = Arc::new(JobQueue::start(
            Arc::new(executor),
            &config.queue,
            config.sync.retry_backoff.clone(),
        ));
        let scheduler = SyncScheduler::new(
            Arc::clone(&store),
            source,
            Arc::clone(&queue),
            config.sync.clone(),
        )?;

        Ok(Self {
            store,
            queue,
            scheduler,
        })
    }

    /// One pass: detect, plan, admit.
    pub async fn sync_once(&self, cancel: &CancellationToken) -> Result<PassSummary, SyncError> {
        let _timer = MetricsTimer::new(METRIC_PASS_DURATION);
        let summary = self.scheduler.run_pass(cancel).await?;
        if let Ok(stats) = self.store.stats() {
            record_store_stats(&stats);
        }
        Ok(summary)
    }

    /// Passes on an interval until cancelled.
    pub async fn follow(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        self.scheduler.follow(cancel).await
    }

    /// Wait for submitted work to finish. Returns false if cancelled first.
    pub async fn drain(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = self.queue.drain() => true,
            _ = cancel.cancelled() => false,
        }
    }

    /// Stop the workers and return what they did.
    pub async fn shutdown(&self) -> ExecutionStats {
        self.queue.shutdown().await;
        if let Ok(stats) = self.store.stats() {
            record_store_stats(&stats);
        }
        self.queue.stats()
    }
}

/// Snapshot printed by `blockfill status`.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub store: StoreStats,
    pub remote_height: Option<Height>,
    pub start_height: Height,
}

impl StatusReport {
    /// Heights in `[start_height, remote_height]` not yet persisted, assuming
    /// nothing is stored outside that range.
    pub fn estimated_missing(&self) -> Option<u64> {
        let tip = self.remote_height?;
        if tip < self.start_height {
            return Some(0);
        }
        Some(
            (tip - self.start_height)
                .saturating_add(1)
                .saturating_sub(self.store.count),
        )
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "store:   {}", self.store)?;
        if self.store.interior_missing() > 0 {
            writeln!(f, "holes:   {} below store max", self.store.interior_missing())?;
        }
        match self.remote_height {
            Some(tip) => writeln!(f, "remote:  height {}", tip)?,
            None => writeln!(f, "remote:  unreachable")?,
        }
        match self.estimated_missing() {
            Some(missing) => write!(f, "missing: ~{}", missing),
            None => write!(f, "missing: unknown"),
        }
    }
}

pub async fn status(
    store: &dyn BlockStore,
    source: &dyn BlockSource,
    sync: &SyncConfig,
) -> anyhow::Result<StatusReport> {
    let stats = store.stats()?;
    record_store_stats(&stats);
    let remote_height = match source.latest_height().await {
        Ok(height) => Some(height),
        Err(e) => {
            warn!(error = %e, "Remote node unavailable");
            None
        }
    };
    Ok(StatusReport {
        store: stats,
        remote_height,
        start_height: sync.start_height.unwrap_or(0),
    })
}

/// Gap detection without scheduling. Asks the remote node for the tip
/// unless `target` is given.
pub async fn find_gaps(
    store: &dyn BlockStore,
    source: Option<&dyn BlockSource>,
    sync: &SyncConfig,
    target: Option<Height>,
) -> anyhow::Result<(Height, GapReport)> {
    sync.validate()?;
    let target = match (target, source) {
        (Some(target), _) => target,
        (None, Some(source)) => source.latest_height().await?,
        (None, None) => anyhow::bail!("No target height and no remote node to ask"),
    };
    let report = GapDetector::from_config(sync).detect_in(store, target)?;
    Ok((target, report))
}
