// blockfill/core/sync/src/fetcher.rs

use crate::config::{FetchMode, SyncConfig};
use crate::error::FetchError;
use crate::metrics;
use crate::types::Batch;
use crate::{BlockPayload, Height};
use blockfill_rpc::BlockSource;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Per-height retrieval results for one batch. Every height of the batch
/// has exactly one entry.
pub type FetchResults = BTreeMap<Height, Result<BlockPayload, FetchError>>;

/// Retrieves all heights of a batch from the remote node.
///
/// A failing height never aborts the batch; it is reported in place. If a
/// spawned retrieval task is lost (panic or runtime cancellation), the
/// affected heights are fetched again one at a time so the result shape is
/// the same either way.
pub struct BatchFetcher<S: ?Sized> {
    source: Arc<S>,
    timeout: Duration,
    concurrency: Option<usize>,
    mode: FetchMode,
}

impl<S: BlockSource + ?Sized + 'static> BatchFetcher<S> {
    pub fn new(source: Arc<S>, config: &SyncConfig) -> Self {
        Self {
            source,
            timeout: config.fetch_timeout(),
            concurrency: config.fetch_concurrency,
            mode: config.fetch_mode,
        }
    }

    pub async fn fetch_batch(&self, batch: &Batch) -> FetchResults {
        match self.mode {
            FetchMode::Concurrent => self.fetch_concurrent(batch).await,
            FetchMode::Sequential => self.fetch_sequential(batch.heights()).await,
        }
    }

    async fn fetch_concurrent(&self, batch: &Batch) -> FetchResults {
        let limit = self.concurrency.unwrap_or(batch.len()).max(1);
        let permits = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        for &height in batch.iter() {
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&permits);
            let timeout = self.timeout;
            tasks.spawn(async move {
                // The semaphore is never closed; a missing permit only means
                // this retrieval runs unthrottled.
                let _permit = permits.acquire_owned().await.ok();
                (height, fetch_one(&*source, height, timeout).await)
            });
        }

        let mut results = FetchResults::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((height, result)) => {
                    results.insert(height, result);
                }
                Err(e) => warn!(error = %e, "Block retrieval task lost"),
            }
        }

        let lost: Vec<Height> = batch
            .iter()
            .filter(|h| !results.contains_key(h))
            .copied()
            .collect();
        if !lost.is_empty() {
            warn!(
                lost = lost.len(),
                batch = %batch,
                "Falling back to sequential retrieval"
            );
            metrics::record_fetch_fallback(lost.len());
            results.extend(self.fetch_sequential(&lost).await);
        }

        results
    }

    async fn fetch_sequential(&self, heights: &[Height]) -> FetchResults {
        let mut results = FetchResults::new();
        for &height in heights {
            results.insert(height, fetch_one(&*self.source, height, self.timeout).await);
        }
        results
    }
}

async fn fetch_one<S: BlockSource + ?Sized>(
    source: &S,
    height: Height,
    timeout: Duration,
) -> Result<BlockPayload, FetchError> {
    let started = tokio::time::Instant::now();
    let result = tokio::time::timeout(timeout, source.fetch_block(height)).await;
    metrics::record_fetch(matches!(result, Ok(Ok(_))), started.elapsed());

    match result {
        Ok(Ok(payload)) => Ok(payload),
        Ok(Err(e)) => {
            debug!(height, error = %e, "Block retrieval failed");
            Err(FetchError::Rpc(e))
        }
        Err(_) => {
            debug!(height, ?timeout, "Block retrieval timed out");
            Err(FetchError::Timeout(timeout))
        }
    }
}
