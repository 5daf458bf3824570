// blockfill/core/sync/src/config.rs

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Tuning for gap detection, batching, admission control and retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Heights fetched together as one job
    pub batch_size: usize,

    /// Maximum heights admitted to the queue at once
    pub chunk_size: usize,

    /// Queue depth at or above which admission waits
    pub queue_threshold: usize,

    /// Executions allowed per batch, first attempt included
    pub max_attempts: u32,

    /// Stop gap detection after this many gaps
    pub gap_limit: Option<usize>,

    /// Interior gaps larger than this are left for a later pass
    pub max_gap_size: Option<u64>,

    /// Lowest height the store is expected to hold (genesis when unset)
    pub start_height: Option<u64>,

    /// Fraction of failed heights above which a batch is retried
    pub failure_threshold: f64,

    /// Delay before a retried batch is resubmitted
    pub retry_backoff: BackoffPolicy,

    /// Queue depth poll interval while waiting for admission
    pub poll_interval_secs: u64,

    /// Progress log interval while waiting for admission
    pub report_interval_secs: u64,

    /// Per-height retrieval deadline
    pub fetch_timeout_secs: u64,

    /// Cap on concurrent retrievals within a batch (unbounded when unset)
    pub fetch_concurrency: Option<usize>,

    pub fetch_mode: FetchMode,

    /// Heights read from the store per page during gap detection
    pub scan_window: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            chunk_size: 2000,
            queue_threshold: 50,
            max_attempts: 3,
            gap_limit: None,
            max_gap_size: None,
            start_height: None,
            failure_threshold: 0.5,
            retry_backoff: BackoffPolicy::default(),
            poll_interval_secs: 30,
            report_interval_secs: 300,
            fetch_timeout_secs: 30,
            fetch_concurrency: None,
            fetch_mode: FetchMode::Concurrent,
            scan_window: 100_000,
        }
    }
}

impl SyncConfig {
    /// Reject settings that would make a pass meaningless. Called before any I/O.
    pub fn validate(&self) -> Result<(), SyncError> {
        let fail = |msg: &str| Err(SyncError::Config(msg.to_string()));

        if self.batch_size == 0 {
            return fail("batch_size must be at least 1");
        }
        if self.chunk_size == 0 {
            return fail("chunk_size must be at least 1");
        }
        if self.queue_threshold == 0 {
            return fail("queue_threshold must be at least 1");
        }
        if self.max_attempts == 0 {
            return fail("max_attempts must be at least 1");
        }
        if self.gap_limit == Some(0) {
            return fail("gap_limit must be at least 1 when set");
        }
        if self.max_gap_size == Some(0) {
            return fail("max_gap_size must be at least 1 when set");
        }
        if !(self.failure_threshold > 0.0 && self.failure_threshold <= 1.0) {
            return fail("failure_threshold must be in (0, 1]");
        }
        if self.poll_interval_secs == 0 {
            return fail("poll_interval_secs must be at least 1");
        }
        if self.fetch_timeout_secs == 0 {
            return fail("fetch_timeout_secs must be at least 1");
        }
        if self.fetch_concurrency == Some(0) {
            return fail("fetch_concurrency must be at least 1 when set");
        }
        if self.scan_window == 0 {
            return fail("scan_window must be at least 1");
        }
        if self.batch_size > self.chunk_size {
            warn!(
                batch_size = self.batch_size,
                chunk_size = self.chunk_size,
                "batch_size exceeds chunk_size; every chunk will hold a single batch"
            );
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// How a concurrent batch retrieval is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// One task per height, bounded by `fetch_concurrency`
    #[default]
    Concurrent,
    /// One height at a time
    Sequential,
}

/// Delay before resubmitting a batch that failed on attempt `n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    Constant { delay_secs: u64 },
    Exponential { base_secs: u64, max_secs: u64 },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Constant { delay_secs: 30 }
    }
}

impl BackoffPolicy {
    /// Delay after the `attempt`-th execution failed (attempts count from 1).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            BackoffPolicy::Constant { delay_secs } => Duration::from_secs(delay_secs),
            BackoffPolicy::Exponential { base_secs, max_secs } => {
                let exponent = attempt.saturating_sub(1).min(32);
                let secs = base_secs.saturating_mul(1u64 << exponent).min(max_secs);
                Duration::from_secs(secs)
            }
        }
    }
}
