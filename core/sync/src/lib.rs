// blockfill/core/sync/src/lib.rs

//! Gap detection and backpressured block retrieval.
//!
//! A sync pass reads store statistics, finds the missing heights (interior
//! gaps plus the frontier up to the remote tip), slices them into batches and
//! admission chunks, and hands each batch to a work queue once the queue is
//! shallow enough. Queue workers fetch the batch concurrently, persist what
//! arrived, and decide whether the batch deserves another attempt.

pub mod backpressure;
pub mod config;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod gap;
pub mod metrics;
pub mod planner;
pub mod queue;
pub mod scheduler;
pub mod types;
mod wait;

pub use backpressure::{Admission, BackpressureController};
pub use config::{BackoffPolicy, FetchMode, SyncConfig};
pub use error::{FetchError, QueueError, SyncError};
pub use executor::{classify, ExecutionStats, JobExecutor, JobHandler, JobOutcome, JobReport};
pub use fetcher::{BatchFetcher, FetchResults};
pub use gap::{detect, GapDetector, GapOptions, GapReport, GapScan};
pub use planner::ChunkPlanner;
pub use queue::{JobQueue, QueueConfig, WorkQueue};
pub use scheduler::{PassSummary, SyncScheduler};
pub use types::{Batch, Chunk, Gap, SyncJob};

pub use blockfill_primitives::{BlockPayload, Height, StoreStats};
pub use tokio_util::sync::CancellationToken;
