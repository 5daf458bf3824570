use blockfill_rpc::RpcError;
use blockfill_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a sync pass. Per-height and per-batch failures never
/// surface here; they are absorbed by the executor.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Remote node error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Sync pass cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,

    #[error("Queue unreachable: {0}")]
    Unreachable(String),
}

/// Why a single height could not be retrieved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Retrieval exceeded {0:?}")]
    Timeout(Duration),

    #[error("Retrieval task failed: {0}")]
    TaskFailed(String),
}
