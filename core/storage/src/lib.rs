// blockfill/core/storage/src/lib.rs

//! Local block store.
//!
//! The ingestion pipeline only needs four things from persistence: whether a
//! height is present, a `(min, max, count)` snapshot, an idempotent write, and
//! an ordered scan of persisted heights. [`BlockStore`] captures exactly that;
//! [`RocksBlockStore`] is the on-disk implementation and [`MemoryStore`] backs
//! tests and ephemeral runs.

pub mod db;
pub mod error;
pub mod memory;

pub use blockfill_primitives::{BlockPayload, Height, StoreStats};
pub use db::RocksBlockStore;
pub use error::StorageError;
pub use memory::MemoryStore;

/// Persistence seam used by gap detection and job execution.
///
/// Writes are upserts: writing a height twice leaves `stats().count`
/// unchanged after the first write. Implementations must tolerate concurrent
/// writers.
pub trait BlockStore: Send + Sync {
    /// Whether `height` has a persisted payload.
    fn exists(&self, height: Height) -> Result<bool, StorageError>;

    /// Current `(min, max, count)` snapshot.
    fn stats(&self) -> Result<StoreStats, StorageError>;

    /// Persist `payload` at `height`, replacing any previous payload.
    fn write(&self, height: Height, payload: &BlockPayload) -> Result<(), StorageError>;

    /// Read back a persisted payload.
    fn read(&self, height: Height) -> Result<Option<BlockPayload>, StorageError>;

    /// Persisted heights in `start..=end`, ascending.
    fn heights_in(&self, start: Height, end: Height) -> Result<Vec<Height>, StorageError>;
}

impl<T: BlockStore + ?Sized> BlockStore for std::sync::Arc<T> {
    fn exists(&self, height: Height) -> Result<bool, StorageError> {
        (**self).exists(height)
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        (**self).stats()
    }

    fn write(&self, height: Height, payload: &BlockPayload) -> Result<(), StorageError> {
        (**self).write(height, payload)
    }

    fn read(&self, height: Height) -> Result<Option<BlockPayload>, StorageError> {
        (**self).read(height)
    }

    fn heights_in(&self, start: Height, end: Height) -> Result<Vec<Height>, StorageError> {
        (**self).heights_in(start, end)
    }
}
