// blockfill/core/sync/src/planner.rs

use crate::types::{Batch, Chunk};
use crate::Height;

/// Lazily slices an ascending height stream into batches, and batches into
/// admission chunks.
///
/// Only the chunk being assembled (plus at most one carried-over batch) is
/// held in memory, so planning a range of tens of millions of heights costs
/// `O(chunk_size)`. A batch is never split across chunks; a batch larger
/// than `chunk_size` becomes a chunk on its own.
pub struct ChunkPlanner<I> {
    heights: I,
    batch_size: usize,
    chunk_size: usize,
    carried: Option<Batch>,
}

impl<I: Iterator<Item = Height>> ChunkPlanner<I> {
    pub fn new(
        heights: impl IntoIterator<IntoIter = I>,
        batch_size: usize,
        chunk_size: usize,
    ) -> Self {
        Self {
            heights: heights.into_iter(),
            batch_size: batch_size.max(1),
            chunk_size: chunk_size.max(1),
            carried: None,
        }
    }

    fn next_batch(&mut self) -> Option<Batch> {
        let heights: Vec<Height> = self.heights.by_ref().take(self.batch_size).collect();
        Batch::new(heights)
    }

    /// Flatten back to batches, ignoring chunk boundaries.
    pub fn batches(self) -> impl Iterator<Item = Batch> {
        self.flat_map(Chunk::into_batches)
    }
}

impl<I: Iterator<Item = Height>> Iterator for ChunkPlanner<I> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let mut batches = Vec::new();
        let mut total = 0;

        while total < self.chunk_size {
            let Some(batch) = self.carried.take().or_else(|| self.next_batch()) else {
                break;
            };
            if !batches.is_empty() && total + batch.len() > self.chunk_size {
                self.carried = Some(batch);
                break;
            }
            total += batch.len();
            batches.push(batch);
        }

        if batches.is_empty() {
            None
        } else {
            Some(Chunk::new(batches))
        }
    }
}
