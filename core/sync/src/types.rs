// blockfill/core/sync/src/types.rs

use crate::Height;
use std::fmt;
use std::ops::RangeInclusive;

/// Inclusive range of heights missing from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Gap {
    pub start: Height,
    pub end: Height,
}

impl Gap {
    pub fn new(start: Height, end: Height) -> Self {
        debug_assert!(start <= end, "gap start {} after end {}", start, end);
        Self { start, end }
    }

    /// Number of heights in the gap. `[0, u64::MAX]` saturates.
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    pub fn heights(&self) -> RangeInclusive<Height> {
        self.start..=self.end
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Non-empty, ordered group of heights fetched as one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch(Vec<Height>);

impl Batch {
    /// `None` for an empty height list.
    pub fn new(heights: Vec<Height>) -> Option<Self> {
        if heights.is_empty() {
            None
        } else {
            Some(Self(heights))
        }
    }

    pub fn heights(&self) -> &[Height] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Height {
        self.0[0]
    }

    pub fn last(&self) -> Height {
        self.0[self.0.len() - 1]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Height> {
        self.0.iter()
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{} ({} heights)", self.first(), self.last(), self.len())
    }
}

/// Admission unit: consecutive batches admitted to the queue together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    batches: Vec<Batch>,
}

impl Chunk {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches }
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<Batch> {
        self.batches
    }

    /// Total heights across all batches
    pub fn total_heights(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }
}

/// One batch plus its attempt counter. Attempts start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub id: u64,
    pub batch: Batch,
    pub attempt: u32,
}

impl SyncJob {
    pub fn new(id: u64, batch: Batch) -> Self {
        Self {
            id,
            batch,
            attempt: 1,
        }
    }

    /// The same batch, one attempt later.
    pub fn next_attempt(&self) -> Self {
        Self {
            id: self.id,
            batch: self.batch.clone(),
            attempt: self.attempt + 1,
        }
    }
}
