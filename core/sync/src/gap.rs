// blockfill/core/sync/src/gap.rs

//! Missing-height detection.
//!
//! Persisted heights are streamed in ascending order through a [`GapScan`],
//! which records every discontinuity as a [`Gap`]. The frontier (everything
//! above the store maximum up to the remote tip) is appended when the scan
//! finishes. Nothing here performs I/O except [`GapDetector::detect_in`],
//! which pages heights out of a store.

use crate::config::SyncConfig;
use crate::types::Gap;
use crate::{Height, StoreStats};
use blockfill_storage::{BlockStore, StorageError};
use std::ops::ControlFlow;
use tracing::debug;

/// Knobs applied while collecting gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GapOptions {
    /// Keep at most this many gaps (ascending by start)
    pub limit: Option<usize>,
    /// Interior gaps longer than this are skipped
    pub max_gap_size: Option<u64>,
    /// Report `[start_height, min - 1]` when the store begins above it
    pub start_height: Option<Height>,
}

impl GapOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            limit: config.gap_limit,
            max_gap_size: config.max_gap_size,
            start_height: config.start_height,
        }
    }
}

/// Outcome of a detection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapReport {
    /// Gaps to sync, ascending and disjoint
    pub gaps: Vec<Gap>,
    /// Interior gaps left out because of `max_gap_size`
    pub skipped: Vec<Gap>,
    /// The gap limit was reached; more gaps may exist
    pub truncated: bool,
}

impl GapReport {
    /// Total heights covered by `gaps`
    pub fn missing_heights(&self) -> u64 {
        self.gaps
            .iter()
            .fold(0u64, |total, gap| total.saturating_add(gap.len()))
    }

    /// Every height in `gaps`, ascending. Lazy.
    pub fn heights(&self) -> impl Iterator<Item = Height> + '_ {
        self.gaps.iter().flat_map(Gap::heights)
    }
}

/// Streaming gap accumulator over a store snapshot.
#[derive(Debug)]
pub struct GapScan {
    stats: StoreStats,
    options: GapOptions,
    prev: Option<Height>,
    gaps: Vec<Gap>,
    skipped: Vec<Gap>,
}

impl GapScan {
    pub fn new(stats: StoreStats, options: GapOptions) -> Self {
        let mut scan = Self {
            stats,
            options,
            prev: None,
            gaps: Vec::new(),
            skipped: Vec::new(),
        };

        if let Some(start) = options.start_height {
            if !stats.is_empty() && stats.min > start {
                scan.accept(Gap::new(start, stats.min - 1), true);
            }
        }
        scan
    }

    /// Feed the next persisted height. Heights must arrive ascending;
    /// repeats and heights outside the snapshot's `[min, max]` are ignored.
    pub fn observe(&mut self, height: Height) -> ControlFlow<()> {
        if self.is_full() {
            return ControlFlow::Break(());
        }
        if self.stats.is_empty() || height < self.stats.min || height > self.stats.max {
            return ControlFlow::Continue(());
        }

        match self.prev {
            Some(prev) if height <= prev => return ControlFlow::Continue(()),
            Some(prev) if height > prev + 1 => self.accept(Gap::new(prev + 1, height - 1), false),
            _ => {}
        }
        self.prev = Some(height);

        if self.is_full() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Whether the gap limit has been reached.
    pub fn is_full(&self) -> bool {
        self.options
            .limit
            .map_or(false, |limit| self.gaps.len() >= limit)
    }

    fn accept(&mut self, gap: Gap, exempt: bool) {
        if !exempt {
            if let Some(max) = self.options.max_gap_size {
                if gap.len() > max {
                    debug!(%gap, max_gap_size = max, "Skipping oversized gap");
                    self.skipped.push(gap);
                    return;
                }
            }
        }
        if !self.is_full() {
            self.gaps.push(gap);
        }
    }

    /// Close the scan against the remote tip, appending the frontier gap
    /// (or the whole range for an empty store) if the limit allows.
    pub fn finish(mut self, target: Height) -> GapReport {
        if self.stats.is_empty() {
            let start = self.options.start_height.unwrap_or(0);
            if start <= target {
                self.accept(Gap::new(start, target), true);
            }
        } else if self.stats.max < target {
            self.accept(Gap::new(self.stats.max + 1, target), true);
        }

        GapReport {
            truncated: self.is_full(),
            gaps: self.gaps,
            skipped: self.skipped,
        }
    }
}

/// Pure detection over an in-memory height sequence.
pub fn detect(
    stats: StoreStats,
    heights: impl IntoIterator<Item = Height>,
    target: Height,
    options: GapOptions,
) -> GapReport {
    let mut scan = GapScan::new(stats, options);
    for height in heights {
        if scan.observe(height).is_break() {
            break;
        }
    }
    scan.finish(target)
}

/// Detection against a live store, reading persisted heights one window at
/// a time so memory stays proportional to `scan_window`.
#[derive(Debug, Clone)]
pub struct GapDetector {
    options: GapOptions,
    scan_window: u64,
}

impl GapDetector {
    pub fn new(options: GapOptions, scan_window: u64) -> Self {
        Self {
            options,
            scan_window: scan_window.max(1),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(GapOptions::from_config(config), config.scan_window)
    }

    pub fn detect_in<S: BlockStore + ?Sized>(
        &self,
        store: &S,
        target: Height,
    ) -> Result<GapReport, StorageError> {
        let stats = store.stats()?;
        let mut scan = GapScan::new(stats, self.options);

        if !stats.is_empty() {
            let mut cursor = stats.min;
            'pages: loop {
                let end = cursor.saturating_add(self.scan_window - 1).min(stats.max);
                for height in store.heights_in(cursor, end)? {
                    if scan.observe(height).is_break() {
                        break 'pages;
                    }
                }
                if end >= stats.max {
                    break;
                }
                cursor = end + 1;
            }
        }

        let report = scan.finish(target);
        debug!(
            %stats,
            target,
            gaps = report.gaps.len(),
            skipped = report.skipped.len(),
            missing = report.missing_heights(),
            "Gap detection complete"
        );
        Ok(report)
    }
}
