// blockfill/core/sync/src/metrics.rs

//! Metric names and recording helpers for the sync pipeline.
//!
//! Recording goes through the `metrics` facade; without an installed
//! recorder every call is a no-op.

use crate::executor::JobOutcome;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

pub const METRIC_PASSES_TOTAL: &str = "blockfill_passes_total";
pub const METRIC_TARGET_HEIGHT: &str = "blockfill_target_height";
pub const METRIC_MISSING_HEIGHTS: &str = "blockfill_missing_heights";
pub const METRIC_HEIGHTS_SCHEDULED_TOTAL: &str = "blockfill_heights_scheduled_total";
pub const METRIC_CHUNKS_ADMITTED_TOTAL: &str = "blockfill_chunks_admitted_total";
pub const METRIC_QUEUE_DEPTH: &str = "blockfill_queue_depth";
pub const METRIC_BACKPRESSURE_WAIT: &str = "blockfill_backpressure_wait_seconds";
pub const METRIC_QUEUE_UNREACHABLE_TOTAL: &str = "blockfill_queue_unreachable_total";
pub const METRIC_JOBS_TOTAL: &str = "blockfill_jobs_total";
pub const METRIC_HEIGHTS_PERSISTED_TOTAL: &str = "blockfill_heights_persisted_total";
pub const METRIC_HEIGHTS_FAILED_TOTAL: &str = "blockfill_heights_failed_total";
pub const METRIC_BATCH_DURATION: &str = "blockfill_batch_duration_seconds";
pub const METRIC_FETCH_DURATION: &str = "blockfill_fetch_duration_seconds";
pub const METRIC_FETCH_FALLBACK_TOTAL: &str = "blockfill_fetch_fallback_total";

pub fn record_pass_plan(target: u64, missing: u64) {
    gauge!(METRIC_TARGET_HEIGHT, target as f64);
    gauge!(METRIC_MISSING_HEIGHTS, missing as f64);
}

pub fn record_pass_finished(outcome: &'static str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(METRIC_PASSES_TOTAL, 1, &labels);
}

pub fn record_chunk_admitted(heights: usize, waited: Duration) {
    counter!(METRIC_CHUNKS_ADMITTED_TOTAL, 1);
    counter!(METRIC_HEIGHTS_SCHEDULED_TOTAL, heights as u64);
    histogram!(METRIC_BACKPRESSURE_WAIT, waited.as_secs_f64());
}

pub fn record_queue_depth(depth: usize) {
    gauge!(METRIC_QUEUE_DEPTH, depth as f64);
}

pub fn record_queue_unreachable() {
    counter!(METRIC_QUEUE_UNREACHABLE_TOTAL, 1);
}

pub fn record_job(outcome: JobOutcome, persisted: usize, failed: usize, elapsed: Duration) {
    let labels = [("outcome", outcome.as_str().to_string())];
    counter!(METRIC_JOBS_TOTAL, 1, &labels);
    counter!(METRIC_HEIGHTS_PERSISTED_TOTAL, persisted as u64);
    counter!(METRIC_HEIGHTS_FAILED_TOTAL, failed as u64);
    histogram!(METRIC_BATCH_DURATION, elapsed.as_secs_f64());
}

pub fn record_fetch(ok: bool, elapsed: Duration) {
    let labels = [("result", if ok { "ok" } else { "error" }.to_string())];
    histogram!(METRIC_FETCH_DURATION, elapsed.as_secs_f64(), &labels);
}

pub fn record_fetch_fallback(heights: usize) {
    counter!(METRIC_FETCH_FALLBACK_TOTAL, heights as u64);
}
