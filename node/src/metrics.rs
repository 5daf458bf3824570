//! Prometheus exporter
//!
//! The sync crate records through the `metrics` facade; this module installs
//! the Prometheus recorder, registers HELP text for every metric, and adds
//! the few node-level series (start time, store contents, pass latency).

use blockfill_primitives::StoreStats;
use blockfill_sync::metrics as sync;
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Instant;

/// Address the exporter was installed on
static METRICS_ADDR: OnceCell<SocketAddr> = OnceCell::new();

pub const METRIC_NODE_START_TIME: &str = "blockfill_node_start_time_seconds";
pub const METRIC_STORE_MIN_HEIGHT: &str = "blockfill_store_min_height";
pub const METRIC_STORE_MAX_HEIGHT: &str = "blockfill_store_max_height";
pub const METRIC_STORE_BLOCKS: &str = "blockfill_store_blocks";
pub const METRIC_PASS_DURATION: &str = "blockfill_pass_duration_seconds";

/// Install the Prometheus recorder and start its HTTP listener.
///
/// Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    if let Some(existing) = METRICS_ADDR.get() {
        anyhow::bail!("Metrics already initialized on {}", existing);
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;
    let _ = METRICS_ADDR.set(addr);

    register_metric_descriptions();

    let start_time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    gauge!(METRIC_NODE_START_TIME, start_time);

    tracing::info!("Metrics server started on http://{}/metrics", addr);
    Ok(())
}

fn register_metric_descriptions() {
    // Node
    describe_gauge!(
        METRIC_NODE_START_TIME,
        Unit::Seconds,
        "Unix timestamp when the node started"
    );
    describe_gauge!(METRIC_STORE_MIN_HEIGHT, "Lowest persisted height");
    describe_gauge!(METRIC_STORE_MAX_HEIGHT, "Highest persisted height");
    describe_gauge!(METRIC_STORE_BLOCKS, "Number of persisted blocks");
    describe_histogram!(
        METRIC_PASS_DURATION,
        Unit::Seconds,
        "Time to detect, plan and admit one sync pass"
    );

    // Sync passes
    describe_counter!(sync::METRIC_PASSES_TOTAL, "Sync passes by outcome");
    describe_gauge!(sync::METRIC_TARGET_HEIGHT, "Remote tip seen by the last pass");
    describe_gauge!(
        sync::METRIC_MISSING_HEIGHTS,
        "Heights selected for scheduling by the last pass"
    );
    describe_counter!(
        sync::METRIC_HEIGHTS_SCHEDULED_TOTAL,
        "Heights submitted to the job queue"
    );
    describe_counter!(
        sync::METRIC_CHUNKS_ADMITTED_TOTAL,
        "Chunks admitted past backpressure"
    );

    // Backpressure
    describe_gauge!(sync::METRIC_QUEUE_DEPTH, "Last observed job queue depth");
    describe_histogram!(
        sync::METRIC_BACKPRESSURE_WAIT,
        Unit::Seconds,
        "Time a chunk waited for admission"
    );
    describe_counter!(
        sync::METRIC_QUEUE_UNREACHABLE_TOTAL,
        "Queue depth observations that failed"
    );

    // Jobs
    describe_counter!(sync::METRIC_JOBS_TOTAL, "Batch executions by outcome");
    describe_counter!(
        sync::METRIC_HEIGHTS_PERSISTED_TOTAL,
        "Heights fetched and written"
    );
    describe_counter!(
        sync::METRIC_HEIGHTS_FAILED_TOTAL,
        "Heights that failed to fetch or write"
    );
    describe_histogram!(
        sync::METRIC_BATCH_DURATION,
        Unit::Seconds,
        "Time to execute one batch"
    );
    describe_histogram!(
        sync::METRIC_FETCH_DURATION,
        Unit::Seconds,
        "Single block retrieval latency"
    );
    describe_counter!(
        sync::METRIC_FETCH_FALLBACK_TOTAL,
        "Heights refetched sequentially after a lost retrieval task"
    );
}

pub fn record_store_stats(stats: &StoreStats) {
    gauge!(METRIC_STORE_BLOCKS, stats.count as f64);
    if !stats.is_empty() {
        gauge!(METRIC_STORE_MIN_HEIGHT, stats.min as f64);
        gauge!(METRIC_STORE_MAX_HEIGHT, stats.max as f64);
    }
}

/// A timer that records its lifetime into a histogram when dropped.
pub struct MetricsTimer {
    metric_name: &'static str,
    start: Instant,
}

impl MetricsTimer {
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            metric_name,
            start: Instant::now(),
        }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name, self.start.elapsed().as_secs_f64());
    }
}
