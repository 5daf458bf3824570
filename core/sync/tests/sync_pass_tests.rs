//! End-to-end passes over an in-memory store, a scripted node and the
//! in-process job queue.

use async_trait::async_trait;
use blockfill_rpc::{BlockSource, RpcError};
use blockfill_storage::{BlockStore, MemoryStore};
use blockfill_sync::{
    BackoffPolicy, BlockPayload, CancellationToken, Height, JobExecutor, JobQueue, QueueConfig,
    SyncConfig, SyncScheduler,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Node with a fixed tip whose listed heights fail until healed.
struct ScriptedNode {
    tip: Height,
    broken: Mutex<HashSet<Height>>,
}

impl ScriptedNode {
    fn new(tip: Height, broken: impl IntoIterator<Item = Height>) -> Arc<Self> {
        Arc::new(Self {
            tip,
            broken: Mutex::new(broken.into_iter().collect()),
        })
    }

    fn heal(&self) {
        self.broken.lock().clear();
    }
}

#[async_trait]
impl BlockSource for ScriptedNode {
    async fn latest_height(&self) -> Result<Height, RpcError> {
        Ok(self.tip)
    }

    async fn fetch_block(&self, height: Height) -> Result<BlockPayload, RpcError> {
        if self.broken.lock().contains(&height) {
            return Err(RpcError::Remote {
                code: -32000,
                message: format!("block {height} unavailable"),
            });
        }
        Ok(BlockPayload::from(format!("block-{height}").into_bytes()))
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    queue: Arc<JobQueue>,
    scheduler: SyncScheduler<MemoryStore, ScriptedNode, JobQueue>,
}

fn harness(store: MemoryStore, node: Arc<ScriptedNode>, config: SyncConfig) -> Harness {
    let store = Arc::new(store);
    let executor = JobExecutor::new(Arc::clone(&store), Arc::clone(&node), &config);
    let queue = Arc::new(JobQueue::start(
        Arc::new(executor),
        &QueueConfig {
            workers: 2,
            capacity: 16,
        },
        config.retry_backoff.clone(),
    ));
    let scheduler = SyncScheduler::new(Arc::clone(&store), node, Arc::clone(&queue), config)
        .expect("valid config");
    Harness {
        store,
        queue,
        scheduler,
    }
}

fn small_config() -> SyncConfig {
    SyncConfig {
        batch_size: 4,
        chunk_size: 8,
        queue_threshold: 2,
        retry_backoff: BackoffPolicy::Constant { delay_secs: 5 },
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_fresh_store_fills_to_tip() {
    let h = harness(MemoryStore::new(), ScriptedNode::new(10, Vec::<Height>::new()), small_config());
    let cancel = CancellationToken::new();

    let summary = h.scheduler.run_pass(&cancel).await.unwrap();
    assert_eq!(summary.heights_scheduled, 11);
    h.queue.drain().await;

    assert_eq!(h.store.heights(), (0..=10).collect::<Vec<_>>());
    let stored = h.store.read(7).unwrap().unwrap();
    assert_eq!(stored.as_bytes(), b"block-7");

    let again = h.scheduler.run_pass(&cancel).await.unwrap();
    assert_eq!(again.heights_scheduled, 0);
    h.queue.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_interior_gaps_filled() {
    let store = MemoryStore::with_heights([0, 1, 2, 5, 6, 9]);
    let h = harness(store, ScriptedNode::new(9, Vec::<Height>::new()), small_config());

    let summary = h.scheduler.run_pass(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.gaps, 2);
    assert_eq!(summary.heights_scheduled, 4);
    h.queue.drain().await;

    let stats = h.store.stats().unwrap();
    assert_eq!((stats.min, stats.max, stats.count), (0, 9, 10));
    h.queue.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_partial_failures_rediscovered_next_pass() {
    let node = ScriptedNode::new(7, [2]);
    let h = harness(MemoryStore::new(), Arc::clone(&node), small_config());
    let cancel = CancellationToken::new();

    h.scheduler.run_pass(&cancel).await.unwrap();
    h.queue.drain().await;

    assert!(!h.store.exists(2).unwrap());
    assert_eq!(h.queue.stats().partial, 1);
    assert_eq!(h.queue.stats().retried, 0);

    node.heal();
    let summary = h.scheduler.run_pass(&cancel).await.unwrap();
    assert_eq!(summary.heights_scheduled, 1);
    h.queue.drain().await;

    assert_eq!(h.store.stats().unwrap().count, 8);
    h.queue.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_majority_failure_bounded_by_max_attempts() {
    let node = ScriptedNode::new(3, [0, 1, 2]);
    let h = harness(MemoryStore::new(), node, small_config());

    h.scheduler.run_pass(&CancellationToken::new()).await.unwrap();
    h.queue.drain().await;

    let stats = h.queue.stats();
    assert_eq!(stats.executions(), 3);
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.terminal, 1);
    assert_eq!(h.store.heights(), vec![3]);
    h.queue.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_gap_limit_and_max_gap_size() {
    let store = MemoryStore::with_heights([0, 2, 100, 101, 103]);
    let config = SyncConfig {
        max_gap_size: Some(10),
        gap_limit: Some(2),
        ..small_config()
    };
    let h = harness(store, ScriptedNode::new(200, Vec::<Height>::new()), config);

    let summary = h.scheduler.run_pass(&CancellationToken::new()).await.unwrap();
    h.queue.drain().await;

    assert_eq!(summary.skipped_gaps.len(), 1);
    assert_eq!((summary.skipped_gaps[0].start, summary.skipped_gaps[0].end), (3, 99));
    assert!(summary.truncated);
    assert_eq!(summary.gaps, 2);
    assert!(h.store.exists(1).unwrap());
    assert!(h.store.exists(102).unwrap());
    assert!(!h.store.exists(150).unwrap());
    h.queue.shutdown().await;
}

/// Node that takes 20 seconds per block and counts requests per height.
struct SlowNode {
    tip: Height,
    fetches: Mutex<HashMap<Height, usize>>,
}

#[async_trait]
impl BlockSource for SlowNode {
    async fn latest_height(&self) -> Result<Height, RpcError> {
        Ok(self.tip)
    }

    async fn fetch_block(&self, height: Height) -> Result<BlockPayload, RpcError> {
        *self.fetches.lock().entry(height).or_default() += 1;
        tokio::time::sleep(Duration::from_secs(20)).await;
        Ok(BlockPayload::from(height.to_be_bytes().to_vec()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_follow_does_not_refetch_in_flight_heights() {
    let node = Arc::new(SlowNode {
        tip: 9,
        fetches: Mutex::new(HashMap::new()),
    });
    let config = SyncConfig {
        batch_size: 5,
        chunk_size: 5,
        queue_threshold: 2,
        ..Default::default()
    };
    let store = Arc::new(MemoryStore::new());
    let executor = JobExecutor::new(Arc::clone(&store), Arc::clone(&node), &config);
    let queue = Arc::new(JobQueue::start(
        Arc::new(executor),
        &QueueConfig {
            workers: 1,
            capacity: 16,
        },
        config.retry_backoff.clone(),
    ));
    let scheduler =
        SyncScheduler::new(Arc::clone(&store), Arc::clone(&node), Arc::clone(&queue), config)
            .expect("valid config");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(100)).await;
        trigger.cancel();
    });
    scheduler.follow(&cancel).await.unwrap();

    assert_eq!(store.heights(), (0..=9).collect::<Vec<_>>());
    let fetches = node.fetches.lock().clone();
    assert_eq!(fetches.len(), 10);
    assert!(fetches.values().all(|n| *n == 1), "refetched: {fetches:?}");
    assert_eq!(queue.stats().succeeded, 2);
    queue.shutdown().await;
}
