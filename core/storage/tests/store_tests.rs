// Behavioural tests shared by both store implementations

use blockfill_storage::{BlockPayload, BlockStore, MemoryStore, RocksBlockStore, StoreStats};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;

fn payload(height: u64) -> BlockPayload {
    BlockPayload::from(format!("{{\"height\":{}}}", height).into_bytes())
}

fn exercise_store(store: &dyn BlockStore) {
    assert!(store.stats().unwrap().is_empty());
    assert!(!store.exists(5).unwrap());

    for h in [0, 1, 2, 5, 6, 9] {
        store.write(h, &payload(h)).unwrap();
    }

    assert_eq!(
        store.stats().unwrap(),
        StoreStats {
            min: 0,
            max: 9,
            count: 6
        }
    );
    assert!(store.exists(5).unwrap());
    assert!(!store.exists(3).unwrap());
    assert_eq!(store.read(6).unwrap(), Some(payload(6)));
    assert_eq!(store.read(7).unwrap(), None);
    assert_eq!(store.heights_in(1, 6).unwrap(), vec![1, 2, 5, 6]);
    assert_eq!(store.heights_in(10, 20).unwrap(), Vec::<u64>::new());
}

fn exercise_idempotent_write(store: &dyn BlockStore) {
    store.write(100, &payload(100)).unwrap();
    let after_first = store.stats().unwrap();

    store.write(100, &payload(100)).unwrap();
    let after_second = store.stats().unwrap();

    assert_eq!(after_first.count, 1);
    assert_eq!(after_first, after_second);
}

#[cfg(test)]
mod memory_store_tests {
    use super::*;

    #[test]
    fn test_memory_store_contract() {
        exercise_store(&MemoryStore::new());
    }

    #[test]
    fn test_memory_store_idempotent_write() {
        exercise_idempotent_write(&MemoryStore::new());
    }
}

#[cfg(test)]
mod rocks_store_tests {
    use super::*;

    #[test]
    fn test_rocks_store_contract() {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksBlockStore::open(temp_dir.path()).expect("Failed to open store");
        exercise_store(&store);
    }

    #[test]
    fn test_rocks_store_idempotent_write() {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksBlockStore::open(temp_dir.path()).expect("Failed to open store");
        exercise_idempotent_write(&store);
    }

    #[test]
    fn test_concurrent_writers_same_height() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(RocksBlockStore::open(temp_dir.path()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for h in 0..50u64 {
                        store.write(h, &payload(h)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = store.stats().unwrap();
        assert_eq!(stats.count, 50);
        assert_eq!(stats.min, 0);
        assert_eq!(stats.max, 49);
    }
}

proptest! {
    #[test]
    fn prop_memory_stats_match_written_set(heights in proptest::collection::vec(0u64..500, 0..200)) {
        let store = MemoryStore::new();
        for &h in &heights {
            store.write(h, &payload(h)).unwrap();
        }
        let unique: BTreeSet<u64> = heights.iter().copied().collect();
        let stats = store.stats().unwrap();

        prop_assert_eq!(stats.count, unique.len() as u64);
        if let (Some(min), Some(max)) = (unique.first(), unique.last()) {
            prop_assert_eq!(stats.min, *min);
            prop_assert_eq!(stats.max, *max);
        }
        prop_assert_eq!(store.heights_in(0, 500).unwrap(), unique.into_iter().collect::<Vec<_>>());
    }
}
