// blockfill/core/storage/src/memory.rs

use crate::{BlockPayload, BlockStore, Height, StorageError, StoreStats};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-memory store. Heights are kept ordered so stats and range scans are
/// cheap.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<BTreeMap<Height, BlockPayload>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with an empty-ish payload at each height.
    pub fn with_heights(heights: impl IntoIterator<Item = Height>) -> Self {
        let blocks = heights
            .into_iter()
            .map(|h| (h, BlockPayload::from(h.to_be_bytes().to_vec())))
            .collect();
        Self {
            blocks: RwLock::new(blocks),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    pub fn heights(&self) -> Vec<Height> {
        self.blocks.read().keys().copied().collect()
    }
}

impl BlockStore for MemoryStore {
    fn exists(&self, height: Height) -> Result<bool, StorageError> {
        Ok(self.blocks.read().contains_key(&height))
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        let blocks = self.blocks.read();
        let (Some((&min, _)), Some((&max, _))) = (blocks.first_key_value(), blocks.last_key_value())
        else {
            return Ok(StoreStats::empty());
        };
        Ok(StoreStats {
            min,
            max,
            count: blocks.len() as u64,
        })
    }

    fn write(&self, height: Height, payload: &BlockPayload) -> Result<(), StorageError> {
        self.blocks.write().insert(height, payload.clone());
        Ok(())
    }

    fn read(&self, height: Height) -> Result<Option<BlockPayload>, StorageError> {
        Ok(self.blocks.read().get(&height).cloned())
    }

    fn heights_in(&self, start: Height, end: Height) -> Result<Vec<Height>, StorageError> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self.blocks.read().range(start..=end).map(|(h, _)| *h).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats() {
        let store = MemoryStore::new();
        assert!(store.stats().unwrap().is_empty());
    }

    #[test]
    fn test_rewrite_is_upsert() {
        let store = MemoryStore::new();
        store.write(7, &BlockPayload::from("a")).unwrap();
        store.write(7, &BlockPayload::from("b")).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(store.read(7).unwrap(), Some(BlockPayload::from("b")));
    }

    #[test]
    fn test_heights_in_range() {
        let store = MemoryStore::with_heights([0, 1, 2, 5, 6, 9]);
        assert_eq!(store.heights_in(2, 6).unwrap(), vec![2, 5, 6]);
        assert!(store.heights_in(6, 2).unwrap().is_empty());
    }
}
