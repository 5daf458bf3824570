// blockfill/core/storage/src/db/rocks_db.rs

use super::column_families::*;
use crate::{BlockPayload, BlockStore, Height, StorageError, StoreStats};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use tracing::{debug, info};

/// RocksDB-backed block store.
///
/// The persisted count lives in the metadata column family and is updated in
/// the same write batch as the payload, only when the height is new.
pub struct RocksBlockStore {
    db: DB,
    /// Serializes the exists-check + count update of concurrent writers.
    count: Mutex<u64>,
}

impl RocksBlockStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;
        let store = Self {
            db,
            count: Mutex::new(0),
        };

        let count = match store.load_count()? {
            Some(count) => count,
            None => store.recount()?,
        };
        *store.count.lock() = count;

        info!("Opened block store at {} with {} blocks", path.display(), count);
        Ok(store)
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    fn load_count(&self) -> Result<Option<u64>, StorageError> {
        let meta = self.cf(CF_METADATA)?;
        match self.db.get_cf(meta, META_COUNT_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StorageError::CorruptMetadata("count"))?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Rebuild the persisted count from the blocks column family.
    fn recount(&self) -> Result<u64, StorageError> {
        let blocks = self.cf(CF_BLOCKS)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(blocks, IteratorMode::Start) {
            item?;
            count += 1;
        }
        self.db
            .put_cf(self.cf(CF_METADATA)?, META_COUNT_KEY, count.to_be_bytes())?;
        debug!("Recounted {} persisted blocks", count);
        Ok(count)
    }

    fn edge_height(&self, mode: IteratorMode) -> Result<Option<Height>, StorageError> {
        let blocks = self.cf(CF_BLOCKS)?;
        match self.db.iterator_cf(blocks, mode).next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(Some(decode_height(&key)?))
            }
            None => Ok(None),
        }
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush_cf(self.cf(CF_BLOCKS)?)?;
        self.db.flush_cf(self.cf(CF_METADATA)?)?;
        Ok(())
    }
}

impl BlockStore for RocksBlockStore {
    fn exists(&self, height: Height) -> Result<bool, StorageError> {
        let blocks = self.cf(CF_BLOCKS)?;
        Ok(self.db.get_pinned_cf(blocks, height_key(height))?.is_some())
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        let count = *self.count.lock();
        if count == 0 {
            return Ok(StoreStats::empty());
        }
        let min = self.edge_height(IteratorMode::Start)?;
        let max = self.edge_height(IteratorMode::End)?;
        match (min, max) {
            (Some(min), Some(max)) => Ok(StoreStats { min, max, count }),
            _ => Ok(StoreStats::empty()),
        }
    }

    fn write(&self, height: Height, payload: &BlockPayload) -> Result<(), StorageError> {
        let blocks = self.cf(CF_BLOCKS)?;
        let meta = self.cf(CF_METADATA)?;
        let key = height_key(height);

        let mut count = self.count.lock();
        let is_new = self.db.get_pinned_cf(blocks, key)?.is_none();

        let mut batch = WriteBatch::default();
        batch.put_cf(blocks, key, payload.as_bytes());
        if is_new {
            batch.put_cf(meta, META_COUNT_KEY, (*count + 1).to_be_bytes());
        }
        self.db.write(batch)?;

        if is_new {
            *count += 1;
        }
        debug!(height, bytes = payload.len(), is_new, "Stored block");
        Ok(())
    }

    fn read(&self, height: Height) -> Result<Option<BlockPayload>, StorageError> {
        let blocks = self.cf(CF_BLOCKS)?;
        Ok(self
            .db
            .get_cf(blocks, height_key(height))?
            .map(BlockPayload::from))
    }

    fn heights_in(&self, start: Height, end: Height) -> Result<Vec<Height>, StorageError> {
        if start > end {
            return Ok(Vec::new());
        }
        let blocks = self.cf(CF_BLOCKS)?;
        let from = height_key(start);
        let mut heights = Vec::new();
        for item in self
            .db
            .iterator_cf(blocks, IteratorMode::From(&from[..], Direction::Forward))
        {
            let (key, _) = item?;
            let height = decode_height(&key)?;
            if height > end {
                break;
            }
            heights.push(height);
        }
        Ok(heights)
    }
}

fn decode_height(key: &[u8]) -> Result<Height, StorageError> {
    let raw: [u8; 8] = key.try_into().map_err(|_| StorageError::CorruptKey {
        cf: CF_BLOCKS,
        len: key.len(),
    })?;
    Ok(u64::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_decode_height_rejects_short_keys() {
        assert!(matches!(
            decode_height(&[1, 2, 3]),
            Err(StorageError::CorruptKey { len: 3, .. })
        ));
        assert_eq!(decode_height(&height_key(42)).unwrap(), 42);
    }

    #[test]
    fn test_key_order_matches_height_order() {
        assert!(height_key(255) < height_key(256));
        assert!(height_key(0) < height_key(u64::MAX));
    }

    #[test]
    fn test_count_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = RocksBlockStore::open(temp_dir.path()).unwrap();
            for h in [3, 4, 10] {
                store.write(h, &BlockPayload::from("block")).unwrap();
            }
            store.flush().unwrap();
        }

        let store = RocksBlockStore::open(temp_dir.path()).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats, StoreStats { min: 3, max: 10, count: 3 });
    }
}
