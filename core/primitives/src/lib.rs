// blockfill/core/primitives/src/lib.rs

//! Shared value types for the block ingestion pipeline.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a block in the chain. Genesis is height 0.
pub type Height = u64;

/// Opaque block data as returned by the remote node.
///
/// The payload is never inspected by the pipeline; it is fetched, handed to
/// the store, and dropped. Cloning is cheap (reference counted).
#[derive(Clone, PartialEq, Eq, Default)]
pub struct BlockPayload(Bytes);

impl BlockPayload {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for BlockPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static str> for BlockPayload {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl fmt::Debug for BlockPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockPayload({} bytes)", self.0.len())
    }
}

/// Snapshot of what a store holds: lowest height, highest height, and the
/// number of persisted heights. `min` and `max` are meaningless when `count`
/// is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub min: Height,
    pub max: Height,
    pub count: u64,
}

impl StoreStats {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of heights between `min` and `max` that are not persisted.
    pub fn interior_missing(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        (self.max - self.min)
            .saturating_add(1)
            .saturating_sub(self.count)
    }
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "empty")
        } else {
            write!(f, "min={} max={} count={}", self.min, self.max, self.count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_debug_hides_contents() {
        let payload = BlockPayload::from(vec![1, 2, 3]);
        assert_eq!(format!("{:?}", payload), "BlockPayload(3 bytes)");
        assert_eq!(payload.len(), 3);
    }

    #[test]
    fn test_interior_missing() {
        let stats = StoreStats { min: 0, max: 9, count: 6 };
        assert_eq!(stats.interior_missing(), 4);
        assert_eq!(StoreStats::empty().interior_missing(), 0);
        let full_range = StoreStats { min: 0, max: Height::MAX, count: 2 };
        assert_eq!(full_range.interior_missing(), u64::MAX - 2);
    }
}
