// blockfill/core/storage/src/db/column_families.rs

/// Block payloads keyed by big-endian height
pub const CF_BLOCKS: &str = "blocks";

/// Store bookkeeping (persisted count)
pub const CF_METADATA: &str = "metadata";

pub const META_COUNT_KEY: &[u8] = b"count";

pub fn all_column_families() -> Vec<&'static str> {
    vec![CF_BLOCKS, CF_METADATA]
}

/// Big-endian so lexicographic key order equals height order.
pub fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}
