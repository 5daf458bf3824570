use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Column family not found: {0}")]
    MissingColumnFamily(&'static str),

    #[error("Corrupt key in {cf}: expected 8 bytes, found {len}")]
    CorruptKey { cf: &'static str, len: usize },

    #[error("Corrupt metadata value for {0}")]
    CorruptMetadata(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
