//! Error taxonomy.
//!
//! Every public operation returns a single typed error; nothing is retried
//! internally. Storage failures during a write are not rolled back, so a
//! failed write sequence can leave orphan chunks in the store; the partial
//! descriptor set held by the engine is enough to clean them up with
//! `delete_all`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::data_map::ChunkHash;
use crate::store::StoreError;

/// A caller handed the engine something it cannot act on.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("write of {length} bytes at offset {offset} overflows the offset space")]
    OffsetOverflow { offset: u64, length: u64 },

    #[error("range of {length} bytes at offset {offset} exceeds the stream size {total_size}")]
    OutOfRange {
        offset: u64,
        length: u64,
        total_size: u64,
    },

    #[error("the stream is sealed; no further writes are accepted")]
    AlreadyFinalised,

    #[error("the stream is not sealed yet; finalise it before reading")]
    NotFinalised,

    #[error("rewrite of [{start}, {end}) touches chunks that are already encrypted")]
    RewriteNotSupported { start: u64, end: u64 },

    #[error("chunk index {index} out of range for a map of {count} chunks")]
    ChunkIndexOutOfRange { index: usize, count: usize },
}

/// The chunk store failed or is missing data.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("chunk {index} ({key}) is missing from the store")]
    ChunkMissing { index: usize, key: ChunkHash },

    #[error("fetching chunk {index} failed: {source}")]
    StoreGetFailed {
        index: usize,
        #[source]
        source: StoreError,
    },

    #[error("storing chunk {index} failed: {source}")]
    StorePutFailed {
        index: usize,
        #[source]
        source: StoreError,
    },

    #[error("deleting chunk {index} failed: {source}")]
    StoreDeleteFailed {
        index: usize,
        #[source]
        source: StoreError,
    },

    #[error("chunk {index} was never committed after an earlier store failure")]
    ChunkNotCommitted { index: usize },
}

/// Stored or decrypted bytes do not match the hashes in the data map.
///
/// Integrity failures are never retried; they mean the store returned bytes
/// that are not the bytes the map was built from.
#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("chunk {index}: stored blob does not hash to the recorded post-hash")]
    PostHashMismatch { index: usize },

    #[error("chunk {index}: decrypted bytes do not hash to the recorded pre-hash")]
    PreHashMismatch { index: usize },
}

/// Top-level error for every engine operation.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("invalid engine configuration: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hashing;

    #[test]
    fn messages_name_the_offending_range() {
        let err = InputError::OutOfRange {
            offset: 10,
            length: 20,
            total_size: 15,
        };
        let shown = err.to_string();
        assert!(shown.contains("10"));
        assert!(shown.contains("20"));
        assert!(shown.contains("15"));
    }

    #[test]
    fn storage_errors_carry_the_store_key() {
        let key = hashing::hash(b"gone");
        let err: Error = StorageError::ChunkMissing { index: 3, key }.into();
        assert!(err.to_string().contains(&key.to_string()));
    }
}
