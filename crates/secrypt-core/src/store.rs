//! The content-addressed chunk store contract.
//!
//! The store is the engine's only I/O boundary. It is keyed by the SHA-512 of
//! the encrypted chunk, which makes `put` naturally idempotent: writing the
//! same key with the same bytes is a success whether or not the blob was
//! already present. The engine makes no assumptions about locality,
//! replication or durability beyond the three operations below.

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use thiserror::Error;

use crate::data_map::ChunkHash;

/// Failure inside a store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failure: {0}")]
    Io(#[from] io::Error),
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Result of a `put`: both variants are success.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// The key was already present with identical content (dedup hit).
    AlreadyStored,
}

/// Result of a `delete`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// An opaque content-addressed blob store.
///
/// Implementations must tolerate concurrent calls from multiple worker
/// threads; the engine issues `put` and `get` from its worker pool.
pub trait ChunkStore: Send + Sync {
    /// Store `blob` under `key`. Idempotent for identical content.
    fn put(&self, key: &ChunkHash, blob: &[u8]) -> Result<PutOutcome, StoreError>;

    /// Fetch the blob stored under `key`, if any.
    fn get(&self, key: &ChunkHash) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove the blob stored under `key`.
    fn delete(&self, key: &ChunkHash) -> Result<DeleteOutcome, StoreError>;
}

/// Reference in-memory store used by tests, docs and benches.
#[derive(Default)]
pub struct MemoryChunkStore {
    blobs: Mutex<HashMap<ChunkHash, Vec<u8>>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs held.
    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ChunkHash) -> bool {
        self.blobs
            .lock()
            .map(|blobs| blobs.contains_key(key))
            .unwrap_or(false)
    }

    /// Mutate a stored blob in place. Returns `false` if the key is absent.
    ///
    /// Test harness hook for simulating at-rest corruption.
    pub fn corrupt(&self, key: &ChunkHash, mutate: impl FnOnce(&mut Vec<u8>)) -> bool {
        let Ok(mut blobs) = self.blobs.lock() else {
            return false;
        };
        match blobs.get_mut(key) {
            Some(blob) => {
                mutate(blob);
                true
            }
            None => false,
        }
    }
}

impl ChunkStore for MemoryChunkStore {
    fn put(&self, key: &ChunkHash, blob: &[u8]) -> Result<PutOutcome, StoreError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_owned()))?;
        if blobs.contains_key(key) {
            return Ok(PutOutcome::AlreadyStored);
        }
        blobs.insert(*key, blob.to_vec());
        Ok(PutOutcome::Stored)
    }

    fn get(&self, key: &ChunkHash) -> Result<Option<Vec<u8>>, StoreError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_owned()))?;
        Ok(blobs.get(key).cloned())
    }

    fn delete(&self, key: &ChunkHash) -> Result<DeleteOutcome, StoreError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_owned()))?;
        match blobs.remove(key) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hashing;

    #[test]
    fn put_get_delete_cycle() {
        let store = MemoryChunkStore::new();
        let key = hashing::hash(b"blob");

        assert_eq!(store.put(&key, b"blob").unwrap(), PutOutcome::Stored);
        assert_eq!(store.get(&key).unwrap().as_deref(), Some(&b"blob"[..]));
        assert_eq!(store.delete(&key).unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.get(&key).unwrap(), None);
        assert_eq!(store.delete(&key).unwrap(), DeleteOutcome::NotFound);
    }

    #[test]
    fn repeated_put_is_a_dedup_hit() {
        let store = MemoryChunkStore::new();
        let key = hashing::hash(b"shared");

        assert_eq!(store.put(&key, b"shared").unwrap(), PutOutcome::Stored);
        assert_eq!(
            store.put(&key, b"shared").unwrap(),
            PutOutcome::AlreadyStored
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn corrupt_mutates_in_place() {
        let store = MemoryChunkStore::new();
        let key = hashing::hash(b"fragile");
        store.put(&key, &[1, 2, 3]).unwrap();

        assert!(store.corrupt(&key, |blob| blob[1] ^= 0xFF));
        assert_eq!(store.get(&key).unwrap(), Some(vec![1, 2 ^ 0xFF, 3]));

        let absent = hashing::hash(b"absent");
        assert!(!store.corrupt(&absent, |_| {}));
    }
}
