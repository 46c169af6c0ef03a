//! Convergent self-encryption of byte streams.
//!
//! An arbitrary byte stream is cut into (nominally) equal chunks, each chunk
//! is encrypted with material derived from the plaintext hashes of its
//! neighbours, and the results are stored in a content-addressed
//! [`ChunkStore`] keyed by the ciphertext hash. The only artefact the caller
//! keeps is the [`DataMap`]: chunk descriptors in stream order plus any
//! trailing bytes too small to chunk.
//!
//! Because every key is derived from the plaintext itself, identical streams
//! produce identical chunk sets wherever they are encrypted, so duplicate
//! data deduplicates across users, while a party without the data map cannot
//! decrypt any chunk.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use secrypt_core::{EngineConfig, MemoryChunkStore, SelfEncryptor};
//!
//! let store = Arc::new(MemoryChunkStore::new());
//!
//! let mut engine = SelfEncryptor::new(store.clone(), EngineConfig::default()).unwrap();
//! let data: Vec<u8> = (0..4000u32).map(|i| (i % 256) as u8).collect();
//! engine.write(&data, 0).unwrap();
//! let map = engine.finalise().unwrap();
//!
//! // Streams of at least three minimum-size chunks are chunked...
//! assert_eq!(map.chunks().len(), 3);
//! assert_eq!(map.total_size(), 4000);
//!
//! // ...and the map alone gets the bytes back.
//! let reader = SelfEncryptor::open(store, map, EngineConfig::default()).unwrap();
//! let mut recovered = vec![0u8; 4000];
//! reader.read(&mut recovered, 0).unwrap();
//! assert_eq!(recovered, data);
//! ```
//!
//! Writes may arrive at arbitrary offsets in any order; the engine reorders
//! them internally. See [`SelfEncryptor`] for the write/finalise/read
//! lifecycle and [`DataMap`] for what a sealed map guarantees.

pub mod chunker;
pub mod config;
pub mod crypto;
pub mod data_map;
pub mod engine;
pub mod error;
pub mod sequencer;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use data_map::{ChunkDescriptor, ChunkHash, DataMap, VERSION_TAG};
pub use engine::{DeleteReport, SelfEncryptor};
pub use error::{Error, InputError, IntegrityError, StorageError};
pub use store::{ChunkStore, DeleteOutcome, MemoryChunkStore, PutOutcome, StoreError};
