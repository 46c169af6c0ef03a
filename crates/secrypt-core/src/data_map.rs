//! The data map: the manifest a caller must keep to get their bytes back.
//!
//! A [`DataMap`] lists one [`ChunkDescriptor`] per chunk in stream order,
//! carries any trailing bytes that were too small to chunk, and records the
//! plaintext totals. Possession of the map is the only capability needed to
//! reconstruct the stream; without it the stored chunks are opaque blobs.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::{Bytes, serde_as};

use crate::crypto::hashing::HASH_SIZE;

/// Identifier of the encryption scheme a map was produced with.
pub const VERSION_TAG: &str = "secrypt/1";

/// A SHA-512 digest used as chunk identity and store key.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkHash(#[serde_as(as = "Bytes")] pub [u8; HASH_SIZE]);

impl ChunkHash {
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Full lowercase hex rendering (128 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for ChunkHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_SIZE]> for ChunkHash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}...", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHash({}...)", hex::encode(&self.0[..8]))
    }
}

/// Everything recorded about one chunk, in stream order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// SHA-512 of the plaintext chunk.
    pub pre_hash: ChunkHash,
    /// Plaintext length in bytes.
    pub pre_size: u64,
    /// SHA-512 of the encrypted chunk; doubles as the store key.
    pub post_hash: ChunkHash,
    /// Encrypted length in bytes. Equal to `pre_size` for this scheme's
    /// stream cipher.
    pub post_size: u64,
}

/// Sealed manifest of an encrypted stream.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMap {
    chunks: Vec<ChunkDescriptor>,
    residual_content: Vec<u8>,
    total_size: u64,
    file_hash: ChunkHash,
    version_tag: String,
}

impl DataMap {
    pub(crate) fn new(
        chunks: Vec<ChunkDescriptor>,
        residual_content: Vec<u8>,
        total_size: u64,
        file_hash: ChunkHash,
    ) -> Self {
        debug_assert_eq!(
            total_size,
            chunks.iter().map(|c| c.pre_size).sum::<u64>() + residual_content.len() as u64
        );
        Self {
            chunks,
            residual_content,
            total_size,
            file_hash,
            version_tag: VERSION_TAG.to_owned(),
        }
    }

    /// Chunk descriptors in stream order.
    pub fn chunks(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    /// Trailing bytes kept verbatim because they were too small to chunk.
    pub fn residual_content(&self) -> &[u8] {
        &self.residual_content
    }

    /// Plaintext length of the whole stream.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Plaintext length covered by chunks, i.e. everything before the
    /// residual region.
    pub fn chunked_size(&self) -> u64 {
        self.total_size - self.residual_content.len() as u64
    }

    /// SHA-512 of the complete plaintext stream.
    pub fn file_hash(&self) -> &ChunkHash {
        &self.file_hash
    }

    /// Scheme identifier the map was produced with.
    pub fn version_tag(&self) -> &str {
        &self.version_tag
    }

    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }
}

impl fmt::Debug for DataMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataMap")
            .field("chunks", &self.chunks.len())
            .field("residual_len", &self.residual_content.len())
            .field("total_size", &self.total_size)
            .field("file_hash", &self.file_hash)
            .field("version_tag", &self.version_tag)
            .finish()
    }
}
