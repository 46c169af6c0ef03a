//! SHA-512 digests over chunks and whole streams.
//!
//! Every identity in the scheme is a SHA-512 digest: chunks are named by the
//! hash of their ciphertext, and key material is derived from the hashes of
//! neighbouring plaintext chunks. The free functions here are pure and safe
//! to call from concurrent workers.

use ring::digest;

use crate::data_map::ChunkHash;

/// Digest size in bytes (SHA-512).
pub const HASH_SIZE: usize = 64;

/// Hash a byte slice in one call.
pub fn hash(data: &[u8]) -> ChunkHash {
    let digest = digest::digest(&digest::SHA512, data);
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(digest.as_ref());
    ChunkHash(out)
}

/// Incremental SHA-512 over a byte stream fed in arbitrary slices.
pub struct StreamHasher {
    context: digest::Context,
}

impl StreamHasher {
    pub fn new() -> Self {
        Self {
            context: digest::Context::new(&digest::SHA512),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.context.update(data);
    }

    pub fn finish(self) -> ChunkHash {
        let digest = self.context.finish();
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(digest.as_ref());
        ChunkHash(out)
    }
}

impl Default for StreamHasher {
    fn default() -> Self {
        Self::new()
    }
}
