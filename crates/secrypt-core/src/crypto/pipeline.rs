//! Per-chunk transform pipelines.
//!
//! Writing a chunk runs `encrypt -> xor -> hash`; reading runs the exact
//! inverse, `xor -> decrypt`. The stages are plain byte-in/byte-out
//! functions composed statically, so there is no dynamic dispatch and the
//! whole pipeline works on one owned buffer.

use crate::crypto::cipher;
use crate::crypto::hashing;
use crate::crypto::keys::ChunkKeys;
use crate::crypto::pad::XorPad;
use crate::data_map::ChunkHash;

/// Output of the write-side pipeline: the storable blob and its name.
pub struct SealedChunk {
    pub content: Vec<u8>,
    pub post_hash: ChunkHash,
}

/// Encrypt and obfuscate a plaintext chunk, naming it by its ciphertext hash.
pub fn seal_chunk(raw: &[u8], keys: &ChunkKeys) -> SealedChunk {
    let mut buf = raw.to_vec();
    cipher::encrypt_in_place(&keys.key, &keys.iv, &mut buf);
    XorPad::new(&keys.pad).process(&mut buf);
    let post_hash = hashing::hash(&buf);
    SealedChunk {
        content: buf,
        post_hash,
    }
}

/// Invert [`seal_chunk`]: recover the plaintext from a stored blob.
pub fn open_chunk(blob: &[u8], keys: &ChunkKeys) -> Vec<u8> {
    let mut buf = blob.to_vec();
    XorPad::new(&keys.pad).process(&mut buf);
    cipher::decrypt_in_place(&keys.key, &keys.iv, &mut buf);
    buf
}
