//! Convergent key derivation from neighbouring chunk pre-hashes.
//!
//! Chunk `i` is encrypted with material taken verbatim from the plaintext
//! hashes of its neighbours. With `A` the pre-hash of chunk `i-1`, `B` the
//! pre-hash of chunk `i` itself and `C` the pre-hash of chunk `i-2`
//! (indices wrap around the chunk list):
//!
//! | Material      | Bytes            |
//! |---------------|------------------|
//! | `key[0..32]`  | `A[0..32]`       |
//! | `iv[0..16]`   | `A[32..48]`      |
//! | `pad[0..64]`  | `A[0..64]`       |
//! | `pad[64..128]`| `B[0..64]`       |
//! | `pad[128..144]`| `C[48..64]`     |
//!
//! This byte layout is a wire contract: changing it makes every existing
//! chunk store unreadable. The wrap-around means chunks 0 and 1 depend on the
//! pre-hashes of the last two chunks, which is why their encryption is
//! deferred until the whole stream has been hashed.

use std::fmt;

use zeroize::Zeroizing;

use crate::crypto::cipher::{IV_SIZE, KEY_SIZE};
use crate::crypto::pad::PAD_SIZE;
use crate::data_map::ChunkHash;

/// Key, IV and obfuscation pad for a single chunk.
///
/// The material is wiped on drop. `Debug` redacts it.
pub struct ChunkKeys {
    pub key: Zeroizing<[u8; KEY_SIZE]>,
    pub iv: Zeroizing<[u8; IV_SIZE]>,
    pub pad: Zeroizing<[u8; PAD_SIZE]>,
}

impl fmt::Debug for ChunkKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkKeys")
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .field("pad", &"[REDACTED]")
            .finish()
    }
}

/// Derive the material for a chunk from the three relevant pre-hashes.
///
/// `prev` is the pre-hash of the chunk before it, `this` the chunk's own
/// pre-hash, `prev2` the pre-hash two chunks back. For chunk indices >= 2 no
/// wrap-around is involved and this can be called while the stream is still
/// being written.
pub fn derive(prev: &ChunkHash, this: &ChunkHash, prev2: &ChunkHash) -> ChunkKeys {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&prev.0[..KEY_SIZE]);

    let mut iv = Zeroizing::new([0u8; IV_SIZE]);
    iv.copy_from_slice(&prev.0[KEY_SIZE..KEY_SIZE + IV_SIZE]);

    let mut pad = Zeroizing::new([0u8; PAD_SIZE]);
    pad[..64].copy_from_slice(&prev.0);
    pad[64..128].copy_from_slice(&this.0);
    pad[128..].copy_from_slice(&prev2.0[48..]);

    ChunkKeys { key, iv, pad }
}

/// Derive the material for chunk `index` out of a complete pre-hash list.
///
/// Indices wrap: chunk 0 draws on the last and second-to-last chunks. Only
/// valid once every pre-hash is known, i.e. at seal time and on the read
/// path.
pub fn derive_for_chunk(pre_hashes: &[ChunkHash], index: usize) -> ChunkKeys {
    let n = pre_hashes.len();
    debug_assert!(n >= 3, "chunked streams always carry at least three chunks");
    debug_assert!(index < n);
    derive(
        &pre_hashes[(index + n - 1) % n],
        &pre_hashes[index],
        &pre_hashes[(index + n - 2) % n],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marked_hash(marker: u8) -> ChunkHash {
        let mut bytes = [0u8; 64];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = marker.wrapping_add(i as u8);
        }
        ChunkHash(bytes)
    }

    #[test]
    fn layout_matches_contract() {
        let prev = marked_hash(0x10);
        let this = marked_hash(0x80);
        let prev2 = marked_hash(0xC0);

        let keys = derive(&prev, &this, &prev2);

        assert_eq!(&keys.key[..], &prev.0[..32]);
        assert_eq!(&keys.iv[..], &prev.0[32..48]);
        assert_eq!(&keys.pad[..64], &prev.0[..]);
        assert_eq!(&keys.pad[64..128], &this.0[..]);
        assert_eq!(&keys.pad[128..144], &prev2.0[48..64]);
    }

    #[test]
    fn first_two_chunks_wrap_to_the_tail() {
        let hashes: Vec<ChunkHash> = (0u8..5).map(|i| marked_hash(i * 40)).collect();

        let chunk0 = derive_for_chunk(&hashes, 0);
        assert_eq!(&chunk0.key[..], &hashes[4].0[..32]);
        assert_eq!(&chunk0.pad[64..128], &hashes[0].0[..]);
        assert_eq!(&chunk0.pad[128..144], &hashes[3].0[48..64]);

        let chunk1 = derive_for_chunk(&hashes, 1);
        assert_eq!(&chunk1.key[..], &hashes[0].0[..32]);
        assert_eq!(&chunk1.pad[128..144], &hashes[4].0[48..64]);
    }

    #[test]
    fn interior_chunks_use_plain_neighbours() {
        let hashes: Vec<ChunkHash> = (0u8..4).map(|i| marked_hash(i * 60)).collect();

        let wrapped = derive_for_chunk(&hashes, 2);
        let direct = derive(&hashes[1], &hashes[2], &hashes[0]);

        assert_eq!(&wrapped.key[..], &direct.key[..]);
        assert_eq!(&wrapped.iv[..], &direct.iv[..]);
        assert_eq!(&wrapped.pad[..], &direct.pad[..]);
    }
}
