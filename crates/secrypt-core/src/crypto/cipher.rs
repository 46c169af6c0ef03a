//! AES-256 in CFB mode, keyed and IV'd per chunk.
//!
//! CFB turns AES into a self-synchronising stream cipher: ciphertext length
//! equals plaintext length, arbitrary lengths are fine, and there is no
//! padding and no authentication tag. Integrity is enforced one layer up by
//! comparing digests of the stored ciphertext.

use aes::Aes256;
use aes::cipher::{AsyncStreamCipher, KeyIvInit};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// CFB IV size in bytes (one AES block).
pub const IV_SIZE: usize = 16;

/// AES-256-CFB with full-block feedback.
type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// Encrypt `buf` in place.
pub fn encrypt_in_place(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], buf: &mut [u8]) {
    Aes256CfbEnc::new(key.into(), iv.into()).encrypt(buf);
}

/// Decrypt `buf` in place. Exact inverse of [`encrypt_in_place`].
pub fn decrypt_in_place(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], buf: &mut [u8]) {
    Aes256CfbDec::new(key.into(), iv.into()).decrypt(buf);
}
