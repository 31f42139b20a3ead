//! XChaCha20-Poly1305 sealing
//!
//! Output layout: `nonce (24) || ciphertext || tag (16)`.

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CryptoError;
use crate::kdf::KEY_SIZE;
use crate::Result;

pub const NONCE_SIZE: usize = 24;
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt a buffer produced by [`encrypt`].
///
/// Fails closed: a wrong key, a flipped bit or a truncated buffer all return
/// [`CryptoError::Decryption`] and never any partial plaintext.
pub fn decrypt(sealed: &[u8], key: &[u8; KEY_SIZE]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption);
    }

    let (nonce, body) = sealed.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(XNonce::from_slice(nonce), body)
        .map_err(|_| CryptoError::Decryption)
}
