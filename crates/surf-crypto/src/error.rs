//! Crypto error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed")]
    Encryption,

    /// Tag mismatch or truncated input: wrong passphrase or tampered data.
    #[error("Decryption failed: authentication tag mismatch or truncated ciphertext")]
    Decryption,

    #[error("Invalid salt: expected {expected} bytes, found {found}")]
    InvalidSalt { expected: usize, found: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
