//! Surf Crypto
//!
//! Passphrase-based key derivation (Argon2id) and authenticated encryption
//! (XChaCha20-Poly1305) for everything the browser shell writes to disk.
//! Keys live only in memory and are zeroed when dropped.

mod aead;
mod context;
mod error;
mod kdf;

pub use aead::{decrypt, encrypt, NONCE_SIZE, TAG_SIZE};
pub use context::EncryptionContext;
pub use error::CryptoError;
pub use kdf::{derive_key, generate_salt, load_or_create_salt, DerivedKey, KEY_SIZE, SALT_SIZE};

pub type Result<T> = std::result::Result<T, CryptoError>;
