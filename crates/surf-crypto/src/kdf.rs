//! Argon2id key derivation and salt management

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fs;
use std::path::Path;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::Result;

pub const SALT_SIZE: usize = 16;
pub const KEY_SIZE: usize = 32;

/// Argon2id cost: 64 MiB, 3 passes, single lane.
const MEMORY_COST_KIB: u32 = 64 * 1024;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 1;

/// A 32-byte symmetric key that is wiped from memory on drop.
pub type DerivedKey = Zeroizing<[u8; KEY_SIZE]>;

/// Derive a symmetric key from a passphrase and salt.
///
/// Deterministic: the same passphrase and salt always yield the same key.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> Result<DerivedKey> {
    if salt.len() != SALT_SIZE {
        return Err(CryptoError::InvalidSalt {
            expected: SALT_SIZE,
            found: salt.len(),
        });
    }

    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(KEY_SIZE))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    argon
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(key)
}

/// Generate a fresh random salt from the OS CSPRNG.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Read the salt artifact at `path`, creating it on first use.
///
/// The salt is stored unencrypted next to (never inside) the store it protects.
pub fn load_or_create_salt(path: &Path) -> Result<[u8; SALT_SIZE]> {
    match fs::read(path) {
        Ok(bytes) => {
            let salt: [u8; SALT_SIZE] =
                bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| CryptoError::InvalidSalt {
                        expected: SALT_SIZE,
                        found: bytes.len(),
                    })?;
            Ok(salt)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let salt = generate_salt();
            fs::write(path, salt)?;
            tracing::info!(path = %path.display(), "Generated new salt");
            Ok(salt)
        }
        Err(e) => Err(e.into()),
    }
}
