//! In-memory encryption context
//!
//! Holds the salt and the derived key for one store. The key is re-derived
//! from the passphrase on every process start and zeroed on drop.

use std::fmt;
use std::path::Path;

use crate::aead;
use crate::kdf::{self, DerivedKey, SALT_SIZE};
use crate::Result;

pub struct EncryptionContext {
    salt: [u8; SALT_SIZE],
    key: DerivedKey,
}

impl EncryptionContext {
    /// Derive a context from a passphrase and a known salt.
    pub fn derive(passphrase: &str, salt: [u8; SALT_SIZE]) -> Result<Self> {
        let key = kdf::derive_key(passphrase, &salt)?;
        Ok(Self { salt, key })
    }

    /// Derive a context using the salt artifact at `salt_path`, creating the
    /// artifact if it does not exist yet.
    pub fn from_salt_file(passphrase: &str, salt_path: &Path) -> Result<Self> {
        let salt = kdf::load_or_create_salt(salt_path)?;
        Self::derive(passphrase, salt)
    }

    pub fn salt(&self) -> &[u8; SALT_SIZE] {
        &self.salt
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        aead::encrypt(plaintext, &self.key)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        aead::decrypt(sealed, &self.key)
    }

    pub fn encrypt_str(&self, plaintext: &str) -> Result<Vec<u8>> {
        self.encrypt(plaintext.as_bytes())
    }

    /// Decrypt to a UTF-8 string. Invalid UTF-8 after a valid tag is treated
    /// as a decryption failure.
    pub fn decrypt_str(&self, sealed: &[u8]) -> Result<String> {
        let bytes = self.decrypt(sealed)?;
        String::from_utf8(bytes).map_err(|_| crate::CryptoError::Decryption)
    }
}

impl fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionContext")
            .field("salt", &self.salt)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::generate_salt;

    #[test]
    fn test_context_roundtrip() {
        let ctx = EncryptionContext::derive("alpha", generate_salt()).unwrap();
        let sealed = ctx.encrypt_str("https://example.com").unwrap();
        assert_eq!(ctx.decrypt_str(&sealed).unwrap(), "https://example.com");
    }

    #[test]
    fn test_wrong_passphrase_cannot_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let salt_path = dir.path().join("store.salt");

        let alpha = EncryptionContext::from_salt_file("alpha", &salt_path).unwrap();
        let sealed = alpha.encrypt_str("state").unwrap();

        let beta = EncryptionContext::from_salt_file("beta", &salt_path).unwrap();
        assert_eq!(alpha.salt(), beta.salt());
        assert!(beta.decrypt_str(&sealed).is_err());

        let alpha_again = EncryptionContext::from_salt_file("alpha", &salt_path).unwrap();
        assert_eq!(alpha_again.decrypt_str(&sealed).unwrap(), "state");
    }

    #[test]
    fn test_debug_redacts_key() {
        let ctx = EncryptionContext::derive("alpha", [9u8; SALT_SIZE]).unwrap();
        let rendered = format!("{:?}", ctx);
        assert!(rendered.contains("<redacted>"));
    }
}
