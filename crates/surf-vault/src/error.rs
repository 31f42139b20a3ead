//! Vault error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    /// Platform keyring unavailable or access denied.
    #[error("Credential backend error: {0}")]
    Backend(String),

    #[error("Storage error: {0}")]
    Storage(#[from] surf_storage::StorageError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] surf_crypto::CryptoError),

    /// The local store needs a passphrase before it can hold secrets.
    #[error("Local credential store is locked")]
    Locked,

    /// The passphrase does not open the local credential store.
    #[error("Wrong passphrase for the credential store")]
    WrongPassphrase,

    #[error("Credential not found: {username}@{domain}")]
    NotFound { domain: String, username: String },

    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    #[error("Username cannot be empty")]
    EmptyUsername,

    #[error("Render engine error: {0}")]
    Engine(#[from] surf_tabs::EngineError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// The user should be asked for (another) passphrase.
    pub fn needs_passphrase(&self) -> bool {
        matches!(self, VaultError::Locked | VaultError::WrongPassphrase)
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::Storage(e.into())
    }
}

impl From<keyring::Error> for VaultError {
    fn from(e: keyring::Error) -> Self {
        VaultError::Backend(e.to_string())
    }
}
