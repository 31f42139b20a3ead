//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] surf_storage::StorageError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] surf_crypto::CryptoError),

    #[error("Tab error: {0}")]
    Tab(#[from] surf_tabs::TabError),

    #[error("Session error: {0}")]
    Session(#[from] surf_session::SessionError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] surf_session::PersistenceError),

    #[error("Vault error: {0}")]
    Vault(#[from] surf_vault::VaultError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No recently closed tabs")]
    NothingToReopen,
}

impl CoreError {
    /// The passphrase was wrong or missing; prompt for it again.
    pub fn needs_passphrase(&self) -> bool {
        match self {
            CoreError::Persistence(e) => e.needs_passphrase(),
            CoreError::Vault(e) => e.needs_passphrase(),
            _ => false,
        }
    }
}
