//! Session error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(usize),

    #[error("Session not found: {0}")]
    SessionNotFound(usize),

    #[error("Tab not found: {0}")]
    TabNotFound(usize),

    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Workspace name already in use: {0}")]
    DuplicateName(String),

    #[error("Cannot close the overview session")]
    CannotCloseOverview,

    #[error("Cannot close the last workspace")]
    CannotCloseLastWorkspace,

    #[error("Tab error: {0}")]
    Tab(#[from] surf_tabs::TabError),
}

/// Failures of a save or load transaction. None of them touch the in-memory
/// topology.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    Storage(#[from] surf_storage::StorageError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] surf_crypto::CryptoError),

    /// Wrong passphrase or tampered store.
    #[error("Session store could not be decrypted")]
    Decryption,

    /// The store is encrypted and no passphrase has been supplied.
    #[error("Session store is encrypted; a passphrase is required")]
    Locked,

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PersistenceError {
    /// Errors that should send the user back to the passphrase prompt.
    pub fn needs_passphrase(&self) -> bool {
        matches!(self, PersistenceError::Decryption | PersistenceError::Locked)
    }
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(e: rusqlite::Error) -> Self {
        PersistenceError::Storage(e.into())
    }
}
