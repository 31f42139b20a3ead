//! Surf Credential Vault
//!
//! Per-origin saved logins. The platform keyring is preferred; when it is
//! unavailable the vault falls back to a local SQLite store whose secrets are
//! always encrypted. Secrets never reach a log line or the session store.

mod backend;
mod credential;
mod error;
mod generator;
mod manager;

pub use backend::{BackendChoice, CredentialBackend, KeyringBackend, LocalBackend, KEYRING_SERVICE};
pub use credential::{extract_domain, Credential, StoredSecret};
pub use error::VaultError;
pub use generator::{generate_password, DEFAULT_PASSWORD_LENGTH};
pub use manager::PasswordManager;

pub type Result<T> = std::result::Result<T, VaultError>;
