//! Credential backends
//!
//! The platform keyring keeps secrets under OS access control. The local
//! backend keeps them in the credential database, always sealed with the
//! vault's encryption context.

use parking_lot::RwLock;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use surf_crypto::EncryptionContext;
use surf_storage::Database;

use crate::credential::StoredSecret;
use crate::error::VaultError;
use crate::Result;

pub const KEYRING_SERVICE: &str = "surf.credentials";

/// Which backend the vault should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Platform keyring when available, local store otherwise
    #[default]
    Auto,
    Platform,
    Local,
}

impl FromStr for BackendChoice {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendChoice::Auto),
            "platform" | "keyring" => Ok(BackendChoice::Platform),
            "local" => Ok(BackendChoice::Local),
            other => Err(VaultError::Backend(format!("unknown backend: {}", other))),
        }
    }
}

pub trait CredentialBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn store(&self, domain: &str, username: &str, secret: &str) -> Result<()>;

    fn load(&self, domain: &str) -> Result<Vec<StoredSecret>>;

    fn remove(&self, domain: &str, username: &str) -> Result<()>;
}

/// Secrets in the OS keyring, one entry per `username@domain`.
///
/// The keyring cannot be searched portably, so each domain also has an index
/// entry holding the JSON list of its usernames.
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    /// Connect to the platform keyring, failing if it cannot be reached.
    pub fn probe(service: &str) -> Result<Self> {
        let entry = keyring::Entry::new(service, "probe")?;
        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(Self {
                service: service.to_string(),
            }),
            Err(e) => Err(VaultError::Backend(format!("keyring unavailable: {}", e))),
        }
    }

    fn secret_entry(&self, domain: &str, username: &str) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(
            &self.service,
            &format!("{}@{}", username, domain),
        )?)
    }

    fn index_entry(&self, domain: &str) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(&self.service, &format!("index:{}", domain))?)
    }

    fn read_index(&self, domain: &str) -> Result<Vec<String>> {
        match self.index_entry(domain)?.get_password() {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(keyring::Error::NoEntry) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_index(&self, domain: &str, usernames: &[String]) -> Result<()> {
        let entry = self.index_entry(domain)?;
        if usernames.is_empty() {
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e.into()),
            }
        } else {
            entry.set_password(&serde_json::to_string(usernames)?)?;
            Ok(())
        }
    }
}

impl CredentialBackend for KeyringBackend {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn store(&self, domain: &str, username: &str, secret: &str) -> Result<()> {
        self.secret_entry(domain, username)?.set_password(secret)?;

        let mut usernames = self.read_index(domain)?;
        if !usernames.iter().any(|u| u == username) {
            usernames.push(username.to_string());
            self.write_index(domain, &usernames)?;
        }
        Ok(())
    }

    fn load(&self, domain: &str) -> Result<Vec<StoredSecret>> {
        let mut secrets = Vec::new();
        for username in self.read_index(domain)? {
            match self.secret_entry(domain, &username)?.get_password() {
                Ok(secret) => secrets.push(StoredSecret { username, secret }),
                Err(keyring::Error::NoEntry) => {
                    tracing::debug!(domain, username = %username, "Keyring index entry has no secret");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(secrets)
    }

    fn remove(&self, domain: &str, username: &str) -> Result<()> {
        match self.secret_entry(domain, username)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(e.into()),
        }

        let mut usernames = self.read_index(domain)?;
        let before = usernames.len();
        usernames.retain(|u| u != username);
        if usernames.len() != before {
            self.write_index(domain, &usernames)?;
        }
        Ok(())
    }
}

/// Secrets in the `credential_secrets` table, sealed with the vault key.
pub struct LocalBackend {
    db: Database,
    context: Arc<RwLock<Option<EncryptionContext>>>,
}

impl LocalBackend {
    pub fn new(db: Database, context: Arc<RwLock<Option<EncryptionContext>>>) -> Self {
        Self { db, context }
    }
}

impl CredentialBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn store(&self, domain: &str, username: &str, secret: &str) -> Result<()> {
        let sealed = {
            let context = self.context.read();
            let context = context.as_ref().ok_or(VaultError::Locked)?;
            context.encrypt_str(secret)?
        };

        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO credential_secrets (domain, username, secret)
                 VALUES (?1, ?2, ?3)",
                params![domain, username, sealed],
            )?;
            Ok(())
        })?;
        Ok(())
    }

    fn load(&self, domain: &str) -> Result<Vec<StoredSecret>> {
        let rows: Vec<(String, Vec<u8>)> = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, secret FROM credential_secrets
                 WHERE domain = ?1 ORDER BY username",
            )?;
            let rows = stmt
                .query_map([domain], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let context = self.context.read();
        let context = context.as_ref().ok_or(VaultError::Locked)?;

        rows.into_iter()
            .map(|(username, sealed)| -> Result<StoredSecret> {
                let secret = context.decrypt_str(&sealed)?;
                Ok(StoredSecret { username, secret })
            })
            .collect()
    }

    fn remove(&self, domain: &str, username: &str) -> Result<()> {
        self.db.with_connection(|conn| {
            conn.execute(
                "DELETE FROM credential_secrets WHERE domain = ?1 AND username = ?2",
                params![domain, username],
            )?;
            Ok(())
        })?;
        Ok(())
    }
}
