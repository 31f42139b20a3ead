//! Password manager
//!
//! Secrets go to the active backend. Non-secret metadata (domain, username,
//! timestamps) is mirrored in the local `credential_index` table for both
//! backends, so existence checks and last-used ordering never need a round
//! trip to the platform keyring.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use surf_crypto::{generate_salt, EncryptionContext, SALT_SIZE};
use surf_storage::{read_meta, write_meta, Database, StoreKind};
use surf_tabs::{RenderEngine, RenderHandle};

use crate::backend::{BackendChoice, CredentialBackend, KeyringBackend, LocalBackend, KEYRING_SERVICE};
use crate::credential::{extract_domain, Credential};
use crate::error::VaultError;
use crate::Result;

const META_KEY_CHECK: &str = "key_check";

/// Sealed under the vault key on first unlock; later passphrases must open it
/// before any secret is written or read.
const KEY_CHECK_TOKEN: &[u8] = b"surf:credential-store:v1";

pub struct PasswordManager {
    backend: Arc<dyn CredentialBackend>,
    db: Database,
    context: Arc<RwLock<Option<EncryptionContext>>>,
    salt_path: Option<PathBuf>,
    memory_salt: Arc<Mutex<Option<[u8; SALT_SIZE]>>>,
    /// Domains with at least one credential, for the O(1) probe
    domains: Arc<RwLock<HashSet<String>>>,
    autofill_enabled: Arc<AtomicBool>,
}

impl PasswordManager {
    /// Open the credential database at `path` and pick a backend.
    pub fn open<P: AsRef<Path>>(path: P, choice: BackendChoice) -> Result<Self> {
        let db = Database::open(path, StoreKind::Credentials)?;
        Self::with_platform(db, choice, || {
            KeyringBackend::probe(KEYRING_SERVICE)
                .map(|b| Arc::new(b) as Arc<dyn CredentialBackend>)
        })
    }

    /// Pick a backend given a way to reach the platform keyring.
    ///
    /// `Auto` falls back to the local store when `platform` fails; `Platform`
    /// surfaces the failure; `Local` never calls it.
    pub fn with_platform<F>(db: Database, choice: BackendChoice, platform: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Arc<dyn CredentialBackend>>,
    {
        let context = Arc::new(RwLock::new(None));
        let local = || -> Arc<dyn CredentialBackend> {
            Arc::new(LocalBackend::new(db.clone(), Arc::clone(&context)))
        };

        let backend = match choice {
            BackendChoice::Local => local(),
            BackendChoice::Platform => platform()?,
            BackendChoice::Auto => match platform() {
                Ok(backend) => backend,
                Err(e) => {
                    tracing::warn!(error = %e, "Platform keyring unavailable, using local credential store");
                    local()
                }
            },
        };

        Self::assemble(db, backend, context)
    }

    fn assemble(
        db: Database,
        backend: Arc<dyn CredentialBackend>,
        context: Arc<RwLock<Option<EncryptionContext>>>,
    ) -> Result<Self> {
        let salt_path = db.path().map(|p| {
            let mut path = OsString::from(p.as_os_str());
            path.push(".salt");
            PathBuf::from(path)
        });

        let manager = Self {
            backend,
            db,
            context,
            salt_path,
            memory_salt: Arc::new(Mutex::new(None)),
            domains: Arc::new(RwLock::new(HashSet::new())),
            autofill_enabled: Arc::new(AtomicBool::new(true)),
        };
        manager.rebuild_domain_set()?;

        tracing::info!(backend = manager.backend.name(), "Password manager ready");
        Ok(manager)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Derive the key that seals locally stored secrets. `None` locks the
    /// local store again.
    ///
    /// A passphrase that does not open the store fails with
    /// [`VaultError::WrongPassphrase`] and leaves the current key in place.
    pub fn set_passphrase(&self, passphrase: Option<&str>) -> Result<()> {
        let context = match passphrase.filter(|p| !p.is_empty()) {
            Some(passphrase) => {
                let context = match &self.salt_path {
                    Some(path) => EncryptionContext::from_salt_file(passphrase, path)?,
                    None => {
                        let salt = *self.memory_salt.lock().get_or_insert_with(generate_salt);
                        EncryptionContext::derive(passphrase, salt)?
                    }
                };
                self.verify_key(&context)?;
                Some(context)
            }
            None => None,
        };
        *self.context.write() = context;
        Ok(())
    }

    /// Check `context` against the stored key check, sealing one on first
    /// unlock. A store without a check but with secrets must have one of
    /// them open under `context`.
    fn verify_key(&self, context: &EncryptionContext) -> Result<()> {
        let sealed_check = context.encrypt(KEY_CHECK_TOKEN)?;

        let opens = self.db.transaction(|conn| {
            if let Some(check) = read_meta(conn, META_KEY_CHECK)? {
                return Ok(context
                    .decrypt(&check)
                    .is_ok_and(|token| token == KEY_CHECK_TOKEN));
            }

            let sample: Option<Vec<u8>> = conn
                .query_row("SELECT secret FROM credential_secrets LIMIT 1", [], |row| {
                    row.get(0)
                })
                .optional()?;
            if sample.is_some_and(|sealed| context.decrypt(&sealed).is_err()) {
                return Ok(false);
            }

            write_meta(conn, META_KEY_CHECK, &sealed_check)?;
            Ok(true)
        })?;

        if opens {
            Ok(())
        } else {
            tracing::warn!("Passphrase rejected by the credential store");
            Err(VaultError::WrongPassphrase)
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.context.read().is_some()
    }

    /// Save or replace the secret for `username` on `domain`.
    pub fn save(&self, domain: &str, username: &str, secret: &str) -> Result<()> {
        let domain = extract_domain(domain)?;
        if username.is_empty() {
            return Err(VaultError::EmptyUsername);
        }

        self.backend.store(&domain, username, secret)?;

        let now = Utc::now().timestamp();
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO credential_index (domain, username, created_at, last_used_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(domain, username) DO UPDATE SET last_used_at = excluded.last_used_at",
                params![domain, username, now],
            )?;
            Ok(())
        })?;
        self.domains.write().insert(domain.clone());

        tracing::info!(
            domain = %domain,
            username = %username,
            backend = self.backend.name(),
            "Saved credential"
        );
        Ok(())
    }

    /// All credentials for a domain, most recently used first.
    pub fn get(&self, domain: &str) -> Result<Vec<Credential>> {
        let domain = extract_domain(domain)?;
        let stored = self.backend.load(&domain)?;
        if stored.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.index_for(&domain)?;
        let now = Utc::now();

        let mut credentials: Vec<Credential> = stored
            .into_iter()
            .map(|mut s| {
                let (created_at, last_used_at) =
                    index.get(&s.username).copied().unwrap_or((now, now));
                Credential {
                    domain: domain.clone(),
                    username: std::mem::take(&mut s.username),
                    secret: std::mem::take(&mut s.secret),
                    created_at,
                    last_used_at,
                }
            })
            .collect();

        credentials.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        Ok(credentials)
    }

    /// The most recently used credential for a domain.
    pub fn get_one(&self, domain: &str) -> Result<Option<Credential>> {
        Ok(self.get(domain)?.into_iter().next())
    }

    pub fn has_credentials(&self, domain: &str) -> bool {
        match extract_domain(domain) {
            Ok(domain) => self.domains.read().contains(&domain),
            Err(_) => false,
        }
    }

    /// Remove a credential from every place that holds a copy. The backend
    /// goes first; if it fails the index still lists the credential so the
    /// delete can be retried.
    pub fn delete(&self, domain: &str, username: &str) -> Result<()> {
        let domain = extract_domain(domain)?;

        self.backend.remove(&domain, username)?;

        let removed = self.db.transaction(|conn| {
            let removed = conn.execute(
                "DELETE FROM credential_index WHERE domain = ?1 AND username = ?2",
                params![domain, username],
            )?;
            conn.execute(
                "DELETE FROM credential_secrets WHERE domain = ?1 AND username = ?2",
                params![domain, username],
            )?;
            Ok(removed)
        })?;

        if !self.index_has_domain(&domain)? {
            self.domains.write().remove(&domain);
        }

        if removed == 0 {
            return Err(VaultError::NotFound {
                domain,
                username: username.to_string(),
            });
        }

        tracing::info!(domain = %domain, username = %username, "Deleted credential");
        Ok(())
    }

    pub fn update_last_used(&self, domain: &str, username: &str) -> Result<()> {
        let domain = extract_domain(domain)?;
        let now = Utc::now().timestamp();
        self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE credential_index SET last_used_at = ?1 WHERE domain = ?2 AND username = ?3",
                params![now, domain, username],
            )?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn list_domains(&self) -> Result<Vec<String>> {
        let domains = self.db.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT domain FROM credential_index ORDER BY domain")?;
            let domains = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(domains)
        })?;
        Ok(domains)
    }

    pub fn autofill_enabled(&self) -> bool {
        self.autofill_enabled.load(Ordering::Relaxed)
    }

    pub fn set_autofill_enabled(&self, enabled: bool) {
        self.autofill_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn should_autofill(&self, origin: &str) -> bool {
        self.autofill_enabled() && self.has_credentials(origin)
    }

    /// Fill the page behind `handle` with the most recent credential for
    /// `origin`. Returns whether anything was filled.
    pub fn autofill(
        &self,
        engine: &dyn RenderEngine,
        handle: &RenderHandle,
        origin: &str,
    ) -> Result<bool> {
        if !self.should_autofill(origin) {
            return Ok(false);
        }

        let Some(credential) = self.get_one(origin)? else {
            return Ok(false);
        };

        engine.fill_credentials(handle, &credential.username, &credential.secret)?;
        self.update_last_used(&credential.domain, &credential.username)?;

        tracing::debug!(
            domain = %credential.domain,
            username = %credential.username,
            handle_id = handle.id(),
            "Autofilled credential"
        );
        Ok(true)
    }

    /// Drop the key; locally stored secrets stay sealed until the next
    /// passphrase.
    pub fn close(&self) {
        *self.context.write() = None;
    }

    fn rebuild_domain_set(&self) -> Result<()> {
        let domains = self.list_domains()?;
        let mut set = self.domains.write();
        set.clear();
        set.extend(domains);
        Ok(())
    }

    fn index_has_domain(&self, domain: &str) -> Result<bool> {
        let count: i64 = self.db.with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM credential_index WHERE domain = ?1",
                [domain],
                |row| row.get(0),
            )?)
        })?;
        Ok(count > 0)
    }

    fn index_for(&self, domain: &str) -> Result<HashMap<String, (DateTime<Utc>, DateTime<Utc>)>> {
        let rows = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, created_at, last_used_at FROM credential_index WHERE domain = ?1",
            )?;
            let rows = stmt
                .query_map([domain], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let to_time = |secs: i64| DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|(username, created, used)| (username, (to_time(created), to_time(used))))
            .collect())
    }
}

impl Clone for PasswordManager {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            db: self.db.clone(),
            context: Arc::clone(&self.context),
            salt_path: self.salt_path.clone(),
            memory_salt: Arc::clone(&self.memory_salt),
            domains: Arc::clone(&self.domains),
            autofill_enabled: Arc::clone(&self.autofill_enabled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StoredSecret;
    use surf_tabs::testing::ScriptedEngine;

    /// Keyring stand-in held in memory.
    #[derive(Default)]
    struct MemoryKeyring {
        entries: Mutex<HashMap<(String, String), String>>,
        fail_remove: AtomicBool,
    }

    impl CredentialBackend for MemoryKeyring {
        fn name(&self) -> &'static str {
            "memory"
        }

        fn store(&self, domain: &str, username: &str, secret: &str) -> Result<()> {
            self.entries
                .lock()
                .insert((domain.to_string(), username.to_string()), secret.to_string());
            Ok(())
        }

        fn load(&self, domain: &str) -> Result<Vec<StoredSecret>> {
            Ok(self
                .entries
                .lock()
                .iter()
                .filter(|((d, _), _)| d == domain)
                .map(|((_, u), s)| StoredSecret {
                    username: u.clone(),
                    secret: s.clone(),
                })
                .collect())
        }

        fn remove(&self, domain: &str, username: &str) -> Result<()> {
            if self.fail_remove.load(Ordering::Relaxed) {
                return Err(VaultError::Backend("keyring locked".to_string()));
            }
            self.entries
                .lock()
                .remove(&(domain.to_string(), username.to_string()));
            Ok(())
        }
    }

    fn unavailable() -> Result<Arc<dyn CredentialBackend>> {
        Err(VaultError::Backend("secret service not running".to_string()))
    }

    fn local_manager() -> PasswordManager {
        let db = Database::open_in_memory(StoreKind::Credentials).unwrap();
        let manager = PasswordManager::with_platform(db, BackendChoice::Local, unavailable).unwrap();
        manager.set_passphrase(Some("alpha")).unwrap();
        manager
    }

    #[test]
    fn test_auto_falls_back_to_local() {
        let db = Database::open_in_memory(StoreKind::Credentials).unwrap();
        let manager = PasswordManager::with_platform(db, BackendChoice::Auto, unavailable).unwrap();
        assert_eq!(manager.backend_name(), "local");

        manager.set_passphrase(Some("alpha")).unwrap();
        manager.save("example.com", "ada", "hunter2").unwrap();
        let credential = manager.get_one("example.com").unwrap().unwrap();
        assert_eq!(credential.username, "ada");
        assert_eq!(credential.secret, "hunter2");
    }

    #[test]
    fn test_forced_platform_surfaces_error() {
        let db = Database::open_in_memory(StoreKind::Credentials).unwrap();
        let result = PasswordManager::with_platform(db, BackendChoice::Platform, unavailable);
        assert!(matches!(result, Err(VaultError::Backend(_))));
    }

    #[test]
    fn test_platform_backend_mirrors_metadata_only() {
        let db = Database::open_in_memory(StoreKind::Credentials).unwrap();
        let manager = PasswordManager::with_platform(db.clone(), BackendChoice::Auto, || {
            Ok(Arc::new(MemoryKeyring::default()) as Arc<dyn CredentialBackend>)
        })
        .unwrap();
        assert_eq!(manager.backend_name(), "memory");

        // No passphrase needed: the secret never reaches the local store
        manager.save("https://example.com/login", "ada", "hunter2").unwrap();
        assert!(manager.has_credentials("example.com"));

        let secrets: i64 = db
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM credential_secrets", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(secrets, 0);
        assert_eq!(manager.list_domains().unwrap(), vec!["example.com".to_string()]);
    }

    #[test]
    fn test_local_requires_passphrase() {
        let db = Database::open_in_memory(StoreKind::Credentials).unwrap();
        let manager = PasswordManager::with_platform(db, BackendChoice::Local, unavailable).unwrap();
        assert!(!manager.is_unlocked());
        assert!(matches!(
            manager.save("example.com", "ada", "hunter2"),
            Err(VaultError::Locked)
        ));
        assert!(!manager.has_credentials("example.com"));
    }

    #[test]
    fn test_get_one_prefers_most_recent() {
        let manager = local_manager();
        manager.save("example.com", "ada", "one").unwrap();
        manager.save("example.com", "grace", "two").unwrap();

        // Push ada's last use into the future so ordering is unambiguous
        manager
            .db
            .with_connection(|conn| {
                conn.execute(
                    "UPDATE credential_index SET last_used_at = last_used_at + 100 WHERE username = 'ada'",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let all = manager.get("example.com").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].username, "ada");
        assert_eq!(manager.get_one("EXAMPLE.com").unwrap().unwrap().username, "ada");
    }

    #[test]
    fn test_delete() {
        let manager = local_manager();
        manager.save("example.com", "ada", "one").unwrap();
        manager.save("example.com", "grace", "two").unwrap();

        manager.delete("example.com", "ada").unwrap();
        assert!(manager.has_credentials("example.com"));
        manager.delete("example.com", "grace").unwrap();
        assert!(!manager.has_credentials("example.com"));
        assert!(manager.get("example.com").unwrap().is_empty());

        assert!(matches!(
            manager.delete("example.com", "grace"),
            Err(VaultError::NotFound { .. })
        ));
    }

    #[test]
    fn test_domain_set_rebuilt_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passwords.db");
        {
            let db = Database::open(&path, StoreKind::Credentials).unwrap();
            let manager =
                PasswordManager::with_platform(db, BackendChoice::Local, unavailable).unwrap();
            manager.set_passphrase(Some("alpha")).unwrap();
            manager.save("example.com", "ada", "hunter2").unwrap();
        }

        let db = Database::open(&path, StoreKind::Credentials).unwrap();
        let manager = PasswordManager::with_platform(db, BackendChoice::Local, unavailable).unwrap();
        assert!(manager.has_credentials("https://example.com"));

        manager.set_passphrase(Some("alpha")).unwrap();
        assert_eq!(manager.get_one("example.com").unwrap().unwrap().secret, "hunter2");

        let err = manager.set_passphrase(Some("beta")).unwrap_err();
        assert!(matches!(err, VaultError::WrongPassphrase));
        assert!(err.needs_passphrase());
        // The working key stays in place
        assert_eq!(manager.get_one("example.com").unwrap().unwrap().secret, "hunter2");
    }

    #[test]
    fn test_wrong_passphrase_never_writes() {
        let manager = local_manager();
        manager.save("example.com", "ada", "hunter2").unwrap();

        manager.close();
        assert!(matches!(
            manager.set_passphrase(Some("beta")),
            Err(VaultError::WrongPassphrase)
        ));
        assert!(!manager.is_unlocked());
        assert!(matches!(
            manager.save("example.com", "grace", "cobol"),
            Err(VaultError::Locked)
        ));

        manager.set_passphrase(Some("alpha")).unwrap();
        manager.save("example.com", "grace", "cobol").unwrap();
        let all = manager.get("example.com").unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|c| c.username == "ada" && c.secret == "hunter2"));
    }

    #[test]
    fn test_key_check_sealed_for_store_without_one() {
        let manager = local_manager();
        manager.save("example.com", "ada", "hunter2").unwrap();

        // A store written before it carried a key check
        manager
            .db
            .with_connection(|conn| {
                conn.execute("DELETE FROM store_meta WHERE key = ?1", [META_KEY_CHECK])?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(
            manager.set_passphrase(Some("beta")),
            Err(VaultError::WrongPassphrase)
        ));
        assert!(manager.db.get_meta(META_KEY_CHECK).unwrap().is_none());

        manager.set_passphrase(Some("alpha")).unwrap();
        assert!(manager.db.get_meta(META_KEY_CHECK).unwrap().is_some());
    }

    #[test]
    fn test_failed_backend_delete_keeps_index() {
        let keyring = Arc::new(MemoryKeyring::default());
        let db = Database::open_in_memory(StoreKind::Credentials).unwrap();
        let backend = Arc::clone(&keyring);
        let manager = PasswordManager::with_platform(db, BackendChoice::Platform, move || {
            Ok(backend as Arc<dyn CredentialBackend>)
        })
        .unwrap();
        manager.save("example.com", "ada", "hunter2").unwrap();

        keyring.fail_remove.store(true, Ordering::Relaxed);
        assert!(matches!(
            manager.delete("example.com", "ada"),
            Err(VaultError::Backend(_))
        ));
        assert!(manager.has_credentials("example.com"));
        assert_eq!(manager.list_domains().unwrap(), vec!["example.com".to_string()]);
        assert_eq!(manager.get_one("example.com").unwrap().unwrap().secret, "hunter2");

        keyring.fail_remove.store(false, Ordering::Relaxed);
        manager.delete("example.com", "ada").unwrap();
        assert!(!manager.has_credentials("example.com"));
        assert!(manager.list_domains().unwrap().is_empty());
    }

    #[test]
    fn test_autofill() {
        let engine = ScriptedEngine::new();
        let handle = engine.create("https://example.com/login").unwrap();
        let manager = local_manager();

        assert!(!manager.autofill(&engine, &handle, "https://example.com").unwrap());

        manager.save("example.com", "ada", "hunter2").unwrap();
        assert!(manager.should_autofill("https://example.com/login"));
        assert!(manager.autofill(&engine, &handle, "https://example.com").unwrap());
        assert_eq!(
            engine.fills(),
            vec![(handle.id(), "ada".to_string(), "hunter2".to_string())]
        );

        manager.set_autofill_enabled(false);
        assert!(!manager.should_autofill("https://example.com"));
        assert!(!manager.autofill(&engine, &handle, "https://example.com").unwrap());
        assert_eq!(engine.fills().len(), 1);
    }

    #[test]
    fn test_empty_username_rejected() {
        let manager = local_manager();
        assert!(matches!(
            manager.save("example.com", "", "x"),
            Err(VaultError::EmptyUsername)
        ));
    }
}
