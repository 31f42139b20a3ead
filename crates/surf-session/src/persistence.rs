//! Encrypted session store
//!
//! `save_all` replaces the stored topology in a single transaction; `load_all`
//! rebuilds it with every tab unloaded. Under a passphrase the tab url, title
//! and snapshot path are sealed with the store's [`EncryptionContext`];
//! without one they are written as plain UTF-8.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use surf_crypto::{generate_salt, EncryptionContext, SALT_SIZE};
use surf_storage::{read_meta, write_meta, Database, StoreKind};
use surf_tabs::Tab;

use crate::error::PersistenceError;
use crate::recurring::RecurringTask;
use crate::session::Session;
use crate::topology::Topology;
use crate::workspace::Workspace;

pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

const META_ENCRYPTED: &str = "encrypted";
const META_KEY_CHECK: &str = "key_check";
const META_ACTIVE: &str = "active_state";

/// Sealed under the current key on every encrypted save; a wrong passphrase
/// fails to open it before any record is read.
const KEY_CHECK_TOKEN: &[u8] = b"surf:session-store:v1";

/// Active positions, stored alongside the records.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ActiveState {
    workspace: usize,
    sessions: Vec<usize>,
    tabs: Vec<Vec<usize>>,
}

/// Record fields ready to insert, already sealed when encrypted.
struct WorkspaceRow {
    name: String,
    created_at: i64,
    updated_at: i64,
    sessions: Vec<SessionRow>,
}

struct SessionRow {
    name: String,
    is_overview: bool,
    created_at: i64,
    updated_at: i64,
    tabs: Vec<TabRow>,
}

struct TabRow {
    url: Vec<u8>,
    title: Vec<u8>,
    snapshot_path: Option<Vec<u8>>,
    last_interaction: i64,
}

/// Shared state behind every clone of the manager and the autosave task.
#[derive(Clone)]
struct Store {
    db: Database,
    salt_path: Option<PathBuf>,
    context: Arc<RwLock<Option<EncryptionContext>>>,
    memory_salt: Arc<Mutex<Option<[u8; SALT_SIZE]>>>,
    save_lock: Arc<Mutex<()>>,
}

pub struct PersistenceManager {
    store: Store,
    autosave: Arc<RecurringTask>,
}

impl PersistenceManager {
    pub fn new(db: Database) -> Self {
        let salt_path = db.path().map(salt_path_for);

        Self {
            store: Store {
                db,
                salt_path,
                context: Arc::new(RwLock::new(None)),
                memory_salt: Arc::new(Mutex::new(None)),
                save_lock: Arc::new(Mutex::new(())),
            },
            autosave: Arc::new(RecurringTask::new("autosave")),
        }
    }

    /// Open (or create) the session store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> PersistenceResult<Self> {
        Ok(Self::new(Database::open(path, StoreKind::Sessions)?))
    }

    pub fn open_in_memory() -> PersistenceResult<Self> {
        Ok(Self::new(Database::open_in_memory(StoreKind::Sessions)?))
    }

    /// Location of the detached salt artifact, `None` for in-memory stores.
    pub fn salt_path(&self) -> Option<&Path> {
        self.store.salt_path.as_deref()
    }

    /// (Re)initialize the encryption context. `None` or an empty passphrase
    /// switches the store to plaintext mode for subsequent saves.
    pub fn set_passphrase(&self, passphrase: Option<&str>) -> PersistenceResult<()> {
        let context = match passphrase.filter(|p| !p.is_empty()) {
            Some(passphrase) => Some(self.store.derive_context(passphrase)?),
            None => None,
        };

        let encrypted = context.is_some();
        *self.store.context.write() = context;

        tracing::info!(encrypted, "Session store passphrase set");
        Ok(())
    }

    /// Whether saves will encrypt.
    pub fn has_passphrase(&self) -> bool {
        self.store.context.read().is_some()
    }

    /// Whether the store on disk was last written encrypted.
    pub fn store_is_encrypted(&self) -> PersistenceResult<bool> {
        self.store.store_is_encrypted()
    }

    /// Re-encrypt the store under a new passphrase. The current passphrase
    /// must open the existing store.
    pub fn change_passphrase(
        &self,
        topology: &Topology,
        new_passphrase: Option<&str>,
    ) -> PersistenceResult<()> {
        let _guard = self.store.save_lock.lock();
        let mut context = self.store.context.write();
        self.store.verify_key(context.as_ref())?;

        *context = match new_passphrase.filter(|p| !p.is_empty()) {
            Some(passphrase) => Some(self.store.derive_context(passphrase)?),
            None => None,
        };

        self.store.write_all(topology, context.as_ref())?;
        tracing::info!("Session store re-keyed");
        Ok(())
    }

    /// Replace the stored topology with `topology` in one transaction.
    pub fn save_all(&self, topology: &Topology) -> PersistenceResult<()> {
        self.store.save_all(topology)
    }

    /// Replace `topology` with the stored one and return the previous tree
    /// so its render handles can be released. On error `topology` is left
    /// untouched.
    pub fn load_all(&self, topology: &mut Topology) -> PersistenceResult<Topology> {
        let loaded = self.load_topology()?;
        Ok(std::mem::replace(topology, loaded))
    }

    /// Build a topology from the store. An empty store yields the default
    /// workspace with its overview session.
    pub fn load_topology(&self) -> PersistenceResult<Topology> {
        self.store.load_topology()
    }

    /// Save `topology` every `interval_secs`. Zero disables autosave.
    pub fn enable_autosave(&self, topology: Arc<RwLock<Topology>>, interval_secs: u64) -> bool {
        if interval_secs == 0 {
            self.disable_autosave();
            return false;
        }

        let store = self.store.clone();
        self.autosave
            .start(Duration::from_secs(interval_secs), move || {
                let topology = topology.read();
                if let Err(e) = store.save_all(&topology) {
                    tracing::warn!(error = %e, "Autosave failed");
                }
            })
    }

    pub fn disable_autosave(&self) {
        self.autosave.stop();
    }

    pub fn autosave_enabled(&self) -> bool {
        self.autosave.is_running()
    }

    /// Stop autosave and drop the key. The context zeroes its key on drop.
    pub fn close(&self) {
        self.disable_autosave();
        *self.store.context.write() = None;
        tracing::debug!("Session store closed");
    }
}

impl Clone for PersistenceManager {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            autosave: Arc::clone(&self.autosave),
        }
    }
}

impl Store {
    fn derive_context(&self, passphrase: &str) -> PersistenceResult<EncryptionContext> {
        let context = match &self.salt_path {
            Some(path) => EncryptionContext::from_salt_file(passphrase, path)?,
            None => {
                let salt = *self.memory_salt.lock().get_or_insert_with(generate_salt);
                EncryptionContext::derive(passphrase, salt)?
            }
        };
        Ok(context)
    }

    fn store_is_encrypted(&self) -> PersistenceResult<bool> {
        let flag = self.db.get_meta(META_ENCRYPTED)?;
        Ok(flag.is_some_and(|v| v.first() == Some(&1)))
    }

    /// An encrypted store must be opened by the current key before it is
    /// read or overwritten.
    fn verify_key(&self, context: Option<&EncryptionContext>) -> PersistenceResult<()> {
        if !self.store_is_encrypted()? {
            return Ok(());
        }

        let Some(context) = context else {
            return Err(PersistenceError::Locked);
        };

        let check = self.db.get_meta(META_KEY_CHECK)?.ok_or_else(|| {
            PersistenceError::MalformedRecord("encrypted store has no key check".to_string())
        })?;

        match context.decrypt(&check) {
            Ok(token) if token == KEY_CHECK_TOKEN => Ok(()),
            _ => Err(PersistenceError::Decryption),
        }
    }

    /// Verify and write under one read of the context, so a concurrent
    /// `set_passphrase` cannot swap the key in between.
    fn save_all(&self, topology: &Topology) -> PersistenceResult<()> {
        let _guard = self.save_lock.lock();
        let context = self.context.read();
        self.verify_key(context.as_ref())?;
        self.write_all(topology, context.as_ref())
    }

    /// Caller holds the save lock and has verified `context`.
    fn write_all(
        &self,
        topology: &Topology,
        context: Option<&EncryptionContext>,
    ) -> PersistenceResult<()> {
        let rows = if topology.is_default() {
            Vec::new()
        } else {
            encode_topology(topology, context)?
        };
        let active = serde_json::to_vec(&active_state(topology))?;
        let key_check = context.map(|c| c.encrypt(KEY_CHECK_TOKEN)).transpose()?;

        let result = self.db.transaction(|conn| {
            conn.execute("DELETE FROM tabs", [])?;
            conn.execute("DELETE FROM sessions", [])?;
            conn.execute("DELETE FROM workspaces", [])?;

            insert_rows(conn, &rows)?;

            write_meta(conn, META_ENCRYPTED, &[key_check.is_some() as u8])?;
            match &key_check {
                Some(check) => write_meta(conn, META_KEY_CHECK, check)?,
                None => {
                    conn.execute("DELETE FROM store_meta WHERE key = ?1", [META_KEY_CHECK])?;
                }
            }
            write_meta(conn, META_ACTIVE, &active)?;
            Ok(())
        });

        match result {
            Ok(()) => {
                tracing::info!(
                    workspaces = rows.len(),
                    tabs = topology.total_tab_count(),
                    encrypted = key_check.is_some(),
                    "Saved topology"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Saving topology failed; store unchanged");
                Err(e.into())
            }
        }
    }

    fn load_topology(&self) -> PersistenceResult<Topology> {
        let context = self.context.read();
        let context = context.as_ref();
        self.verify_key(context)?;

        let (rows, active) = self.db.with_connection(|conn| {
            let rows = read_rows(conn)?;
            let active = read_meta(conn, META_ACTIVE)?;
            Ok((rows, active))
        })?;

        let workspaces = rows
            .into_iter()
            .map(|ws| decode_workspace(ws, context))
            .collect::<PersistenceResult<Vec<_>>>()?;

        let mut topology = Topology::from_workspaces(workspaces);
        if let Some(active) = active {
            match serde_json::from_slice::<ActiveState>(&active) {
                Ok(state) => restore_active(&mut topology, &state),
                Err(e) => tracing::warn!(error = %e, "Ignoring unreadable active state"),
            }
        }

        tracing::info!(
            workspaces = topology.workspace_count(),
            tabs = topology.total_tab_count(),
            "Loaded topology"
        );
        Ok(topology)
    }
}

/// `<store path>.salt`
fn salt_path_for(db_path: &Path) -> PathBuf {
    let mut path = OsString::from(db_path.as_os_str());
    path.push(".salt");
    PathBuf::from(path)
}

fn seal(context: Option<&EncryptionContext>, text: &str) -> PersistenceResult<Vec<u8>> {
    match context {
        Some(context) => Ok(context.encrypt_str(text)?),
        None => Ok(text.as_bytes().to_vec()),
    }
}

fn open(context: Option<&EncryptionContext>, blob: &[u8]) -> PersistenceResult<String> {
    match context {
        Some(context) => context
            .decrypt_str(blob)
            .map_err(|_| PersistenceError::Decryption),
        None => String::from_utf8(blob.to_vec())
            .map_err(|_| PersistenceError::MalformedRecord("text field is not UTF-8".to_string())),
    }
}

/// The sessions of `ws` that get stored, and the active position among
/// them. Disposable sessions are skipped so stored positions line up with
/// what a load rebuilds.
fn stored_sessions(ws: &Workspace) -> (Vec<&Session>, usize) {
    let active = ws.active_session_index();
    let skipped_before = ws.sessions()[..active]
        .iter()
        .filter(|s| s.is_disposable())
        .count();

    let kept: Vec<&Session> = ws.sessions().iter().filter(|s| !s.is_disposable()).collect();
    let index = (active - skipped_before).min(kept.len().saturating_sub(1));
    (kept, index)
}

fn encode_topology(
    topology: &Topology,
    context: Option<&EncryptionContext>,
) -> PersistenceResult<Vec<WorkspaceRow>> {
    topology
        .workspaces()
        .iter()
        .map(|ws| {
            let sessions = stored_sessions(ws)
                .0
                .into_iter()
                .map(|s| encode_session(s, context))
                .collect::<PersistenceResult<Vec<_>>>()?;

            Ok(WorkspaceRow {
                name: ws.name.clone(),
                created_at: ws.created_at.timestamp(),
                updated_at: ws.updated_at.timestamp(),
                sessions,
            })
        })
        .collect()
}

fn encode_session(
    session: &Session,
    context: Option<&EncryptionContext>,
) -> PersistenceResult<SessionRow> {
    let tabs = session
        .tabs()
        .iter()
        .map(|tab| {
            let snapshot_path = tab
                .snapshot_path
                .as_ref()
                .map(|p| seal(context, &p.to_string_lossy()))
                .transpose()?;

            Ok(TabRow {
                url: seal(context, &tab.url)?,
                title: seal(context, &tab.title)?,
                snapshot_path,
                last_interaction: tab.last_interaction_at().timestamp(),
            })
        })
        .collect::<PersistenceResult<Vec<_>>>()?;

    Ok(SessionRow {
        name: session.name.clone(),
        is_overview: session.is_overview(),
        created_at: session.created_at.timestamp(),
        updated_at: session.updated_at.timestamp(),
        tabs,
    })
}

fn insert_rows(conn: &Connection, rows: &[WorkspaceRow]) -> surf_storage::Result<()> {
    let mut insert_workspace = conn.prepare(
        "INSERT INTO workspaces (name, created_at, updated_at) VALUES (?1, ?2, ?3)",
    )?;
    let mut insert_session = conn.prepare(
        "INSERT INTO sessions (workspace_id, name, is_overview, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut insert_tab = conn.prepare(
        "INSERT INTO tabs (session_id, url, title, snapshot_path, last_interaction, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    for ws in rows {
        let workspace_id =
            insert_workspace.insert(params![ws.name, ws.created_at, ws.updated_at])?;

        for session in &ws.sessions {
            let session_id = insert_session.insert(params![
                workspace_id,
                session.name,
                session.is_overview as i32,
                session.created_at,
                session.updated_at,
            ])?;

            for (position, tab) in session.tabs.iter().enumerate() {
                insert_tab.execute(params![
                    session_id,
                    tab.url,
                    tab.title,
                    tab.snapshot_path,
                    tab.last_interaction,
                    position as i64,
                ])?;
            }
        }
    }

    Ok(())
}

fn read_rows(conn: &Connection) -> surf_storage::Result<Vec<WorkspaceRow>> {
    let mut workspaces_stmt =
        conn.prepare("SELECT id, name, created_at, updated_at FROM workspaces ORDER BY id")?;
    let mut sessions_stmt = conn.prepare(
        "SELECT id, name, is_overview, created_at, updated_at
         FROM sessions WHERE workspace_id = ?1 ORDER BY id",
    )?;
    let mut tabs_stmt = conn.prepare(
        "SELECT url, title, snapshot_path, last_interaction
         FROM tabs WHERE session_id = ?1 ORDER BY position",
    )?;

    let workspaces = workspaces_stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut rows = Vec::with_capacity(workspaces.len());
    for (workspace_id, name, created_at, updated_at) in workspaces {
        let sessions = sessions_stmt
            .query_map([workspace_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)? != 0,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut session_rows = Vec::with_capacity(sessions.len());
        for (session_id, name, is_overview, created_at, updated_at) in sessions {
            let tabs = tabs_stmt
                .query_map([session_id], |row| {
                    Ok(TabRow {
                        url: row.get(0)?,
                        title: row.get(1)?,
                        snapshot_path: row.get(2)?,
                        last_interaction: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            session_rows.push(SessionRow {
                name,
                is_overview,
                created_at,
                updated_at,
                tabs,
            });
        }

        rows.push(WorkspaceRow {
            name,
            created_at,
            updated_at,
            sessions: session_rows,
        });
    }

    Ok(rows)
}

fn timestamp(secs: i64) -> PersistenceResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| PersistenceError::MalformedRecord(format!("timestamp out of range: {}", secs)))
}

fn decode_workspace(
    row: WorkspaceRow,
    context: Option<&EncryptionContext>,
) -> PersistenceResult<Workspace> {
    let sessions = row
        .sessions
        .into_iter()
        .map(|s| decode_session(s, context))
        .collect::<PersistenceResult<Vec<_>>>()?;

    Ok(Workspace::from_parts(
        row.name,
        sessions,
        timestamp(row.created_at)?,
        timestamp(row.updated_at)?,
    ))
}

fn decode_session(
    row: SessionRow,
    context: Option<&EncryptionContext>,
) -> PersistenceResult<Session> {
    let tabs = row
        .tabs
        .into_iter()
        .map(|t| {
            let snapshot_path = t
                .snapshot_path
                .map(|p| open(context, &p).map(PathBuf::from))
                .transpose()?;

            Ok(Tab::rehydrate(
                open(context, &t.url)?,
                open(context, &t.title)?,
                snapshot_path,
                timestamp(t.last_interaction)?,
            ))
        })
        .collect::<PersistenceResult<Vec<_>>>()?;

    Ok(Session::from_parts(
        row.name,
        row.is_overview,
        tabs,
        timestamp(row.created_at)?,
        timestamp(row.updated_at)?,
    ))
}

fn active_state(topology: &Topology) -> ActiveState {
    let mut state = ActiveState {
        workspace: topology.active_workspace_index(),
        ..ActiveState::default()
    };

    for ws in topology.workspaces() {
        let (kept, active) = stored_sessions(ws);
        state.sessions.push(active);
        state
            .tabs
            .push(kept.into_iter().map(Session::active_index).collect());
    }
    state
}

fn restore_active(topology: &mut Topology, state: &ActiveState) {
    for (w, ws) in topology.workspaces_mut().iter_mut().enumerate() {
        if let Some(tab_positions) = state.tabs.get(w) {
            for (s, session) in ws.sessions_mut().iter_mut().enumerate() {
                if let Some(&index) = tab_positions.get(s) {
                    session.restore_active(index);
                }
            }
        }
        if let Some(&index) = state.sessions.get(w) {
            ws.restore_active(index);
        }
    }
    topology.restore_active_workspace(state.workspace);
}

#[cfg(test)]
mod tests {
    use super::*;
    use surf_tabs::testing::ScriptedEngine;
    use surf_tabs::RenderEventKind;

    fn sample_topology() -> Topology {
        let mut topology = Topology::new();
        topology.new_tab("https://overview.example").unwrap();
        topology.add_session("Reading").unwrap();
        topology.new_tab("https://a.example").unwrap();
        topology.new_tab("https://b.example").unwrap();
        topology
            .current_tab_mut()
            .unwrap()
            .apply_event(&RenderEventKind::TitleChanged("B".to_string()));
        topology.switch_tab(0).unwrap();
        topology
    }

    fn urls(topology: &Topology) -> Vec<String> {
        topology.tabs().map(|t| t.url.clone()).collect()
    }

    #[test]
    fn test_roundtrip_plaintext() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        let topology = sample_topology();
        manager.save_all(&topology).unwrap();

        let loaded = manager.load_topology().unwrap();
        assert_eq!(urls(&loaded), urls(&topology));
        assert_eq!(loaded.workspace_count(), 1);
        assert_eq!(loaded.current_workspace().session_count(), 2);
        assert_eq!(loaded.current_workspace().active_session_index(), 1);
        assert_eq!(loaded.current_session().name, "Reading");
        assert_eq!(loaded.current_session().active_index(), 0);
        assert_eq!(loaded.current_session().tab(1).unwrap().title, "B");
        assert!(loaded.tabs().all(|t| t.is_unloaded()));
        assert!(!manager.store_is_encrypted().unwrap());
    }

    #[test]
    fn test_empty_session_does_not_shift_active_positions() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        let mut topology = Topology::new();
        topology.new_tab("https://overview.example").unwrap();
        topology.add_session("Draft").unwrap();
        topology.new_tab("https://draft.example").unwrap();
        topology.add_session("Work").unwrap();
        topology.new_tab("https://c.example").unwrap();
        topology.new_tab("https://d.example").unwrap();
        topology.switch_tab(0).unwrap();

        // "Draft" emptied in place, ahead of the active session
        let draft = topology.current_workspace_mut().session_mut(1).unwrap();
        draft.remove_tab(0).unwrap();
        assert!(draft.is_disposable());

        manager.save_all(&topology).unwrap();
        let loaded = manager.load_topology().unwrap();

        assert_eq!(loaded.current_workspace().session_count(), 2);
        assert_eq!(loaded.current_workspace().active_session_index(), 1);
        assert_eq!(loaded.current_session().name, "Work");
        assert_eq!(loaded.current_session().active_index(), 0);
        assert_eq!(loaded.current_tab().unwrap().url, "https://c.example");
    }

    #[test]
    fn test_active_empty_session_is_not_stored() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        let mut topology = Topology::new();
        topology.new_tab("https://overview.example").unwrap();
        topology.add_session("Work").unwrap();
        topology.new_tab("https://a.example").unwrap();
        topology.new_tab("https://b.example").unwrap();
        topology.switch_tab(1).unwrap();
        topology.add_session("Empty").unwrap();

        manager.save_all(&topology).unwrap();
        let loaded = manager.load_topology().unwrap();

        assert_eq!(loaded.current_workspace().session_count(), 2);
        assert_eq!(loaded.current_session().name, "Work");
        assert_eq!(loaded.current_session().active_index(), 1);
    }

    #[test]
    fn test_failed_save_keeps_previous_topology() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        manager.save_all(&sample_topology()).unwrap();

        manager
            .store
            .db
            .with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_tab BEFORE INSERT ON tabs
                     WHEN NEW.position = 2
                     BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                )?;
                Ok(())
            })
            .unwrap();

        let mut bigger = sample_topology();
        bigger.new_tab("https://c.example").unwrap();
        assert!(matches!(
            manager.save_all(&bigger),
            Err(PersistenceError::Storage(_))
        ));

        let loaded = manager.load_topology().unwrap();
        assert_eq!(urls(&loaded), urls(&sample_topology()));
        assert_eq!(loaded.current_session().name, "Reading");
    }

    #[test]
    fn test_loaded_tabs_rehydrate_unloaded() {
        let engine = ScriptedEngine::new();
        let manager = PersistenceManager::open_in_memory().unwrap();
        let mut topology = sample_topology();
        topology.current_tab_mut().unwrap().show(&engine).unwrap();
        manager.save_all(&topology).unwrap();

        let old = manager.load_all(&mut topology).unwrap();
        assert_eq!(old.loaded_tab_count(), 1);
        assert_eq!(topology.loaded_tab_count(), 0);
        assert_eq!(engine.live_count(), 1);
    }

    #[test]
    fn test_empty_store_loads_default() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        let topology = manager.load_topology().unwrap();
        assert!(topology.is_default());
    }

    #[test]
    fn test_default_topology_is_elided() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        manager.save_all(&sample_topology()).unwrap();
        manager.save_all(&Topology::new()).unwrap();

        let count = manager
            .store
            .db
            .with_connection(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM workspaces", [], |r| r.get(0))?;
                Ok(n)
            })
            .unwrap();
        assert_eq!(count, 0);
        assert!(manager.load_topology().unwrap().is_default());
    }

    #[test]
    fn test_encrypted_fields_are_sealed() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        manager.set_passphrase(Some("alpha")).unwrap();
        manager.save_all(&sample_topology()).unwrap();
        assert!(manager.store_is_encrypted().unwrap());

        let blobs: Vec<Vec<u8>> = manager
            .store
            .db
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT url FROM tabs")?;
                let rows = stmt
                    .query_map([], |r| r.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .unwrap();
        assert_eq!(blobs.len(), 3);
        for blob in blobs {
            assert!(!blob.windows(7).any(|w| w == b"example"));
        }

        assert_eq!(urls(&manager.load_topology().unwrap()), urls(&sample_topology()));
    }

    #[test]
    fn test_wrong_passphrase_fails_and_leaves_topology() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        manager.set_passphrase(Some("alpha")).unwrap();
        manager.save_all(&sample_topology()).unwrap();

        manager.set_passphrase(Some("beta")).unwrap();
        let mut topology = Topology::new();
        topology.new_tab("https://unsaved.example").unwrap();

        let err = manager.load_all(&mut topology).unwrap_err();
        assert!(matches!(err, PersistenceError::Decryption));
        assert!(err.needs_passphrase());
        assert_eq!(urls(&topology), vec!["https://unsaved.example".to_string()]);

        // Nor may the wrong key overwrite the store
        assert!(matches!(
            manager.save_all(&topology),
            Err(PersistenceError::Decryption)
        ));

        manager.set_passphrase(Some("alpha")).unwrap();
        manager.load_all(&mut topology).unwrap();
        assert_eq!(topology.total_tab_count(), 3);
    }

    #[test]
    fn test_encrypted_store_without_passphrase_is_locked() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        manager.set_passphrase(Some("alpha")).unwrap();
        manager.save_all(&sample_topology()).unwrap();

        manager.set_passphrase(None).unwrap();
        assert!(matches!(
            manager.load_topology(),
            Err(PersistenceError::Locked)
        ));
    }

    #[test]
    fn test_change_passphrase() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        let topology = sample_topology();
        manager.set_passphrase(Some("alpha")).unwrap();
        manager.save_all(&topology).unwrap();

        manager.change_passphrase(&topology, None).unwrap();
        assert!(!manager.store_is_encrypted().unwrap());
        assert_eq!(urls(&manager.load_topology().unwrap()), urls(&topology));

        manager.change_passphrase(&topology, Some("gamma")).unwrap();
        manager.set_passphrase(Some("alpha")).unwrap();
        assert!(manager.load_topology().is_err());
        manager.set_passphrase(Some("gamma")).unwrap();
        assert!(manager.load_topology().is_ok());
    }

    #[test]
    fn test_salt_artifact_next_to_store() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sessions.db");
        let manager = PersistenceManager::open(&db_path).unwrap();
        assert_eq!(manager.salt_path(), Some(dir.path().join("sessions.db.salt").as_path()));

        manager.set_passphrase(Some("alpha")).unwrap();
        assert!(dir.path().join("sessions.db.salt").exists());
    }

    #[test]
    fn test_snapshot_path_roundtrip() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        manager.set_passphrase(Some("alpha")).unwrap();
        let mut topology = sample_topology();
        topology.current_tab_mut().unwrap().snapshot_path =
            Some(PathBuf::from("/tmp/snapshots/abc_1.png"));
        manager.save_all(&topology).unwrap();

        let loaded = manager.load_topology().unwrap();
        assert_eq!(
            loaded.current_tab().unwrap().snapshot_path.as_deref(),
            Some(Path::new("/tmp/snapshots/abc_1.png"))
        );
    }

    #[test]
    fn test_close_drops_key() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        manager.set_passphrase(Some("alpha")).unwrap();
        assert!(manager.has_passphrase());
        manager.close();
        assert!(!manager.has_passphrase());
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_writes_periodically() {
        let manager = PersistenceManager::open_in_memory().unwrap();
        let topology = Arc::new(RwLock::new(sample_topology()));

        assert!(manager.enable_autosave(Arc::clone(&topology), 30));
        assert!(manager.autosave_enabled());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(manager.load_topology().unwrap().total_tab_count(), 3);

        topology.write().new_tab("https://later.example").unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(manager.load_topology().unwrap().total_tab_count(), 4);

        manager.disable_autosave();
        assert!(!manager.autosave_enabled());
        assert!(!manager.enable_autosave(topology, 0));
    }
}
