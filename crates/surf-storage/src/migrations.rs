//! Database migrations
//!
//! Session store: workspaces, sessions, tabs, store_meta.
//! Credential store: credential_index, credential_secrets, store_meta.

use crate::database::StoreKind;
use crate::Result;
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 1;

pub fn run_migrations(conn: &Connection, kind: StoreKind) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        match kind {
            StoreKind::Sessions => migrate_sessions_v1(conn)?,
            StoreKind::Credentials => migrate_credentials_v1(conn)?,
        }
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let result: std::result::Result<i32, _> =
        conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        });

    match result {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(rusqlite::Error::SqliteFailure(_, _)) => {
            // Table doesn't exist yet
            conn.execute(
                "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
                [],
            )?;
            conn.execute("INSERT INTO schema_version (version) VALUES (0)", [])?;
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

fn create_meta_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL
        );
    "#,
    )?;
    Ok(())
}

fn migrate_sessions_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Running session store migration v1: Initial schema");

    create_meta_table(conn)?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS workspaces (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
    "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            workspace_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            is_overview INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (workspace_id) REFERENCES workspaces(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_workspace ON sessions(workspace_id);
    "#,
    )?;

    // url, title and snapshot_path hold ciphertext when a passphrase is set
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tabs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL,
            url BLOB NOT NULL,
            title BLOB NOT NULL,
            snapshot_path BLOB,
            last_interaction INTEGER NOT NULL,
            position INTEGER NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_tabs_session ON tabs(session_id);
    "#,
    )?;

    Ok(())
}

fn migrate_credentials_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Running credential store migration v1: Initial schema");

    create_meta_table(conn)?;

    // Non-secret metadata, mirrored for every backend
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS credential_index (
            domain TEXT NOT NULL,
            username TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            last_used_at INTEGER NOT NULL,
            PRIMARY KEY (domain, username)
        );

        CREATE INDEX IF NOT EXISTS idx_credential_index_domain ON credential_index(domain);
    "#,
    )?;

    // Secrets for the local fallback backend, always encrypted
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS credential_secrets (
            domain TEXT NOT NULL,
            username TEXT NOT NULL,
            secret BLOB NOT NULL,
            PRIMARY KEY (domain, username)
        );
    "#,
    )?;

    Ok(())
}
