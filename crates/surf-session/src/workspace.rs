//! Workspace: a named group of sessions

use chrono::{DateTime, Utc};

use crate::session::Session;

pub const DEFAULT_WORKSPACE_NAME: &str = "Main";

#[derive(Debug)]
pub struct Workspace {
    /// Unique name within the topology
    pub name: String,
    sessions: Vec<Session>,
    active_session_index: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    /// New workspace holding a single overview session.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();

        Self {
            name: name.into(),
            sessions: vec![Session::overview()],
            active_session_index: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a workspace from stored records. Disposable sessions are
    /// dropped and an overview session is added if none remain.
    pub fn from_parts(
        name: String,
        sessions: Vec<Session>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let mut sessions: Vec<Session> =
            sessions.into_iter().filter(|s| !s.is_disposable()).collect();
        if sessions.is_empty() {
            sessions.push(Session::overview());
        }

        Self {
            name,
            sessions,
            active_session_index: 0,
            created_at,
            updated_at,
        }
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut [Session] {
        &mut self.sessions
    }

    pub fn session(&self, index: usize) -> Option<&Session> {
        self.sessions.get(index)
    }

    pub fn session_mut(&mut self, index: usize) -> Option<&mut Session> {
        self.sessions.get_mut(index)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn tab_count(&self) -> usize {
        self.sessions.iter().map(Session::tab_count).sum()
    }

    pub fn active_session_index(&self) -> usize {
        self.active_session_index
    }

    pub fn active_session(&self) -> &Session {
        &self.sessions[self.active_session_index]
    }

    pub fn active_session_mut(&mut self) -> &mut Session {
        &mut self.sessions[self.active_session_index]
    }

    /// Append a session and make it active. Returns its position. A
    /// disposable session being left is dropped first.
    pub fn add_session(&mut self, session: Session) -> usize {
        self.release_active_if_disposable();
        self.sessions.push(session);
        self.active_session_index = self.sessions.len() - 1;
        self.mark_updated();
        self.active_session_index
    }

    /// Remove the session at `index`. A workspace is never left without a
    /// session: removing the last one puts a fresh overview in its place.
    pub fn remove_session(&mut self, index: usize) -> Option<Session> {
        if index >= self.sessions.len() {
            return None;
        }

        let session = self.sessions.remove(index);

        if self.sessions.is_empty() {
            self.sessions.push(Session::overview());
            self.active_session_index = 0;
        } else if index < self.active_session_index
            || self.active_session_index >= self.sessions.len()
        {
            self.active_session_index = self.active_session_index.saturating_sub(1);
        }

        self.mark_updated();
        Some(session)
    }

    /// Drop the session at `index` if it has become disposable.
    pub fn remove_if_disposable(&mut self, index: usize) -> bool {
        if self.sessions.get(index).is_some_and(Session::is_disposable) {
            self.remove_session(index);
            true
        } else {
            false
        }
    }

    /// Make `index` the active session. The session being left is dropped
    /// if it is disposable, so an emptied session never lingers.
    pub fn set_active_session(&mut self, index: usize) -> bool {
        if index >= self.sessions.len() {
            return false;
        }

        let previous = self.active_session_index;
        self.active_session_index = index;
        if previous != index && self.sessions[previous].is_disposable() {
            self.sessions.remove(previous);
            if previous < index {
                self.active_session_index -= 1;
            }
            tracing::debug!(session = previous, "Removed empty session");
        }

        self.mark_updated();
        true
    }

    /// Drop the active session if it is disposable, e.g. when the workspace
    /// is left.
    pub fn release_active_if_disposable(&mut self) -> bool {
        self.remove_if_disposable(self.active_session_index)
    }

    /// Restore the active position without marking an update (used on load).
    pub fn restore_active(&mut self, index: usize) {
        if index < self.sessions.len() {
            self.active_session_index = index;
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.mark_updated();
    }

    /// Freshly created, never used: one empty overview session.
    pub fn is_pristine(&self) -> bool {
        self.sessions.len() == 1 && self.sessions[0].is_overview() && self.sessions[0].is_empty()
    }

    fn mark_updated(&mut self) {
        self.updated_at = Utc::now();
    }
}
