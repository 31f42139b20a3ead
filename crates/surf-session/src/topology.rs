//! Topology: Workspace → Session → Tab
//!
//! Owns every workspace and keeps the structural invariants: there is always
//! at least one workspace, every workspace has at least one session, and an
//! empty non-overview session is removed as soon as its last tab closes.

use serde::Serialize;

use surf_tabs::{RenderEvent, Tab};

use crate::error::SessionError;
use crate::session::Session;
use crate::workspace::{Workspace, DEFAULT_WORKSPACE_NAME};
use crate::Result;

#[derive(Debug)]
pub struct Topology {
    workspaces: Vec<Workspace>,
    active_workspace_index: usize,
}

/// Serializable view of the topology for the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct TopologySummary {
    pub active_workspace: usize,
    pub workspaces: Vec<WorkspaceSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceSummary {
    pub name: String,
    pub active_session: usize,
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub name: String,
    pub is_overview: bool,
    pub active_tab: usize,
    pub tabs: Vec<TabSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TabSummary {
    pub id: String,
    pub url: String,
    pub title: String,
    pub loaded: bool,
}

impl Topology {
    /// A topology with the default workspace and its overview session.
    pub fn new() -> Self {
        Self {
            workspaces: vec![Workspace::new(DEFAULT_WORKSPACE_NAME)],
            active_workspace_index: 0,
        }
    }

    /// Build from loaded workspaces, falling back to the default one.
    pub fn from_workspaces(workspaces: Vec<Workspace>) -> Self {
        let mut topology = Self {
            workspaces,
            active_workspace_index: 0,
        };
        topology.ensure_default_workspace();
        topology
    }

    fn ensure_default_workspace(&mut self) {
        if self.workspaces.is_empty() {
            self.workspaces.push(Workspace::new(DEFAULT_WORKSPACE_NAME));
            self.active_workspace_index = 0;
        }
    }

    /// Drop everything and start over with the default workspace. Returns the
    /// previous workspaces so the caller can release their render handles.
    pub fn reset(&mut self) -> Vec<Workspace> {
        let old = std::mem::take(&mut self.workspaces);
        self.active_workspace_index = 0;
        self.ensure_default_workspace();
        old
    }

    /// True for a fresh default topology that holds nothing worth saving.
    pub fn is_default(&self) -> bool {
        self.workspaces.len() == 1
            && self.workspaces[0].name == DEFAULT_WORKSPACE_NAME
            && self.workspaces[0].is_pristine()
    }

    // Workspaces

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    pub fn workspace(&self, index: usize) -> Option<&Workspace> {
        self.workspaces.get(index)
    }

    pub fn workspace_count(&self) -> usize {
        self.workspaces.len()
    }

    pub fn active_workspace_index(&self) -> usize {
        self.active_workspace_index
    }

    pub fn current_workspace(&self) -> &Workspace {
        &self.workspaces[self.active_workspace_index]
    }

    pub fn current_workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspaces[self.active_workspace_index]
    }

    /// Add a workspace (with its overview session). Names must be unique.
    pub fn add_workspace(&mut self, name: &str) -> Result<usize> {
        let name = self.check_workspace_name(name, None)?;
        self.workspaces.push(Workspace::new(name));

        let index = self.workspaces.len() - 1;
        tracing::info!(workspace = index, "Created workspace");
        Ok(index)
    }

    /// Close a workspace and everything in it. The last workspace stays.
    pub fn close_workspace(&mut self, index: usize) -> Result<Workspace> {
        if index >= self.workspaces.len() {
            return Err(SessionError::WorkspaceNotFound(index));
        }
        if self.workspaces.len() == 1 {
            return Err(SessionError::CannotCloseLastWorkspace);
        }

        let workspace = self.workspaces.remove(index);
        if index < self.active_workspace_index
            || self.active_workspace_index >= self.workspaces.len()
        {
            self.active_workspace_index = self.active_workspace_index.saturating_sub(1);
        }

        tracing::info!(workspace = index, "Closed workspace");
        Ok(workspace)
    }

    pub fn rename_workspace(&mut self, index: usize, name: &str) -> Result<()> {
        if index >= self.workspaces.len() {
            return Err(SessionError::WorkspaceNotFound(index));
        }
        let name = self.check_workspace_name(name, Some(index))?;
        self.workspaces[index].rename(name);
        Ok(())
    }

    pub fn switch_workspace(&mut self, index: usize) -> Result<()> {
        if index >= self.workspaces.len() {
            return Err(SessionError::WorkspaceNotFound(index));
        }
        self.enter_workspace(index);
        Ok(())
    }

    pub fn next_workspace(&mut self) -> usize {
        self.enter_workspace((self.active_workspace_index + 1) % self.workspaces.len());
        self.active_workspace_index
    }

    pub fn previous_workspace(&mut self) -> usize {
        self.enter_workspace(wrap_back(self.active_workspace_index, self.workspaces.len()));
        self.active_workspace_index
    }

    /// The workspace being left drops its active session if it was never
    /// given a tab.
    fn enter_workspace(&mut self, index: usize) {
        if index != self.active_workspace_index
            && self.current_workspace_mut().release_active_if_disposable()
        {
            tracing::debug!(workspace = self.active_workspace_index, "Removed empty session");
        }
        self.active_workspace_index = index;
    }

    fn check_workspace_name(&self, name: &str, skip: Option<usize>) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyName);
        }

        let taken = self
            .workspaces
            .iter()
            .enumerate()
            .any(|(i, ws)| Some(i) != skip && ws.name == name);
        if taken {
            return Err(SessionError::DuplicateName(name.to_string()));
        }

        Ok(name.to_string())
    }

    // Sessions (within the current workspace)

    pub fn current_session(&self) -> &Session {
        self.current_workspace().active_session()
    }

    pub fn current_session_mut(&mut self) -> &mut Session {
        self.current_workspace_mut().active_session_mut()
    }

    /// Add a session to the current workspace and make it active.
    pub fn add_session(&mut self, name: &str) -> Result<usize> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        let index = self.current_workspace_mut().add_session(Session::new(name));
        tracing::info!(session = index, "Created session");
        Ok(index)
    }

    /// Close a session of the current workspace with all its tabs.
    pub fn close_session(&mut self, index: usize) -> Result<Session> {
        let workspace = self.current_workspace_mut();
        match workspace.session(index) {
            None => return Err(SessionError::SessionNotFound(index)),
            Some(s) if s.is_overview() => return Err(SessionError::CannotCloseOverview),
            Some(_) => {}
        }

        workspace
            .remove_session(index)
            .ok_or(SessionError::SessionNotFound(index))
    }

    pub fn rename_session(&mut self, index: usize, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        let session = self
            .current_workspace_mut()
            .session_mut(index)
            .ok_or(SessionError::SessionNotFound(index))?;
        session.rename(name);
        Ok(())
    }

    pub fn switch_session(&mut self, index: usize) -> Result<()> {
        if self.current_workspace_mut().set_active_session(index) {
            Ok(())
        } else {
            Err(SessionError::SessionNotFound(index))
        }
    }

    /// Cycle forward through the current workspace's sessions. Returns the
    /// new active position, which accounts for an empty session dropped on
    /// the way out.
    pub fn next_session(&mut self) -> usize {
        let ws = self.current_workspace_mut();
        let next = (ws.active_session_index() + 1) % ws.session_count();
        ws.set_active_session(next);
        ws.active_session_index()
    }

    pub fn previous_session(&mut self) -> usize {
        let ws = self.current_workspace_mut();
        let prev = wrap_back(ws.active_session_index(), ws.session_count());
        ws.set_active_session(prev);
        ws.active_session_index()
    }

    // Tabs (within the current session)

    pub fn current_tab(&self) -> Option<&Tab> {
        self.current_session().active_tab()
    }

    pub fn current_tab_mut(&mut self) -> Option<&mut Tab> {
        self.current_session_mut().active_tab_mut()
    }

    /// Open a tab in the current session and make it active.
    pub fn new_tab(&mut self, url: &str) -> Result<usize> {
        let tab = Tab::new(url)?;
        tracing::info!(tab_id = %tab.id, url = %tab.url, "Created tab");
        Ok(self.current_session_mut().add_tab(tab))
    }

    /// Close a tab of the current session. An emptied non-overview session is
    /// removed in the same step. The tab is returned so its handle and
    /// snapshot can be released.
    pub fn close_tab_at(&mut self, index: usize) -> Result<Tab> {
        let workspace = self.current_workspace_mut();
        let session_index = workspace.active_session_index();

        let tab = workspace
            .active_session_mut()
            .remove_tab(index)
            .ok_or(SessionError::TabNotFound(index))?;

        if workspace.remove_if_disposable(session_index) {
            tracing::debug!(session = session_index, "Removed empty session");
        }

        tracing::info!(tab_id = %tab.id, "Closed tab");
        Ok(tab)
    }

    pub fn close_current_tab(&mut self) -> Option<Tab> {
        let index = self.current_session().active_index();
        self.close_tab_at(index).ok()
    }

    pub fn switch_tab(&mut self, index: usize) -> Result<()> {
        if self.current_session_mut().set_active(index) {
            Ok(())
        } else {
            Err(SessionError::TabNotFound(index))
        }
    }

    /// Cycle forward through the current session's tabs.
    pub fn next_tab(&mut self) -> Option<usize> {
        let session = self.current_session_mut();
        if session.is_empty() {
            return None;
        }
        let next = (session.active_index() + 1) % session.tab_count();
        session.set_active(next);
        Some(next)
    }

    pub fn previous_tab(&mut self) -> Option<usize> {
        let session = self.current_session_mut();
        if session.is_empty() {
            return None;
        }
        let prev = wrap_back(session.active_index(), session.tab_count());
        session.set_active(prev);
        Some(prev)
    }

    pub fn move_tab(&mut self, from: usize, to: usize) -> Result<()> {
        if self.current_session_mut().move_tab(from, to) {
            Ok(())
        } else {
            Err(SessionError::TabNotFound(from))
        }
    }

    // Whole-tree queries

    pub fn total_tab_count(&self) -> usize {
        self.workspaces.iter().map(Workspace::tab_count).sum()
    }

    pub fn loaded_tab_count(&self) -> usize {
        self.tabs().filter(|t| t.is_loaded()).count()
    }

    pub fn tabs(&self) -> impl Iterator<Item = &Tab> {
        self.workspaces
            .iter()
            .flat_map(|ws| ws.sessions().iter())
            .flat_map(|s| s.tabs().iter())
    }

    pub fn tabs_mut(&mut self) -> impl Iterator<Item = &mut Tab> {
        self.workspaces
            .iter_mut()
            .flat_map(|ws| ws.sessions_mut().iter_mut())
            .flat_map(|s| s.tabs_mut().iter_mut())
    }

    pub fn tab_by_handle_mut(&mut self, handle_id: u64) -> Option<&mut Tab> {
        self.tabs_mut().find(|t| t.owns_handle(handle_id))
    }

    /// Route a title/url notification to the tab owning the handle.
    pub fn apply_render_event(&mut self, event: &RenderEvent) -> bool {
        match self.tab_by_handle_mut(event.handle_id) {
            Some(tab) => {
                tab.apply_event(&event.kind);
                true
            }
            None => false,
        }
    }

    pub fn summary(&self) -> TopologySummary {
        TopologySummary {
            active_workspace: self.active_workspace_index,
            workspaces: self
                .workspaces
                .iter()
                .map(|ws| WorkspaceSummary {
                    name: ws.name.clone(),
                    active_session: ws.active_session_index(),
                    sessions: ws
                        .sessions()
                        .iter()
                        .map(|s| SessionSummary {
                            name: s.name.clone(),
                            is_overview: s.is_overview(),
                            active_tab: s.active_index(),
                            tabs: s
                                .tabs()
                                .iter()
                                .map(|t| TabSummary {
                                    id: t.id.clone(),
                                    url: t.url.clone(),
                                    title: t.display_title().to_string(),
                                    loaded: t.is_loaded(),
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Restore the active positions after a load.
    pub(crate) fn restore_active_workspace(&mut self, index: usize) {
        if index < self.workspaces.len() {
            self.active_workspace_index = index;
        }
    }

    pub(crate) fn workspaces_mut(&mut self) -> &mut [Workspace] {
        &mut self.workspaces
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

fn wrap_back(current: usize, len: usize) -> usize {
    if current == 0 {
        len - 1
    } else {
        current - 1
    }
}
