//! Session data structure

use chrono::{DateTime, Utc};

use surf_tabs::Tab;

pub const OVERVIEW_SESSION_NAME: &str = "Overview";

/// Named, ordered collection of tabs with one active tab.
#[derive(Debug)]
pub struct Session {
    /// Human-readable name
    pub name: String,
    tabs: Vec<Tab>,
    active_index: usize,
    is_overview: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();

        Self {
            name: name.into(),
            tabs: Vec::new(),
            active_index: 0,
            is_overview: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The designated session that survives having no tabs.
    pub fn overview() -> Self {
        let mut session = Self::new(OVERVIEW_SESSION_NAME);
        session.is_overview = true;
        session
    }

    /// Rebuild a session from stored records.
    pub fn from_parts(
        name: String,
        is_overview: bool,
        tabs: Vec<Tab>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name,
            tabs,
            active_index: 0,
            is_overview,
            created_at,
            updated_at,
        }
    }

    pub fn is_overview(&self) -> bool {
        self.is_overview
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn tabs_mut(&mut self) -> &mut [Tab] {
        &mut self.tabs
    }

    pub fn tab(&self, index: usize) -> Option<&Tab> {
        self.tabs.get(index)
    }

    pub fn tab_mut(&mut self, index: usize) -> Option<&mut Tab> {
        self.tabs.get_mut(index)
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Number of tabs currently holding a render handle.
    pub fn loaded_count(&self) -> usize {
        self.tabs.iter().filter(|t| t.is_loaded()).count()
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.tabs.get(self.active_index)
    }

    pub fn active_tab_mut(&mut self) -> Option<&mut Tab> {
        self.tabs.get_mut(self.active_index)
    }

    /// Append a tab and make it active. Returns its position.
    pub fn add_tab(&mut self, tab: Tab) -> usize {
        self.tabs.push(tab);
        self.active_index = self.tabs.len() - 1;
        self.mark_updated();
        self.active_index
    }

    /// Remove the tab at `index`, keeping the active index in range.
    pub fn remove_tab(&mut self, index: usize) -> Option<Tab> {
        if index >= self.tabs.len() {
            return None;
        }

        let tab = self.tabs.remove(index);

        if self.tabs.is_empty() {
            self.active_index = 0;
        } else if index < self.active_index || self.active_index >= self.tabs.len() {
            self.active_index = self.active_index.saturating_sub(1);
        }

        self.mark_updated();
        Some(tab)
    }

    /// Make the tab at `index` active and record the interaction.
    pub fn set_active(&mut self, index: usize) -> bool {
        let Some(tab) = self.tabs.get_mut(index) else {
            return false;
        };
        tab.touch();
        self.active_index = index;
        self.mark_updated();
        true
    }

    /// Restore the active position without touching the tab (used on load).
    pub fn restore_active(&mut self, index: usize) {
        if index < self.tabs.len() {
            self.active_index = index;
        }
    }

    /// Move a tab to a new position; the active tab follows its tab.
    pub fn move_tab(&mut self, from: usize, to: usize) -> bool {
        if from >= self.tabs.len() {
            return false;
        }

        let active_id = self.active_tab().map(|t| t.id.clone());
        let tab = self.tabs.remove(from);
        let to = to.min(self.tabs.len());
        self.tabs.insert(to, tab);

        if let Some(id) = active_id {
            if let Some(pos) = self.position_of(&id) {
                self.active_index = pos;
            }
        }

        self.mark_updated();
        true
    }

    pub fn position_of(&self, tab_id: &str) -> Option<usize> {
        self.tabs.iter().position(|t| t.id == tab_id)
    }

    /// Find the tab that owns the given engine handle.
    pub fn tab_by_handle_mut(&mut self, handle_id: u64) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|t| t.owns_handle(handle_id))
    }

    /// Rename the session
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.mark_updated();
    }

    /// An empty non-overview session has no reason to exist.
    pub fn is_disposable(&self) -> bool {
        self.tabs.is_empty() && !self.is_overview
    }

    fn mark_updated(&mut self) {
        self.updated_at = Utc::now();
    }
}
