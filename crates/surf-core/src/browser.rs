//! Browser root object
//!
//! Owns the topology and every manager. The rendering engine is injected;
//! nothing in here knows how pages are painted.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};

use surf_session::{
    PersistenceManager, RecurringTask, SessionError, Topology, TopologySummary,
};
use surf_tabs::{
    RenderEngine, RenderEvent, RenderEventKind, RenderEventReceiver, SnapshotManager, Tab,
    UnloadManager, UnloadReport,
};
use surf_vault::{Credential, PasswordManager};

use crate::config::Config;
use crate::error::CoreError;
use crate::Result;

const MAX_RECENTLY_CLOSED: usize = 20;

#[derive(Debug, Clone)]
struct ClosedTab {
    url: String,
    title: String,
    index: usize,
}

pub struct Browser {
    config: Config,
    engine: Arc<dyn RenderEngine>,
    topology: Arc<RwLock<Topology>>,
    persistence: PersistenceManager,
    passwords: PasswordManager,
    unload: Arc<RwLock<UnloadManager>>,
    eviction: Arc<RecurringTask>,
    events: Arc<Mutex<RenderEventReceiver>>,
    recently_closed_tabs: Arc<RwLock<Vec<ClosedTab>>>,
}

impl Browser {
    /// Open the stores named by `config` and wire up the managers.
    pub fn new(
        config: Config,
        engine: Arc<dyn RenderEngine>,
        events: RenderEventReceiver,
    ) -> Result<Self> {
        config.validate()?;

        std::fs::create_dir_all(&config.data_dir)?;
        for path in [&config.database_path, &config.credentials_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let persistence = PersistenceManager::open(&config.database_path)?;
        let passwords = PasswordManager::open(&config.credentials_path, config.credential_backend)?;

        Ok(Self::with_components(config, engine, events, persistence, passwords))
    }

    /// Assemble a browser from already opened stores.
    pub fn with_components(
        config: Config,
        engine: Arc<dyn RenderEngine>,
        events: RenderEventReceiver,
        persistence: PersistenceManager,
        passwords: PasswordManager,
    ) -> Self {
        passwords.set_autofill_enabled(config.autofill_enabled);

        let unload = UnloadManager::new(
            config.unload_timeout(),
            config.max_loaded_tabs,
            SnapshotManager::new(config.snapshot_dir.clone(), config.snapshots_enabled),
        );

        Self {
            config,
            engine,
            topology: Arc::new(RwLock::new(Topology::new())),
            persistence,
            passwords,
            unload: Arc::new(RwLock::new(unload)),
            eviction: Arc::new(RecurringTask::new("eviction")),
            events: Arc::new(Mutex::new(events)),
            recently_closed_tabs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Unlock both stores, load the saved topology, show the current tab and
    /// start the background timers.
    ///
    /// A wrong passphrase leaves the default topology in place and returns an
    /// error for which [`CoreError::needs_passphrase`] is true.
    pub fn initialize(&self, passphrase: Option<&str>) -> Result<()> {
        self.persistence.set_passphrase(passphrase)?;
        self.load_now()?;
        self.passwords.set_passphrase(passphrase)?;

        self.persistence
            .enable_autosave(Arc::clone(&self.topology), self.config.autosave_interval_secs);
        self.start_eviction();

        let topology = self.topology.read();
        tracing::info!(
            workspaces = topology.workspace_count(),
            tabs = topology.total_tab_count(),
            "Browser initialized"
        );
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn passwords(&self) -> &PasswordManager {
        &self.passwords
    }

    pub fn persistence(&self) -> &PersistenceManager {
        &self.persistence
    }

    /// Apply the same passphrase to the local credential store and the
    /// session store. The credential store checks it first, so a rejected
    /// passphrase changes neither.
    pub fn set_passphrase(&self, passphrase: Option<&str>) -> Result<()> {
        self.passwords.set_passphrase(passphrase)?;
        self.persistence.set_passphrase(passphrase)?;
        Ok(())
    }

    /// Run `f` against the topology under the read lock.
    pub fn with_topology<R>(&self, f: impl FnOnce(&Topology) -> R) -> R {
        f(&self.topology.read())
    }

    pub fn summary(&self) -> TopologySummary {
        self.topology.read().summary()
    }

    // Tabs

    /// Open a tab in the current session, make it active and show it.
    pub fn new_tab(&self, url: &str) -> Result<usize> {
        let mut topology = self.topology.write();
        let index = topology.new_tab(url)?;
        self.show_active(&mut topology)?;
        Ok(index)
    }

    pub fn close_tab(&self, index: usize) -> Result<()> {
        let mut topology = self.topology.write();
        let tab = topology.close_tab_at(index)?;
        self.remember_closed(&tab, index);
        self.dispose_tab(tab);
        self.show_active(&mut topology)?;
        Ok(())
    }

    pub fn close_current_tab(&self) -> Result<()> {
        let index = self.topology.read().current_session().active_index();
        self.close_tab(index)
    }

    /// Reopen the most recently closed tab in the current session, at its
    /// old position when that still fits.
    ///
    /// The entry leaves the stack only once the tab is in place; if the tab
    /// cannot be shown it stays open in the session, unloaded.
    pub fn reopen_closed_tab(&self) -> Result<usize> {
        let mut topology = self.topology.write();
        let mut stack = self.recently_closed_tabs.write();
        let closed = stack.last().ok_or(CoreError::NothingToReopen)?;

        let mut tab = Tab::new(&closed.url)?;
        if !closed.title.trim().is_empty() {
            tab.title = closed.title.clone();
        }

        let session = topology.current_session_mut();
        let appended = session.add_tab(tab);
        let index = closed.index.min(appended);
        session.move_tab(appended, index);

        stack.pop();
        drop(stack);

        self.show_active(&mut topology)?;
        Ok(index)
    }

    pub fn recently_closed_count(&self) -> usize {
        self.recently_closed_tabs.read().len()
    }

    pub fn switch_tab(&self, index: usize) -> Result<()> {
        let mut topology = self.topology.write();
        topology.switch_tab(index)?;
        self.show_active(&mut topology)?;
        Ok(())
    }

    pub fn next_tab(&self) -> Result<Option<usize>> {
        let mut topology = self.topology.write();
        let index = topology.next_tab();
        self.show_active(&mut topology)?;
        Ok(index)
    }

    pub fn previous_tab(&self) -> Result<Option<usize>> {
        let mut topology = self.topology.write();
        let index = topology.previous_tab();
        self.show_active(&mut topology)?;
        Ok(index)
    }

    pub fn move_tab(&self, from: usize, to: usize) -> Result<()> {
        self.topology.write().move_tab(from, to)?;
        Ok(())
    }

    /// Navigate the current tab.
    pub fn navigate(&self, url: &str) -> Result<()> {
        let mut topology = self.topology.write();
        let active = topology.current_session().active_index();
        let tab = topology
            .current_tab_mut()
            .ok_or(SessionError::TabNotFound(active))?;
        tab.navigate(url, self.engine.as_ref())?;
        Ok(())
    }

    /// Make sure the current tab has a live handle. A tab coming back from
    /// `Unloaded` first takes its snapshot as a placeholder.
    pub fn show_current_tab(&self) -> Result<bool> {
        let mut topology = self.topology.write();
        self.show_active(&mut topology)
    }

    fn show_active(&self, topology: &mut Topology) -> Result<bool> {
        let Some(tab) = topology.current_tab_mut() else {
            return Ok(false);
        };

        if tab.is_unloaded() && self.unload.read().snapshots().restore_snapshot(tab) {
            tracing::debug!(tab_id = %tab.id, "Showing snapshot placeholder");
        }

        Ok(tab.show(self.engine.as_ref())?)
    }

    fn remember_closed(&self, tab: &Tab, index: usize) {
        let mut stack = self.recently_closed_tabs.write();
        stack.push(ClosedTab {
            url: tab.url.clone(),
            title: tab.title.clone(),
            index,
        });

        if stack.len() > MAX_RECENTLY_CLOSED {
            let overflow = stack.len() - MAX_RECENTLY_CLOSED;
            stack.drain(0..overflow);
        }
    }

    /// Release a removed tab's handle and snapshot.
    fn dispose_tab(&self, mut tab: Tab) {
        if let Err(e) = tab.unload(self.engine.as_ref()) {
            tracing::warn!(tab_id = %tab.id, error = %e, "Failed to release closed tab");
        }
        if let Some(path) = tab.snapshot_path.take() {
            self.unload.read().snapshots().delete_snapshot(&path);
        }
    }

    // Sessions

    /// Add a session to the current workspace and switch to it.
    pub fn add_session(&self, name: &str) -> Result<usize> {
        Ok(self.topology.write().add_session(name)?)
    }

    pub fn close_session(&self, index: usize) -> Result<()> {
        let mut topology = self.topology.write();
        let mut session = topology.close_session(index)?;
        while let Some(tab) = session.remove_tab(0) {
            self.dispose_tab(tab);
        }
        self.show_active(&mut topology)?;
        Ok(())
    }

    pub fn rename_session(&self, index: usize, name: &str) -> Result<()> {
        self.topology.write().rename_session(index, name)?;
        Ok(())
    }

    pub fn switch_session(&self, index: usize) -> Result<()> {
        let mut topology = self.topology.write();
        topology.switch_session(index)?;
        self.show_active(&mut topology)?;
        Ok(())
    }

    pub fn next_session(&self) -> Result<usize> {
        let mut topology = self.topology.write();
        let index = topology.next_session();
        self.show_active(&mut topology)?;
        Ok(index)
    }

    pub fn previous_session(&self) -> Result<usize> {
        let mut topology = self.topology.write();
        let index = topology.previous_session();
        self.show_active(&mut topology)?;
        Ok(index)
    }

    // Workspaces

    /// Add a workspace and switch to it.
    pub fn add_workspace(&self, name: &str) -> Result<usize> {
        let mut topology = self.topology.write();
        let index = topology.add_workspace(name)?;
        topology.switch_workspace(index)?;
        Ok(index)
    }

    pub fn close_workspace(&self, index: usize) -> Result<()> {
        let mut topology = self.topology.write();
        let mut workspace = topology.close_workspace(index)?;
        for session in workspace.sessions_mut() {
            while let Some(tab) = session.remove_tab(0) {
                self.dispose_tab(tab);
            }
        }
        self.show_active(&mut topology)?;
        Ok(())
    }

    pub fn rename_workspace(&self, index: usize, name: &str) -> Result<()> {
        self.topology.write().rename_workspace(index, name)?;
        Ok(())
    }

    pub fn switch_workspace(&self, index: usize) -> Result<()> {
        let mut topology = self.topology.write();
        topology.switch_workspace(index)?;
        self.show_active(&mut topology)?;
        Ok(())
    }

    pub fn next_workspace(&self) -> Result<usize> {
        let mut topology = self.topology.write();
        let index = topology.next_workspace();
        self.show_active(&mut topology)?;
        Ok(index)
    }

    pub fn previous_workspace(&self) -> Result<usize> {
        let mut topology = self.topology.write();
        let index = topology.previous_workspace();
        self.show_active(&mut topology)?;
        Ok(index)
    }

    // Persistence

    pub fn save_now(&self) -> Result<()> {
        self.persistence.save_all(&self.topology.read())?;
        Ok(())
    }

    /// Replace the in-memory topology with the stored one. Handles of the
    /// replaced tree are released; on error nothing changes.
    pub fn load_now(&self) -> Result<()> {
        let mut topology = self.topology.write();
        let mut previous = self.persistence.load_all(&mut topology)?;

        for tab in previous.tabs_mut() {
            if let Err(e) = tab.unload(self.engine.as_ref()) {
                tracing::warn!(tab_id = %tab.id, error = %e, "Failed to release replaced tab");
            }
        }

        self.show_active(&mut topology)?;
        Ok(())
    }

    // Eviction

    /// Start the periodic eviction check on the current session.
    pub fn start_eviction(&self) -> bool {
        let topology = Arc::clone(&self.topology);
        let unload = Arc::clone(&self.unload);
        let engine = Arc::clone(&self.engine);

        self.eviction
            .start(self.config.unload_check_interval(), move || {
                evict_current_session(&topology, &unload, engine.as_ref(), Instant::now());
            })
    }

    pub fn stop_eviction(&self) -> bool {
        self.eviction.stop()
    }

    pub fn eviction_running(&self) -> bool {
        self.eviction.is_running()
    }

    /// Run one eviction pass now.
    pub fn run_eviction_pass(&self) -> UnloadReport {
        self.run_eviction_pass_at(Instant::now())
    }

    pub fn run_eviction_pass_at(&self, now: Instant) -> UnloadReport {
        evict_current_session(&self.topology, &self.unload, self.engine.as_ref(), now)
    }

    /// Unload every background tab of the current session.
    pub fn memory_pressure(&self) -> UnloadReport {
        let mut topology = self.topology.write();
        let session = topology.current_session_mut();
        let active = session.active_index();

        let report = self
            .unload
            .read()
            .unload_all_except_active(session.tabs_mut(), active, self.engine.as_ref());
        tracing::info!(evicted = report.evicted.len(), "Memory pressure handled");
        report
    }

    pub fn set_unload_timeout(&self, timeout: Duration) {
        self.unload.write().set_unload_timeout(timeout);
    }

    pub fn set_max_loaded_tabs(&self, max: usize) {
        self.unload.write().set_max_loaded_tabs(max);
    }

    pub fn set_snapshots_enabled(&self, enabled: bool) {
        self.unload.write().snapshots_mut().set_enabled(enabled);
    }

    // Credentials

    pub fn save_credential(&self, origin: &str, username: &str, secret: &str) -> Result<()> {
        Ok(self.passwords.save(origin, username, secret)?)
    }

    pub fn credentials_for(&self, origin: &str) -> Result<Vec<Credential>> {
        Ok(self.passwords.get(origin)?)
    }

    pub fn delete_credential(&self, origin: &str, username: &str) -> Result<()> {
        Ok(self.passwords.delete(origin, username)?)
    }

    // Render events

    /// Drain pending engine notifications. Returns how many were handled.
    pub fn pump_render_events(&self) -> usize {
        let mut events = self.events.lock();
        let mut handled = 0;
        while let Ok(event) = events.try_recv() {
            self.dispatch_render_event(event);
            handled += 1;
        }
        handled
    }

    fn dispatch_render_event(&self, event: RenderEvent) {
        match &event.kind {
            RenderEventKind::TitleChanged(_) | RenderEventKind::UrlChanged(_) => {
                if !self.topology.write().apply_render_event(&event) {
                    tracing::debug!(handle_id = event.handle_id, "Event for released handle");
                }
            }
            RenderEventKind::FormDetected { origin } => {
                let topology = self.topology.read();
                let handle = topology
                    .tabs()
                    .find_map(|t| t.handle().filter(|h| h.id() == event.handle_id));
                let Some(handle) = handle else {
                    tracing::debug!(handle_id = event.handle_id, "Form on released handle");
                    return;
                };

                match self.passwords.autofill(self.engine.as_ref(), handle, origin) {
                    Ok(true) => {}
                    Ok(false) => tracing::trace!(origin = %origin, "Nothing to autofill"),
                    Err(e) => tracing::warn!(origin = %origin, error = %e, "Autofill failed"),
                }
            }
            RenderEventKind::FormSubmitted {
                origin,
                username,
                secret,
            } => {
                if let Err(e) = self.passwords.save(origin, username, secret) {
                    tracing::warn!(
                        origin = %origin,
                        username = %username,
                        error = %e,
                        "Failed to save submitted credential"
                    );
                }
            }
        }
    }

    /// Stop the timers, save the topology with the urls the engine currently
    /// shows, release every handle and drop both keys.
    pub fn shutdown(&self) -> Result<()> {
        self.stop_eviction();
        self.persistence.disable_autosave();

        let saved = {
            let mut topology = self.topology.write();

            for tab in topology.tabs_mut() {
                let url = tab.handle().and_then(|h| self.engine.current_url(h));
                if let Some(url) = url.filter(|u| !u.is_empty()) {
                    tab.url = url;
                }
            }

            let saved = self.persistence.save_all(&topology);

            for tab in topology.tabs_mut() {
                if let Err(e) = tab.unload(self.engine.as_ref()) {
                    tracing::warn!(tab_id = %tab.id, error = %e, "Failed to release tab on shutdown");
                }
            }
            saved
        };

        self.persistence.close();
        self.passwords.close();

        saved?;
        tracing::info!("Browser shut down");
        Ok(())
    }
}

fn evict_current_session(
    topology: &RwLock<Topology>,
    unload: &RwLock<UnloadManager>,
    engine: &dyn RenderEngine,
    now: Instant,
) -> UnloadReport {
    let mut topology = topology.write();
    let session = topology.current_session_mut();
    let active = session.active_index();

    unload
        .read()
        .check_and_unload(session.tabs_mut(), active, now, engine)
}

impl Clone for Browser {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            engine: Arc::clone(&self.engine),
            topology: Arc::clone(&self.topology),
            persistence: self.persistence.clone(),
            passwords: self.passwords.clone(),
            unload: Arc::clone(&self.unload),
            eviction: Arc::clone(&self.eviction),
            events: Arc::clone(&self.events),
            recently_closed_tabs: Arc::clone(&self.recently_closed_tabs),
        }
    }
}
