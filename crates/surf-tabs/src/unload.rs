//! Eviction policy
//!
//! Decides which loaded tabs give up their render handle. Two rules, checked
//! once per tick:
//! - over budget: evict the least recently used tabs until the loaded count
//!   is back at `max_loaded_tabs`;
//! - within budget: evict every tab idle for at least `unload_timeout`.
//!
//! The active tab is never evicted.

use std::time::{Duration, Instant};

use crate::engine::RenderEngine;
use crate::error::TabError;
use crate::snapshot::SnapshotManager;
use crate::tab::Tab;

pub const DEFAULT_UNLOAD_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_LOADED_TABS: usize = 3;

/// Outcome of one eviction pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnloadReport {
    /// Positions of the tabs that were unloaded, in eviction order
    pub evicted: Vec<usize>,
    /// Evictions whose handle release failed (tab still marked unloaded)
    pub release_failures: usize,
}

impl UnloadReport {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty()
    }
}

pub struct UnloadManager {
    unload_timeout: Duration,
    max_loaded_tabs: usize,
    snapshots: SnapshotManager,
}

impl UnloadManager {
    pub fn new(unload_timeout: Duration, max_loaded_tabs: usize, snapshots: SnapshotManager) -> Self {
        Self {
            unload_timeout,
            max_loaded_tabs: max_loaded_tabs.max(1),
            snapshots,
        }
    }

    pub fn unload_timeout(&self) -> Duration {
        self.unload_timeout
    }

    pub fn set_unload_timeout(&mut self, timeout: Duration) {
        self.unload_timeout = timeout;
    }

    pub fn max_loaded_tabs(&self) -> usize {
        self.max_loaded_tabs
    }

    /// The active tab always stays loaded, so the budget is at least one.
    pub fn set_max_loaded_tabs(&mut self, max: usize) {
        self.max_loaded_tabs = max.max(1);
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    pub fn snapshots_mut(&mut self) -> &mut SnapshotManager {
        &mut self.snapshots
    }

    /// Run one eviction pass over a session's tabs.
    pub fn check_and_unload(
        &self,
        tabs: &mut [Tab],
        active_index: usize,
        now: Instant,
        engine: &dyn RenderEngine,
    ) -> UnloadReport {
        let loaded = tabs.iter().filter(|t| t.is_loaded()).count();

        let mut candidates: Vec<usize> = tabs
            .iter()
            .enumerate()
            .filter(|(i, t)| *i != active_index && t.is_loaded())
            .map(|(i, _)| i)
            .collect();

        let victims: Vec<usize> = if loaded > self.max_loaded_tabs {
            candidates.sort_by_key(|&i| tabs[i].last_interaction());
            candidates
                .into_iter()
                .take(loaded - self.max_loaded_tabs)
                .collect()
        } else {
            candidates
                .into_iter()
                .filter(|&i| tabs[i].idle_for(now) >= self.unload_timeout)
                .collect()
        };

        let mut report = UnloadReport::default();
        for index in victims {
            debug_assert_ne!(index, active_index);
            if !self.unload_tab(&mut tabs[index], engine) {
                report.release_failures += 1;
            }
            report.evicted.push(index);
        }

        if !report.is_empty() {
            tracing::info!(
                loaded_before = loaded,
                evicted = report.evicted.len(),
                max_loaded = self.max_loaded_tabs,
                "Eviction pass unloaded tabs"
            );
        }

        report
    }

    /// Snapshot (best effort) and unload one tab. Returns `false` when the
    /// engine failed to release the handle; the tab is unloaded either way.
    pub fn unload_tab(&self, tab: &mut Tab, engine: &dyn RenderEngine) -> bool {
        if !tab.is_loaded() {
            return true;
        }

        if let Some(path) = self.snapshots.create_snapshot(tab, engine) {
            if let Some(previous) = tab.snapshot_path.replace(path) {
                self.snapshots.delete_snapshot(&previous);
            }
        }

        match tab.unload(engine) {
            Ok(()) => true,
            Err(TabError::Release(e)) => {
                tracing::warn!(tab_id = %tab.id, error = %e, "Render handle release failed");
                false
            }
            Err(e) => {
                tracing::warn!(tab_id = %tab.id, error = %e, "Tab unload failed");
                false
            }
        }
    }

    /// Unload every loaded tab except the active one (memory pressure).
    pub fn unload_all_except_active(
        &self,
        tabs: &mut [Tab],
        active_index: usize,
        engine: &dyn RenderEngine,
    ) -> UnloadReport {
        let mut report = UnloadReport::default();
        for (index, tab) in tabs.iter_mut().enumerate() {
            if index == active_index || !tab.is_loaded() {
                continue;
            }
            if !self.unload_tab(tab, engine) {
                report.release_failures += 1;
            }
            report.evicted.push(index);
        }
        report
    }
}

impl Default for UnloadManager {
    fn default() -> Self {
        Self::new(
            DEFAULT_UNLOAD_TIMEOUT,
            DEFAULT_MAX_LOADED_TABS,
            SnapshotManager::disabled(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEngine;

    /// Open `count` loaded tabs, each one second more recent than the last.
    fn open_tabs(engine: &ScriptedEngine, count: usize, base: Instant) -> Vec<Tab> {
        (0..count)
            .map(|i| {
                let mut tab = Tab::new(format!("https://example.com/{}", i + 1)).unwrap();
                tab.show(engine).unwrap();
                tab.touch_at(base + Duration::from_secs(i as u64));
                tab
            })
            .collect()
    }

    fn loaded_positions(tabs: &[Tab]) -> Vec<usize> {
        tabs.iter()
            .enumerate()
            .filter(|(_, t)| t.is_loaded())
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_defaults() {
        let manager = UnloadManager::default();
        assert_eq!(manager.unload_timeout(), Duration::from_secs(120));
        assert_eq!(manager.max_loaded_tabs(), 3);
        assert!(!manager.snapshots().is_enabled());
    }

    #[test]
    fn test_over_budget_evicts_least_recent() {
        let engine = ScriptedEngine::new();
        let base = Instant::now();
        let mut tabs = open_tabs(&engine, 5, base);
        let manager = UnloadManager::default();

        let report = manager.check_and_unload(&mut tabs, 4, base + Duration::from_secs(5), &engine);

        assert_eq!(report.evicted, vec![0, 1]);
        assert_eq!(loaded_positions(&tabs), vec![2, 3, 4]);
        assert_eq!(engine.live_count(), 3);
    }

    #[test]
    fn test_idle_tab_evicted_under_budget() {
        let engine = ScriptedEngine::new();
        let base = Instant::now();
        let mut tabs = open_tabs(&engine, 2, base);
        // Tab 0 idle for 130s, tab 1 active
        tabs[1].touch_at(base + Duration::from_secs(130));
        let manager = UnloadManager::default();

        let report =
            manager.check_and_unload(&mut tabs, 1, base + Duration::from_secs(130), &engine);

        assert_eq!(report.evicted, vec![0]);
        assert!(tabs[0].is_unloaded());
        assert!(tabs[1].is_loaded());
    }

    #[test]
    fn test_recent_tabs_survive_under_budget() {
        let engine = ScriptedEngine::new();
        let base = Instant::now();
        let mut tabs = open_tabs(&engine, 3, base);
        let manager = UnloadManager::default();

        let report = manager.check_and_unload(&mut tabs, 2, base + Duration::from_secs(60), &engine);
        assert!(report.is_empty());
        assert_eq!(loaded_positions(&tabs), vec![0, 1, 2]);
    }

    #[test]
    fn test_active_tab_never_evicted() {
        let base = Instant::now();
        for max_loaded in 0..6 {
            for timeout_secs in [0, 1, 120] {
                for active in 0..5 {
                    let engine = ScriptedEngine::new();
                    let mut tabs = open_tabs(&engine, 5, base);
                    // Active tab is the stalest one
                    tabs[active].touch_at(base);
                    let manager = UnloadManager::new(
                        Duration::from_secs(timeout_secs),
                        max_loaded,
                        SnapshotManager::disabled(),
                    );

                    let far_future = base + Duration::from_secs(10_000);
                    let report = manager.check_and_unload(&mut tabs, active, far_future, &engine);

                    assert!(!report.evicted.contains(&active));
                    assert!(tabs[active].is_loaded());
                }
            }
        }
    }

    #[test]
    fn test_release_failure_is_swallowed() {
        let engine = ScriptedEngine::new();
        let base = Instant::now();
        let mut tabs = open_tabs(&engine, 5, base);
        engine.fail_releases(true);
        let manager = UnloadManager::default();

        let report = manager.check_and_unload(&mut tabs, 4, base + Duration::from_secs(5), &engine);

        assert_eq!(report.evicted, vec![0, 1]);
        assert_eq!(report.release_failures, 2);
        assert!(tabs[0].is_unloaded());
        assert!(tabs[1].is_unloaded());
    }

    #[test]
    fn test_eviction_takes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new();
        let base = Instant::now();
        let mut tabs = open_tabs(&engine, 4, base);
        let manager = UnloadManager::new(
            DEFAULT_UNLOAD_TIMEOUT,
            3,
            SnapshotManager::new(dir.path().to_path_buf(), true),
        );

        manager.check_and_unload(&mut tabs, 3, base + Duration::from_secs(4), &engine);

        let path = tabs[0].snapshot_path.clone().unwrap();
        assert!(path.exists());
        assert!(tabs[1].snapshot_path.is_none());
    }

    #[test]
    fn test_unload_all_except_active() {
        let engine = ScriptedEngine::new();
        let mut tabs = open_tabs(&engine, 4, Instant::now());
        let manager = UnloadManager::default();

        let report = manager.unload_all_except_active(&mut tabs, 2, &engine);
        assert_eq!(report.evicted, vec![0, 1, 3]);
        assert_eq!(loaded_positions(&tabs), vec![2]);
    }
}
