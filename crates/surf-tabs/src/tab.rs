//! Tab data structure
//!
//! A tab keeps its url, title and interaction times whether or not it holds a
//! live render handle, so it can be evicted and restored without losing its
//! place.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::engine::{RenderEngine, RenderEventKind, RenderHandle};
use crate::error::TabError;
use crate::state::RenderState;
use crate::Result;

pub const DEFAULT_TITLE: &str = "New Tab";

#[derive(Debug)]
pub struct Tab {
    /// Unique identifier (in-memory only)
    pub id: String,
    /// Current URL
    pub url: String,
    /// Page title
    pub title: String,
    /// Preview captured before the last eviction
    pub snapshot_path: Option<PathBuf>,
    render: RenderState,
    last_interaction: Instant,
    last_interaction_at: DateTime<Utc>,
}

impl Tab {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(TabError::InvalidUrl("URL cannot be empty".to_string()));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            url,
            title: DEFAULT_TITLE.to_string(),
            snapshot_path: None,
            render: RenderState::Pending,
            last_interaction: Instant::now(),
            last_interaction_at: Utc::now(),
        })
    }

    /// Rebuild a tab from stored metadata. Rehydrated tabs start unloaded and
    /// never create a handle until shown.
    pub fn rehydrate(
        url: String,
        title: String,
        snapshot_path: Option<PathBuf>,
        last_interaction_at: DateTime<Utc>,
    ) -> Self {
        let idle = (Utc::now() - last_interaction_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let last_interaction = Instant::now()
            .checked_sub(idle)
            .unwrap_or_else(Instant::now);

        Self {
            id: Uuid::new_v4().to_string(),
            url,
            title,
            snapshot_path,
            render: RenderState::Unloaded,
            last_interaction,
            last_interaction_at,
        }
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render
    }

    pub fn is_loaded(&self) -> bool {
        self.render.is_loaded()
    }

    pub fn is_unloaded(&self) -> bool {
        self.render.is_unloaded()
    }

    pub fn handle(&self) -> Option<&RenderHandle> {
        self.render.handle()
    }

    pub fn owns_handle(&self, handle_id: u64) -> bool {
        self.handle().is_some_and(|h| h.id() == handle_id)
    }

    /// Make sure the tab has a live handle, creating one from the stored url
    /// if needed. Returns `true` when a handle was created.
    pub fn show(&mut self, engine: &dyn RenderEngine) -> Result<bool> {
        self.touch();

        if self.render.is_loaded() {
            return Ok(false);
        }

        let restoring = self.render.is_unloaded();
        let handle = engine.create(&self.url)?;

        tracing::debug!(
            tab_id = %self.id,
            handle_id = handle.id(),
            from = %self.render,
            "Tab shown"
        );

        self.render = RenderState::Loaded(handle);
        if restoring {
            tracing::info!(tab_id = %self.id, url = %self.url, "Restored tab");
        }
        Ok(true)
    }

    /// Release the handle and keep only metadata.
    ///
    /// The url is refreshed from the engine first. The tab ends up `Unloaded`
    /// even if the engine fails to release the handle; that failure is
    /// returned as [`TabError::Release`].
    pub fn unload(&mut self, engine: &dyn RenderEngine) -> Result<()> {
        let Some(handle) = self.render.handle() else {
            return Ok(());
        };

        if let Some(url) = engine.current_url(handle) {
            if !url.is_empty() {
                self.url = url;
            }
        }

        let Some(handle) = self.render.take_handle() else {
            return Ok(());
        };
        let handle_id = handle.id();

        match engine.destroy(handle) {
            Ok(()) => {
                tracing::debug!(tab_id = %self.id, handle_id, "Tab unloaded");
                Ok(())
            }
            Err(e) => Err(TabError::Release(e)),
        }
    }

    /// Navigate to a new url, forwarding to the engine when loaded.
    pub fn navigate(&mut self, url: impl Into<String>, engine: &dyn RenderEngine) -> Result<()> {
        let url = url.into();
        if url.is_empty() {
            return Err(TabError::InvalidUrl("URL cannot be empty".to_string()));
        }

        if let Some(handle) = self.render.handle() {
            engine.navigate(handle, &url)?;
        }

        self.url = url;
        self.title = String::new(); // Reset title until page loads
        self.touch();
        Ok(())
    }

    /// Apply a title/url notification from the engine. Form events are not
    /// tab state and are ignored here.
    pub fn apply_event(&mut self, kind: &RenderEventKind) {
        match kind {
            RenderEventKind::TitleChanged(title) => self.title = title.clone(),
            RenderEventKind::UrlChanged(url) if !url.is_empty() => self.url = url.clone(),
            _ => {}
        }
    }

    /// Record a user interaction now.
    pub fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    /// Record a user interaction at a specific monotonic instant.
    pub fn touch_at(&mut self, at: Instant) {
        let now = Instant::now();
        let to_chrono =
            |d: Duration| chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero());

        self.last_interaction = at;
        self.last_interaction_at = if at <= now {
            Utc::now() - to_chrono(now - at)
        } else {
            Utc::now() + to_chrono(at - now)
        };
    }

    pub fn last_interaction(&self) -> Instant {
        self.last_interaction
    }

    pub fn last_interaction_at(&self) -> DateTime<Utc> {
        self.last_interaction_at
    }

    /// How long the tab has been idle as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_interaction)
    }

    /// Get display title (with fallback to URL)
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}
