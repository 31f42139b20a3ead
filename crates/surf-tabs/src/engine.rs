//! Rendering engine interface
//!
//! The engine that paints pages is an external collaborator. The shell only
//! ever asks it to create, destroy, navigate and rasterize, and listens to
//! the events it publishes on a channel.

use tokio::sync::mpsc;

use crate::error::EngineError;

/// Exclusive token for one live engine view.
///
/// Not `Clone`: the tab holding it is the only owner, and handing it to
/// [`RenderEngine::destroy`] ends its life.
#[derive(Debug, PartialEq, Eq)]
pub struct RenderHandle {
    id: u64,
}

impl RenderHandle {
    /// Wrap an engine-issued id. Only engine implementations call this.
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// RGBA8 pixels, row-major.
#[derive(Debug, Clone)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

pub trait RenderEngine: Send + Sync {
    fn create(&self, initial_url: &str) -> Result<RenderHandle, EngineError>;

    fn destroy(&self, handle: RenderHandle) -> Result<(), EngineError>;

    fn navigate(&self, handle: &RenderHandle, url: &str) -> Result<(), EngineError>;

    fn current_url(&self, handle: &RenderHandle) -> Option<String>;

    /// Render the visible surface, at most `max_width` pixels wide.
    fn render_to_raster(&self, handle: &RenderHandle, max_width: u32)
        -> Result<Raster, EngineError>;

    /// Populate the login form currently shown by `handle`.
    fn fill_credentials(
        &self,
        handle: &RenderHandle,
        username: &str,
        secret: &str,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEventKind {
    TitleChanged(String),
    UrlChanged(String),
    /// A login form finished loading on `origin`.
    FormDetected { origin: String },
    /// The user submitted a login form on `origin`.
    FormSubmitted {
        origin: String,
        username: String,
        secret: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderEvent {
    pub handle_id: u64,
    pub kind: RenderEventKind,
}

pub type RenderEventSender = mpsc::UnboundedSender<RenderEvent>;
pub type RenderEventReceiver = mpsc::UnboundedReceiver<RenderEvent>;

/// Channel the engine publishes on and the browser root drains.
pub fn render_event_channel() -> (RenderEventSender, RenderEventReceiver) {
    mpsc::unbounded_channel()
}
