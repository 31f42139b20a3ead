//! Surf Tab Management
//!
//! A tab is a browsing context that is either showing a live render handle
//! or reduced to metadata (url, title, snapshot). This crate owns the tab
//! model, the interface to the rendering engine, snapshot capture and the
//! eviction policy that bounds how many tabs keep a live handle.

mod engine;
mod error;
mod snapshot;
mod state;
mod tab;
mod unload;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use engine::{
    render_event_channel, Raster, RenderEngine, RenderEvent, RenderEventKind,
    RenderEventReceiver, RenderEventSender, RenderHandle,
};
pub use error::{EngineError, TabError};
pub use snapshot::{SnapshotManager, SnapshotSidecar, MAX_SNAPSHOT_EDGE};
pub use state::RenderState;
pub use tab::Tab;
pub use unload::{UnloadManager, UnloadReport, DEFAULT_MAX_LOADED_TABS, DEFAULT_UNLOAD_TIMEOUT};

pub type Result<T> = std::result::Result<T, TabError>;
