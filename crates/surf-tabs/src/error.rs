//! Tab error types

use thiserror::Error;

/// Failure reported by the rendering engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Failed to create render handle: {0}")]
    Create(String),

    #[error("Failed to release render handle {0}")]
    Release(u64),

    #[error("Navigation failed: {0}")]
    Navigate(String),

    #[error("Render to raster failed: {0}")]
    Render(String),

    #[error("Form fill failed: {0}")]
    Fill(String),

    #[error("Unknown render handle {0}")]
    UnknownHandle(u64),
}

#[derive(Error, Debug)]
pub enum TabError {
    #[error("Tab not found: {0}")]
    NotFound(String),

    /// The handle could not be released; the tab is unloaded regardless.
    #[error("Render handle release failed: {0}")]
    Release(EngineError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}
