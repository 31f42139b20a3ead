//! Surf Core
//!
//! The `Browser` root: owns the workspace topology, the session store, the
//! credential vault and the eviction scheduler, and routes render-engine
//! events to them. The rendering engine itself is injected.

mod browser;
mod config;
mod error;

pub use browser::Browser;
pub use config::Config;
pub use error::CoreError;

// Re-export the component crates
pub use surf_crypto::{CryptoError, EncryptionContext};
pub use surf_session::{
    PersistenceError, PersistenceManager, Session, SessionError, Topology, TopologySummary,
    Workspace,
};
pub use surf_storage::{Database, StorageError, StoreKind};
pub use surf_tabs::{
    render_event_channel, RenderEngine, RenderEvent, RenderEventKind, RenderEventReceiver,
    RenderEventSender, RenderHandle, RenderState, Tab, TabError, UnloadManager, UnloadReport,
};
pub use surf_vault::{BackendChoice, Credential, PasswordManager, VaultError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
