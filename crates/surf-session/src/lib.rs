//! Surf Session Management
//!
//! - Tabs live in sessions, sessions in workspaces, workspaces in one topology
//! - Every workspace keeps at least one session; the overview session is never
//!   removed, an ordinary session goes away with its last tab
//! - The whole topology is saved in one transaction and restored with every
//!   tab unloaded
//! - Saved state is encrypted when a passphrase is set

mod error;
mod persistence;
mod recurring;
mod session;
mod topology;
mod workspace;

pub use error::{PersistenceError, SessionError};
pub use persistence::{PersistenceManager, PersistenceResult};
pub use recurring::RecurringTask;
pub use session::{Session, OVERVIEW_SESSION_NAME};
pub use topology::{SessionSummary, TabSummary, Topology, TopologySummary, WorkspaceSummary};
pub use workspace::{Workspace, DEFAULT_WORKSPACE_NAME};

pub type Result<T> = std::result::Result<T, SessionError>;
