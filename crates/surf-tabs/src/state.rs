//! Render state of a tab
//!
//! ```text
//! Pending ──show──▶ Loaded(handle) ──unload──▶ Unloaded
//!                        ▲                         │
//!                        └──────────show───────────┘
//! ```
//! "Loaded" is derived from this enum alone: a handle exists exactly when
//! the state is `Loaded`.

use crate::engine::RenderHandle;

#[derive(Debug, Default)]
pub enum RenderState {
    /// Created but never shown; no handle yet.
    #[default]
    Pending,
    /// Live engine view.
    Loaded(RenderHandle),
    /// Evicted or rehydrated from disk; metadata only.
    Unloaded,
}

impl RenderState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, RenderState::Loaded(_))
    }

    pub fn is_unloaded(&self) -> bool {
        matches!(self, RenderState::Unloaded)
    }

    pub fn handle(&self) -> Option<&RenderHandle> {
        match self {
            RenderState::Loaded(handle) => Some(handle),
            _ => None,
        }
    }

    /// Take the handle out, leaving `Unloaded` behind.
    pub fn take_handle(&mut self) -> Option<RenderHandle> {
        match std::mem::replace(self, RenderState::Unloaded) {
            RenderState::Loaded(handle) => Some(handle),
            RenderState::Pending => {
                *self = RenderState::Pending;
                None
            }
            RenderState::Unloaded => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderState::Pending => "pending",
            RenderState::Loaded(_) => "loaded",
            RenderState::Unloaded => "unloaded",
        }
    }
}

impl std::fmt::Display for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_handle_from_loaded() {
        let mut state = RenderState::Loaded(RenderHandle::new(7));
        assert!(state.is_loaded());

        let handle = state.take_handle().unwrap();
        assert_eq!(handle.id(), 7);
        assert!(state.is_unloaded());
        assert!(state.handle().is_none());
    }

    #[test]
    fn test_take_handle_keeps_pending() {
        let mut state = RenderState::Pending;
        assert!(state.take_handle().is_none());
        assert!(matches!(state, RenderState::Pending));
    }
}
