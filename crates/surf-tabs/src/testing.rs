//! In-memory rendering engine for tests.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::engine::{
    Raster, RenderEngine, RenderEvent, RenderEventKind, RenderEventSender, RenderHandle,
};
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Create { id: u64, url: String },
    Destroy { id: u64 },
    Navigate { id: u64, url: String },
    Render { id: u64, max_width: u32 },
    Fill { id: u64, username: String },
}

/// Engine double that tracks live views and every call made to it.
pub struct ScriptedEngine {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, String>>,
    calls: Mutex<Vec<EngineCall>>,
    fills: Mutex<Vec<(u64, String, String)>>,
    fail_release: AtomicBool,
    fail_create: AtomicBool,
    surface: Mutex<(u32, u32)>,
    events: Mutex<Option<RenderEventSender>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fills: Mutex::new(Vec::new()),
            fail_release: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            surface: Mutex::new((1280, 800)),
            events: Mutex::new(None),
        }
    }

    /// Publish events on `sender` like a real engine would.
    pub fn with_events(self, sender: RenderEventSender) -> Self {
        *self.events.lock() = Some(sender);
        self
    }

    pub fn fail_releases(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_surface_size(&self, width: u32, height: u32) {
        *self.surface.lock() = (width, height);
    }

    pub fn set_current_url(&self, id: u64, url: &str) {
        if let Some(current) = self.live.lock().get_mut(&id) {
            *current = url.to_string();
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    pub fn url_of(&self, id: u64) -> Option<String> {
        self.live.lock().get(&id).cloned()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn destroyed(&self) -> Vec<u64> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                EngineCall::Destroy { id } => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Credentials pushed into forms: (handle id, username, secret).
    pub fn fills(&self) -> Vec<(u64, String, String)> {
        self.fills.lock().clone()
    }

    /// Emit an event as if the page had produced it.
    pub fn emit(&self, handle_id: u64, kind: RenderEventKind) {
        if let Some(sender) = self.events.lock().as_ref() {
            let _ = sender.send(RenderEvent { handle_id, kind });
        }
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEngine for ScriptedEngine {
    fn create(&self, initial_url: &str) -> Result<RenderHandle, EngineError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::Create(initial_url.to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.live.lock().insert(id, initial_url.to_string());
        self.calls.lock().push(EngineCall::Create {
            id,
            url: initial_url.to_string(),
        });
        Ok(RenderHandle::new(id))
    }

    fn destroy(&self, handle: RenderHandle) -> Result<(), EngineError> {
        let id = handle.id();
        self.calls.lock().push(EngineCall::Destroy { id });
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(EngineError::Release(id));
        }
        self.live
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(EngineError::UnknownHandle(id))
    }

    fn navigate(&self, handle: &RenderHandle, url: &str) -> Result<(), EngineError> {
        let id = handle.id();
        self.calls.lock().push(EngineCall::Navigate {
            id,
            url: url.to_string(),
        });
        match self.live.lock().get_mut(&id) {
            Some(current) => {
                *current = url.to_string();
                Ok(())
            }
            None => Err(EngineError::UnknownHandle(id)),
        }
    }

    fn current_url(&self, handle: &RenderHandle) -> Option<String> {
        self.url_of(handle.id())
    }

    fn render_to_raster(
        &self,
        handle: &RenderHandle,
        max_width: u32,
    ) -> Result<Raster, EngineError> {
        let id = handle.id();
        self.calls.lock().push(EngineCall::Render { id, max_width });
        if !self.live.lock().contains_key(&id) {
            return Err(EngineError::UnknownHandle(id));
        }

        // Full-size surface; max_width is not honoured.
        let (width, height) = *self.surface.lock();
        Ok(Raster {
            width,
            height,
            rgba: vec![0xff; (width * height * 4) as usize],
        })
    }

    fn fill_credentials(
        &self,
        handle: &RenderHandle,
        username: &str,
        secret: &str,
    ) -> Result<(), EngineError> {
        let id = handle.id();
        if !self.live.lock().contains_key(&id) {
            return Err(EngineError::UnknownHandle(id));
        }
        self.calls.lock().push(EngineCall::Fill {
            id,
            username: username.to_string(),
        });
        self.fills
            .lock()
            .push((id, username.to_string(), secret.to_string()));
        Ok(())
    }
}
