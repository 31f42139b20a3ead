//! Start/stoppable recurring tasks
//!
//! Each tick runs one complete synchronous pass. Stopping aborts the task
//! between ticks, never inside a pass.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct RecurringTask {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RecurringTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
        }
    }

    /// Run `pass` every `period`, replacing any previous schedule. The first
    /// pass runs one period from now. Returns `false` when no tokio runtime
    /// is available or the period is zero.
    pub fn start<F>(&self, period: Duration, mut pass: F) -> bool
    where
        F: FnMut() + Send + 'static,
    {
        self.stop();

        if period.is_zero() {
            return false;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(task = self.name, "No async runtime; recurring task not started");
            return false;
        };

        let name = self.name;
        let handle = runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                tracing::trace!(task = name, "Recurring pass");
                pass();
            }
        });

        *self.handle.lock() = Some(handle);
        tracing::info!(task = name, period_secs = period.as_secs(), "Started recurring task");
        true
    }

    /// Stop the schedule. Returns whether a task was running.
    pub fn stop(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                handle.abort();
                tracing::info!(task = self.name, "Stopped recurring task");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RecurringTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
