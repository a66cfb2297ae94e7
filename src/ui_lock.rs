//! Reference-counted UI lock
//!
//! Manual multi-step operations (device rebuild, profile add/delete) take
//! the lock so the operator cannot start a second one halfway through and,
//! optionally, so the focus monitor cannot switch profiles underneath them.
//! Lock requests nest: only the 0 -> 1 and 1 -> 0 transitions touch the
//! manual controls and the monitor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::controller::Presenter;
use crate::monitor::MonitorHandle;

#[derive(Debug, Default)]
struct LockState {
    count: usize,
    /// The focus monitor was locked by us on 0 -> 1 and is ours to unlock
    owns_monitor: bool,
}

pub struct UiLockCoordinator {
    state: Mutex<LockState>,
    presenter: Arc<dyn Presenter>,
    monitor: MonitorHandle,
}

impl UiLockCoordinator {
    pub fn new(presenter: Arc<dyn Presenter>, monitor: MonitorHandle) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            presenter,
            monitor,
        }
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take one lock; on the first one disable manual controls
    pub fn lock(&self, suppress_focus: bool) {
        let mut state = self.state();
        state.count += 1;
        if state.count == 1 {
            debug!("UI locked (suppress focus: {})", suppress_focus);
            // A monitor that was already paused stays paused afterwards
            state.owns_monitor = suppress_focus && self.monitor.lock();
            self.presenter.set_manual_controls_enabled(false);
        }
    }

    /// Release one lock; on the last one re-enable manual controls
    pub fn unlock(&self, suppress_focus: bool) {
        let mut state = self.state();
        if state.count == 0 {
            warn!("UI unlock without matching lock ignored");
            return;
        }
        state.count -= 1;
        if state.count == 0 {
            debug!("UI unlocked (resume focus: {})", suppress_focus);
            if suppress_focus && std::mem::take(&mut state.owns_monitor) {
                self.monitor.unlock();
            }
            self.presenter.set_manual_controls_enabled(true);
        }
    }

    /// Lock until the returned guard is dropped
    pub fn guard(&self, suppress_focus: bool) -> UiLockGuard<'_> {
        self.lock(suppress_focus);
        UiLockGuard {
            coordinator: self,
            suppress_focus,
        }
    }

    /// Number of outstanding locks
    pub fn count(&self) -> usize {
        self.state().count
    }

    pub fn is_locked(&self) -> bool {
        self.count() > 0
    }
}

/// Releases its lock on every exit path, including `?` and panics
#[must_use = "the UI unlocks as soon as the guard is dropped"]
pub struct UiLockGuard<'a> {
    coordinator: &'a UiLockCoordinator,
    suppress_focus: bool,
}

impl Drop for UiLockGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.unlock(self.suppress_focus);
    }
}
