//! Focus monitor
//!
//! A background thread polls a [`FocusProbe`] once per interval and tells
//! subscribers when the focused application changes. Manual operations can
//! pause it with [`MonitorHandle::lock`]; while locked the thread keeps
//! polling but never compares or emits, so the first tick after
//! [`MonitorHandle::unlock`] reports a change that happened in between.
//!
//! Each subscriber gets a single-slot channel: if the consumer has not
//! picked up the previous name yet, the newer one replaces it. Only the
//! latest focused application matters.

use anyhow::{Context, Result};
use crossbeam_channel::{self as chan, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use crate::focus::FocusProbe;

/// Default poll period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Last-known focus value before anything was observed
pub const NO_FOCUS: &str = "none";

/// One subscriber's single-slot mailbox
struct Subscriber {
    tx: Sender<String>,
    /// Our own end of the channel, used to evict an unread stale name
    evict: Receiver<String>,
}

impl Subscriber {
    fn deliver(&self, name: &str) {
        match self.tx.try_send(name.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(name)) => {
                let _ = self.evict.try_recv();
                // The consumer may have drained the slot meanwhile; either way it fits now
                let _ = self.tx.try_send(name);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// State shared by the poll thread and lock/unlock callers (one mutex)
struct MonitorState {
    locked: bool,
    last_known: String,
    subscribers: Vec<Subscriber>,
}

struct Shared {
    probe: Arc<dyn FocusProbe>,
    state: Mutex<MonitorState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheap, cloneable handle for pausing and resuming a [`FocusMonitor`]
#[derive(Clone)]
pub struct MonitorHandle {
    shared: Arc<Shared>,
}

impl MonitorHandle {
    /// Stop emitting focus changes until [`unlock`](Self::unlock)
    ///
    /// Returns false if the monitor was already locked.
    pub fn lock(&self) -> bool {
        let was_locked = std::mem::replace(&mut self.shared.state().locked, true);
        debug!("Focus monitor locked");
        !was_locked
    }

    /// Resume emitting focus changes
    pub fn unlock(&self) {
        self.shared.state().locked = false;
        debug!("Focus monitor unlocked");
    }

    pub fn is_locked(&self) -> bool {
        self.shared.state().locked
    }

    /// Last focused application name that was emitted
    pub fn last_known(&self) -> String {
        self.shared.state().last_known.clone()
    }

    /// Register a new subscriber and return its receiving end
    pub fn subscribe(&self) -> Receiver<String> {
        let (tx, rx) = chan::bounded(1);
        self.shared.state().subscribers.push(Subscriber {
            tx,
            evict: rx.clone(),
        });
        rx
    }

    /// Run one poll cycle
    ///
    /// Returns the emitted name, if the focused application changed.
    pub fn tick(&self) -> Option<String> {
        // Query outside the lock; the display server round trip can be slow
        let focused = match self.shared.probe.focused_application() {
            Ok(Some(name)) => Some(name),
            Ok(None) => None,
            Err(e) => {
                debug!("Focus query failed: {}", e);
                None
            }
        };

        let mut state = self.shared.state();
        if state.locked {
            return None;
        }
        let name = focused?;
        if name == state.last_known {
            return None;
        }

        info!("Focused application changed: '{}' -> '{}'", state.last_known, name);
        state.last_known.clone_from(&name);
        // Delivery is a non-blocking slot swap, so emit while still holding the state
        for subscriber in &state.subscribers {
            subscriber.deliver(&name);
        }
        Some(name)
    }
}

/// Polls the focused application on a background thread
pub struct FocusMonitor {
    handle: MonitorHandle,
    interval: Duration,
    /// Dropping this sender stops the poll thread
    stop: Option<Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
}

impl FocusMonitor {
    /// Create a monitor; nothing is polled until [`start`](Self::start)
    pub fn new(probe: Arc<dyn FocusProbe>, interval: Duration) -> Self {
        Self {
            handle: MonitorHandle {
                shared: Arc::new(Shared {
                    probe,
                    state: Mutex::new(MonitorState {
                        locked: false,
                        last_known: NO_FOCUS.to_string(),
                        subscribers: Vec::new(),
                    }),
                }),
            },
            interval,
            stop: None,
            join: None,
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    pub fn lock(&self) -> bool {
        self.handle.lock()
    }

    pub fn unlock(&self) {
        self.handle.unlock();
    }

    pub fn subscribe(&self) -> Receiver<String> {
        self.handle.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.join.is_some()
    }

    /// Start the poll thread (no-op if already running)
    pub fn start(&mut self) -> Result<()> {
        if self.join.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = chan::bounded::<()>(0);
        let handle = self.handle.clone();
        let interval = self.interval;

        let join = thread::Builder::new()
            .name("focus-monitor".to_string())
            .spawn(move || run_poll_loop(&handle, &stop_rx, interval))
            .context("Failed to spawn focus monitor thread")?;

        info!("Focus monitor started (interval: {:?})", interval);
        self.stop = Some(stop_tx);
        self.join = Some(join);
        Ok(())
    }

    /// Stop the poll thread and wait for it to exit
    pub fn stop(&mut self) {
        self.stop.take();
        if let Some(join) = self.join.take() {
            let _ = join.join();
            info!("Focus monitor stopped");
        }
    }
}

impl Drop for FocusMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_poll_loop(handle: &MonitorHandle, stop: &Receiver<()>, interval: Duration) {
    loop {
        handle.tick();
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
