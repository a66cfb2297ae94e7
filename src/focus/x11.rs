//! X11 Focus Probe
//!
//! This module uses:
//! - `_NET_ACTIVE_WINDOW` on the root window for the focused window
//! - `_NET_CLIENT_LIST` on the root window for all managed windows
//! - `_NET_WM_PID` + `/proc/<pid>/comm` for the process name
//! - `WM_CLASS` as a fallback application name

use super::FocusProbe;
use crate::error::{ProfileError, Result};
use anyhow::Context;
use std::fmt::Display;
use tracing::info;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

/// Upper bound on `_NET_CLIENT_LIST` entries read in one request
const CLIENT_LIST_LIMIT: u32 = 4096;

fn query_failed(e: impl Display) -> ProfileError {
    ProfileError::FocusQueryFailed(e.to_string())
}

/// Focus probe talking to the X server (or XWayland)
pub struct X11FocusProbe {
    conn: RustConnection,
    root: Window,
    net_active_window: Atom,
    net_client_list: Atom,
    net_wm_pid: Atom,
}

impl X11FocusProbe {
    /// Connect to the X server named by `DISPLAY`
    pub fn new() -> anyhow::Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11 display")?;
        let root = conn.setup().roots[screen_num].root;

        let net_active_window = intern_atom(&conn, "_NET_ACTIVE_WINDOW")?;
        let net_client_list = intern_atom(&conn, "_NET_CLIENT_LIST")?;
        let net_wm_pid = intern_atom(&conn, "_NET_WM_PID")?;

        info!("X11 focus probe initialized (root: {})", root);

        Ok(Self {
            conn,
            root,
            net_active_window,
            net_client_list,
            net_wm_pid,
        })
    }

    /// Read a list of windows from a root window property
    fn root_windows(&self, property: Atom, limit: u32) -> Result<Vec<Window>> {
        let prop = self
            .conn
            .get_property(false, self.root, property, AtomEnum::WINDOW, 0, limit)
            .map_err(query_failed)?
            .reply()
            .map_err(query_failed)?;

        Ok(prop
            .value32()
            .map(|it| it.filter(|&w| w != x11rb::NONE).collect())
            .unwrap_or_default())
    }

    /// Resolve a window to the name of the application owning it
    fn application_name(&self, w: Window) -> Result<Option<String>> {
        if let Some(name) = self.process_name(w)? {
            return Ok(Some(name));
        }
        Ok(get_wm_class(&self.conn, w)?.and_then(|(instance, class)| {
            if !class.is_empty() {
                Some(class)
            } else if !instance.is_empty() {
                Some(instance)
            } else {
                None
            }
        }))
    }

    /// Process name via `_NET_WM_PID`, if the client sets it
    fn process_name(&self, w: Window) -> Result<Option<String>> {
        let prop = self
            .conn
            .get_property(false, w, self.net_wm_pid, AtomEnum::CARDINAL, 0, 1)
            .map_err(query_failed)?
            .reply()
            .map_err(query_failed)?;

        let Some(pid) = prop.value32().and_then(|mut it| it.next()) else {
            return Ok(None);
        };

        // The process may be remote (forwarded X) or already gone
        Ok(std::fs::read_to_string(format!("/proc/{pid}/comm"))
            .ok()
            .map(|comm| comm.trim_end().to_string())
            .filter(|comm| !comm.is_empty()))
    }
}

impl FocusProbe for X11FocusProbe {
    fn focused_application(&self) -> Result<Option<String>> {
        let active = self.root_windows(self.net_active_window, 1)?;
        match active.first() {
            Some(&w) => self.application_name(w),
            None => Ok(None),
        }
    }

    fn known_applications(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for w in self.root_windows(self.net_client_list, CLIENT_LIST_LIMIT)? {
            // Windows can vanish between the list and the property read
            if let Ok(Some(name)) = self.application_name(w) {
                names.push(name);
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Intern an X11 atom by name
fn intern_atom<C: Connection>(conn: &C, name: &str) -> anyhow::Result<Atom> {
    Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
}

/// Get WM_CLASS property (instance, class) for a window
fn get_wm_class<C: Connection>(conn: &C, w: Window) -> Result<Option<(String, String)>> {
    let prop = conn
        .get_property(false, w, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 1024)
        .map_err(query_failed)?
        .reply()
        .map_err(query_failed)?;

    if prop.value.is_empty() {
        return Ok(None);
    }

    let mut parts = prop
        .value
        .split(|&b| b == 0)
        .filter(|p| !p.is_empty())
        .map(|p| String::from_utf8_lossy(p).to_string());

    let instance = parts.next().unwrap_or_default();
    let class = parts.next().unwrap_or_default();
    Ok(Some((instance, class)))
}
