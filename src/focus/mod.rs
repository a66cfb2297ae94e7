//! Focused application probes
//!
//! Provides a unified interface for asking the display server which
//! application currently holds input focus.
//!
//! Components:
//! - `FocusProbe`: focused application name and known application names
//! - `DisplayServer`: session type detection
//! - `create_probe`: picks the best probe for the running session

#[cfg(feature = "x11")]
pub mod x11;

pub mod null;

use crate::error::Result;
use std::sync::Arc;

pub use null::NullFocusProbe;

/// Detected display server type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayServer {
    X11,
    Wayland,
    Unknown,
}

impl DisplayServer {
    /// Detect the current display server from environment variables
    pub fn detect() -> Self {
        // Check XDG_SESSION_TYPE first (most reliable on modern systems)
        if let Ok(session_type) = std::env::var("XDG_SESSION_TYPE") {
            match session_type.to_lowercase().as_str() {
                "wayland" => return DisplayServer::Wayland,
                "x11" => return DisplayServer::X11,
                _ => {}
            }
        }

        if std::env::var("WAYLAND_DISPLAY").is_ok() {
            return DisplayServer::Wayland;
        }

        if std::env::var("DISPLAY").is_ok() {
            return DisplayServer::X11;
        }

        DisplayServer::Unknown
    }

    /// Get a human-readable name for the display server
    pub fn name(&self) -> &'static str {
        match self {
            DisplayServer::X11 => "X11",
            DisplayServer::Wayland => "Wayland",
            DisplayServer::Unknown => "Unknown",
        }
    }
}

/// Answers "which application has focus"
///
/// Queries are synchronous and bounded (local display server round trips).
/// Failures are expected to be transient.
pub trait FocusProbe: Send + Sync {
    /// Name of the focused application, `None` when nothing has focus
    fn focused_application(&self) -> Result<Option<String>>;

    /// Names of running applications, used to suggest new profile names
    fn known_applications(&self) -> Result<Vec<String>>;
}

/// Create a focus probe for the current display server
///
/// Falls back to a probe that never reports focus when no backend is
/// available, so automatic switching simply stays idle.
pub fn create_probe(display_server: DisplayServer) -> Arc<dyn FocusProbe> {
    match display_server {
        #[cfg(feature = "x11")]
        DisplayServer::X11 => match x11::X11FocusProbe::new() {
            Ok(probe) => return Arc::new(probe),
            Err(e) => tracing::warn!("Failed to create X11 focus probe: {}", e),
        },
        #[cfg(feature = "x11")]
        DisplayServer::Wayland => {
            // Only XWayland clients are visible this way
            if std::env::var("DISPLAY").is_ok() {
                tracing::info!("Using X11 focus probe via XWayland");
                match x11::X11FocusProbe::new() {
                    Ok(probe) => return Arc::new(probe),
                    Err(e) => tracing::warn!("XWayland focus probe unavailable: {}", e),
                }
            }
        }
        _ => {}
    }

    tracing::warn!(
        "No focus probe available for {}; automatic switching disabled",
        display_server.name()
    );
    Arc::new(NullFocusProbe)
}
