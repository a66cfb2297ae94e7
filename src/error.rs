//! Error types for profile switching

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::device::DeviceIdentity;

/// Convenient result type for the library.
pub type Result<T> = std::result::Result<T, ProfileError>;

/// Errors raised by the profile store, the focus probes and the controller
#[derive(Debug, Error)]
pub enum ProfileError {
    /// No profile file exists for this device and name
    #[error("profile '{name}' not found for device {device}")]
    NotFound { device: DeviceIdentity, name: String },

    /// The profile may never be deleted
    #[error("profile '{0}' is protected and cannot be deleted")]
    Protected(String),

    /// The OS could not tell which application has focus (transient)
    #[error("focus query failed: {0}")]
    FocusQueryFailed(String),

    /// Disk read/write failure
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Profile name or device identity is empty or not filesystem safe
    #[error("invalid name '{0}'")]
    InvalidName(String),

    /// The operation needs an active device
    #[error("no device selected")]
    NoDevice,

    /// No profile is currently loaded (the last load failed)
    #[error("no profile selected")]
    NoProfileSelected,

    /// The active device is a minimal device without profile support
    #[error("device {0} does not support profiles")]
    ProfilesUnsupported(DeviceIdentity),

    /// The configuration editor rejected a blob
    #[error("configuration editor error: {0}")]
    Editor(String),
}

impl ProfileError {
    /// Wrap an I/O error together with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a missing-profile error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
