//! Profile storage
//!
//! Profiles are opaque layout blobs stored one file per profile:
//! `<root>/<device>/<name>.vil`. The store never looks inside the blob.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::device::DeviceIdentity;
use crate::error::{ProfileError, Result};

/// The profile every device always has; it cannot be deleted
pub const DEFAULT_PROFILE: &str = "Default";

/// File extension of stored profiles
pub const PROFILE_EXTENSION: &str = "vil";

/// Whether `name` can be used verbatim as a single path component
pub(crate) fn is_path_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Reject names that cannot be stored as `<name>.vil`
pub fn validate_profile_name(name: &str) -> Result<()> {
    if is_path_component(name) {
        Ok(())
    } else {
        Err(ProfileError::InvalidName(name.to_string()))
    }
}

/// Filesystem store of profile blobs, namespaced by device
#[derive(Debug, Clone)]
pub struct ProfileStore {
    /// Directory holding one sub-directory per device
    root: PathBuf,
}

impl ProfileStore {
    /// Create a store rooted at `root` (created lazily on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default profiles root: `<data_dir>/profswitch/Profiles`
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("profswitch").join("Profiles"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all profiles of `device`
    pub fn device_dir(&self, device: &DeviceIdentity) -> PathBuf {
        self.root.join(device.as_str())
    }

    /// Path of a single profile file
    pub fn profile_path(&self, device: &DeviceIdentity, name: &str) -> Result<PathBuf> {
        validate_profile_name(name)?;
        Ok(self
            .device_dir(device)
            .join(format!("{name}.{PROFILE_EXTENSION}")))
    }

    /// Whether a profile file exists (invalid names never exist)
    pub fn exists(&self, device: &DeviceIdentity, name: &str) -> bool {
        self.profile_path(device, name)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// List profile names of a device, `Default` first, then by name
    pub fn list(&self, device: &DeviceIdentity) -> Result<Vec<String>> {
        let dir = self.device_dir(device);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProfileError::io(dir, e)),
        };

        let mut profiles = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| ProfileError::io(&dir, e))?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != PROFILE_EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
                profiles.push(name.to_string());
            }
        }

        profiles.sort_by(|a, b| {
            (a != DEFAULT_PROFILE)
                .cmp(&(b != DEFAULT_PROFILE))
                .then_with(|| a.cmp(b))
        });
        Ok(profiles)
    }

    /// Read a profile blob
    pub fn read(&self, device: &DeviceIdentity, name: &str) -> Result<Vec<u8>> {
        let path = self.profile_path(device, name)?;
        match fs::read(&path) {
            Ok(data) => {
                debug!("Read profile '{}' ({} bytes) from {:?}", name, data.len(), path);
                Ok(data)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ProfileError::NotFound {
                device: device.clone(),
                name: name.to_string(),
            }),
            Err(e) => Err(ProfileError::io(path, e)),
        }
    }

    /// Create or overwrite a profile blob
    pub fn write(&self, device: &DeviceIdentity, name: &str, data: &[u8]) -> Result<()> {
        let path = self.profile_path(device, name)?;
        let dir = self.device_dir(device);
        fs::create_dir_all(&dir).map_err(|e| ProfileError::io(&dir, e))?;
        fs::write(&path, data).map_err(|e| ProfileError::io(&path, e))?;

        info!("Saved profile '{}' for device {} to {:?}", name, device, path);
        Ok(())
    }

    /// Delete a profile; `Default` is protected
    pub fn delete(&self, device: &DeviceIdentity, name: &str) -> Result<()> {
        if name == DEFAULT_PROFILE {
            return Err(ProfileError::Protected(name.to_string()));
        }

        let path = self.profile_path(device, name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted profile '{}' for device {}", name, device);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ProfileError::NotFound {
                device: device.clone(),
                name: name.to_string(),
            }),
            Err(e) => Err(ProfileError::io(path, e)),
        }
    }

    /// Store `current` as the `Default` profile unless one already exists
    ///
    /// Returns whether the profile was created.
    pub fn ensure_default(&self, device: &DeviceIdentity, current: &[u8]) -> Result<bool> {
        if self.exists(device, DEFAULT_PROFILE) {
            return Ok(false);
        }
        self.write(device, DEFAULT_PROFILE, current)?;
        info!("Created Default profile for device {}", device);
        Ok(true)
    }

    /// Create `name` as a copy of `fallback` unless it already exists
    ///
    /// Returns whether the profile was created.
    pub fn ensure_exists(
        &self,
        device: &DeviceIdentity,
        name: &str,
        fallback: &str,
    ) -> Result<bool> {
        validate_profile_name(name)?;
        if self.exists(device, name) {
            return Ok(false);
        }
        let data = self.read(device, fallback)?;
        self.write(device, name, &data)?;
        info!("Created profile '{}' from '{}' for device {}", name, fallback, device);
        Ok(true)
    }
}
