//! Application settings management
//!
//! Handles where profiles live, the poll interval and the remembered
//! profile per device.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::device::DeviceIdentity;
use crate::editor::LiveLayoutFile;
use crate::monitor::DEFAULT_POLL_INTERVAL;
use crate::profile::ProfileStore;

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Profiles root (defaults to `<data_dir>/profswitch/Profiles`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles_dir: Option<PathBuf>,

    /// Live layout file used by the headless editor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_layout: Option<PathBuf>,

    /// Focus poll period in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Last manually selected profile per device
    #[serde(default)]
    pub last_profiles: BTreeMap<String, String>,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            profiles_dir: None,
            live_layout: None,
            poll_interval_ms: default_poll_interval_ms(),
            last_profiles: BTreeMap::new(),
        }
    }
}

impl AppSettings {
    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("profswitch");
        Ok(config_dir.join("settings.toml"))
    }

    /// Load settings from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file: {:?}", path))?;
            let settings: AppSettings = toml::from_str(&content)
                .with_context(|| format!("Failed to parse settings file: {:?}", path))?;
            info!("Loaded settings from {:?}", path);
            Ok(settings)
        } else {
            info!("No settings file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save settings to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, content).context("Failed to write settings file")?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Profiles root to use
    pub fn profiles_root(&self) -> Result<PathBuf> {
        match &self.profiles_dir {
            Some(dir) => Ok(dir.clone()),
            None => ProfileStore::default_root().context("Could not find data directory"),
        }
    }

    /// Live layout file to use
    pub fn live_layout_path(&self) -> Result<PathBuf> {
        match &self.live_layout {
            Some(path) => Ok(path.clone()),
            None => LiveLayoutFile::default_path().context("Could not find data directory"),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Remembered profiles keyed by device (invalid entries are skipped)
    pub fn remembered_profiles(&self) -> BTreeMap<DeviceIdentity, String> {
        self.last_profiles
            .iter()
            .filter_map(|(id, name)| match DeviceIdentity::new(id.as_str()) {
                Ok(id) => Some((id, name.clone())),
                Err(e) => {
                    warn!("Ignoring remembered profile for {:?}: {}", id, e);
                    None
                }
            })
            .collect()
    }

    pub fn set_remembered_profiles(&mut self, remembered: &BTreeMap<DeviceIdentity, String>) {
        self.last_profiles = remembered
            .iter()
            .map(|(id, name)| (id.to_string(), name.clone()))
            .collect();
    }
}
