//! File-backed configuration editor
//!
//! The real editor lives in the configuration tool. For headless use the
//! live layout is a file on disk: restoring a profile writes the blob to it
//! and serializing reads it back. Whatever flashes layouts to the keyboard
//! watches that file.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::controller::ConfigEditor;
use crate::error::{ProfileError, Result};

/// Live layout stored in a single file
#[derive(Debug, Clone)]
pub struct LiveLayoutFile {
    path: PathBuf,
}

impl LiveLayoutFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `<data_dir>/profswitch/live.vil`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("profswitch").join("live.vil"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigEditor for LiveLayoutFile {
    fn restore_configuration(&mut self, blob: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ProfileError::io(parent, e))?;
        }
        // Write next to the target and rename, so readers never see half a layout
        let staging = self.path.with_extension("vil.tmp");
        fs::write(&staging, blob).map_err(|e| ProfileError::io(&staging, e))?;
        fs::rename(&staging, &self.path).map_err(|e| ProfileError::io(&self.path, e))?;

        info!("Restored {} byte layout to {:?}", blob.len(), self.path);
        Ok(())
    }

    fn serialize_configuration(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| ProfileError::io(&self.path, e))
    }
}
