//! Null/Fallback Focus Probe
//!
//! Used when no display server is available or detection fails.

use super::FocusProbe;
use crate::error::Result;

/// Null probe - never reports a focused application
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFocusProbe;

impl FocusProbe for NullFocusProbe {
    fn focused_application(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn known_applications(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
