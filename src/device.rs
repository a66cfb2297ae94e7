//! Device identity and detection
//!
//! The transport layer owns the keyboard protocol. This module only needs to
//! know *which* keyboard is active and whether it is a full-feature device
//! that can hold profiles or a minimal (bootloader) device that cannot.

use anyhow::{Context, Result};
use hidapi::HidApi;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::error::ProfileError;
use crate::profile::is_path_component;

/// Raw HID usage page used by the keyboard configuration interface
pub const RAW_HID_USAGE_PAGE: u16 = 0xFF60;

/// Raw HID usage used by the keyboard configuration interface
pub const RAW_HID_USAGE: u16 = 0x61;

/// Serial number marker of keyboards running the configurable firmware
pub const KEYBOARD_SERIAL_MAGIC: &str = "vial:f64c2b3c";

/// Serial number marker of the firmware's bootloader
pub const BOOTLOADER_SERIAL_MAGIC: &str = "vibl:d4f8159c";

/// Stable identifier of a device's configuration namespace
///
/// Used as a directory name below the profiles root, so it is never empty
/// and never contains path separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Create an identity from a string, rejecting names unusable as a directory
    pub fn new(id: impl Into<String>) -> Result<Self, ProfileError> {
        let id = id.into();
        if !is_path_component(&id) {
            return Err(ProfileError::InvalidName(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for DeviceIdentity {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = ProfileError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<DeviceIdentity> for String {
    fn from(id: DeviceIdentity) -> Self {
        id.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a device is able to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Keyboard running the configurable firmware; supports profiles
    Full,
    /// Bootloader or otherwise minimal device; no profiles
    Bootloader,
}

/// The currently active device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub identity: DeviceIdentity,
    pub kind: DeviceKind,
    /// Human readable name
    pub title: String,
}

impl Device {
    pub fn new(identity: DeviceIdentity, kind: DeviceKind, title: impl Into<String>) -> Self {
        Self {
            identity,
            kind,
            title: title.into(),
        }
    }

    /// Whether profiles are offered for this device
    pub fn supports_profiles(&self) -> bool {
        self.kind == DeviceKind::Full
    }
}

/// Supplies the active device (implemented by the transport layer)
pub trait DeviceSource: Send {
    /// The device currently selected, if any
    fn current_device(&self) -> Option<Device>;
}

/// Device source with a fixed, replaceable device
///
/// Clones share the same slot, so one handle can swap the device while the
/// controller owns another.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceSource {
    device: Arc<Mutex<Option<Device>>>,
}

impl StaticDeviceSource {
    pub fn new(device: Option<Device>) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
        }
    }

    /// Swap the active device (simulates a hot-plug or a selector change)
    pub fn replace(&self, device: Option<Device>) {
        *self.device.lock().unwrap_or_else(PoisonError::into_inner) = device;
    }
}

impl DeviceSource for StaticDeviceSource {
    fn current_device(&self) -> Option<Device> {
        self.device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Information about a detected keyboard interface
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
    pub kind: DeviceKind,
}

impl DeviceInfo {
    /// Identity derived from USB ids
    ///
    /// The transport layer normally reads a firmware-provided keyboard id;
    /// without it, vendor and product id are the most stable key we have.
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity(format!("{:04x}{:04x}", self.vendor_id, self.product_id))
    }

    pub fn title(&self) -> String {
        if self.manufacturer.is_empty() {
            self.product.clone()
        } else {
            format!("{} {}", self.manufacturer, self.product)
        }
    }

    pub fn to_device(&self) -> Device {
        Device::new(self.identity(), self.kind, self.title())
    }
}

/// Decide what kind of device a HID interface belongs to
pub fn classify(usage_page: u16, usage: u16, serial: &str) -> Option<DeviceKind> {
    if serial.contains(BOOTLOADER_SERIAL_MAGIC) {
        return Some(DeviceKind::Bootloader);
    }
    if usage_page == RAW_HID_USAGE_PAGE
        && usage == RAW_HID_USAGE
        && serial.contains(KEYBOARD_SERIAL_MAGIC)
    {
        return Some(DeviceKind::Full);
    }
    None
}

/// List all connected keyboards (and their bootloaders)
pub fn list_keyboards() -> Result<Vec<DeviceInfo>> {
    let api = HidApi::new().context("Failed to initialize HID API")?;
    let mut devices: Vec<DeviceInfo> = Vec::new();

    for device in api.device_list() {
        let serial = device.serial_number().unwrap_or_default();
        let Some(kind) = classify(device.usage_page(), device.usage(), serial) else {
            continue;
        };

        debug!(
            "Found keyboard interface {:?} ({:04x}:{:04x}, {:?})",
            device.path().to_string_lossy(),
            device.vendor_id(),
            device.product_id(),
            kind
        );

        // Bootloaders expose a single interface but may be listed twice
        let duplicate = devices
            .iter()
            .any(|d| d.vendor_id == device.vendor_id() && d.product_id == device.product_id());
        if duplicate {
            continue;
        }

        devices.push(DeviceInfo {
            path: device.path().to_string_lossy().to_string(),
            vendor_id: device.vendor_id(),
            product_id: device.product_id(),
            manufacturer: device.manufacturer_string().unwrap_or_default().to_string(),
            product: device.product_string().unwrap_or_default().to_string(),
            serial: serial.to_string(),
            kind,
        });
    }

    Ok(devices)
}

/// Device source backed by HID enumeration
pub struct HidDeviceSource {
    /// Prefer this device when several keyboards are plugged in
    preferred: Option<DeviceIdentity>,
}

impl HidDeviceSource {
    pub fn new(preferred: Option<DeviceIdentity>) -> Self {
        Self { preferred }
    }
}

impl DeviceSource for HidDeviceSource {
    fn current_device(&self) -> Option<Device> {
        let devices = match list_keyboards() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Error scanning for keyboards: {e:#}");
                return None;
            }
        };

        let chosen = match &self.preferred {
            Some(id) => devices.iter().find(|d| &d.identity() == id),
            None => devices.first(),
        };
        chosen.map(DeviceInfo::to_device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_validation() {
        assert!(DeviceIdentity::new("12345").is_ok());
        assert!(DeviceIdentity::new("").is_err());
        assert!(DeviceIdentity::new("a/b").is_err());
        assert!(DeviceIdentity::new("..").is_err());
        assert_eq!(DeviceIdentity::from(42u64).as_str(), "42");
    }

    #[test]
    fn test_identity_deserialization_validates() {
        #[derive(Deserialize)]
        struct Wrapper {
            id: DeviceIdentity,
        }

        let ok: Wrapper = toml::from_str("id = \"feed1234\"").unwrap();
        assert_eq!(ok.id.as_str(), "feed1234");
        assert!(toml::from_str::<Wrapper>("id = \"../etc\"").is_err());
    }

    #[test]
    fn test_classify() {
        let serial = format!("{KEYBOARD_SERIAL_MAGIC}:abcdef");
        assert_eq!(
            classify(RAW_HID_USAGE_PAGE, RAW_HID_USAGE, &serial),
            Some(DeviceKind::Full)
        );
        // Keyboard interface other than the raw HID one
        assert_eq!(classify(0x01, 0x06, &serial), None);
        assert_eq!(
            classify(0x00, 0x00, BOOTLOADER_SERIAL_MAGIC),
            Some(DeviceKind::Bootloader)
        );
        assert_eq!(classify(RAW_HID_USAGE_PAGE, RAW_HID_USAGE, "plain"), None);
    }

    #[test]
    fn test_device_info_identity() {
        let info = DeviceInfo {
            path: "/dev/hidraw3".to_string(),
            vendor_id: 0x4653,
            product_id: 0x0001,
            manufacturer: "Acme".to_string(),
            product: "Board".to_string(),
            serial: KEYBOARD_SERIAL_MAGIC.to_string(),
            kind: DeviceKind::Full,
        };
        let device = info.to_device();
        assert_eq!(device.identity.as_str(), "46530001");
        assert_eq!(device.title, "Acme Board");
        assert!(device.supports_profiles());
    }

    #[test]
    fn test_static_source_replace() {
        let source = StaticDeviceSource::new(None);
        let handle = source.clone();
        assert!(source.current_device().is_none());

        handle.replace(Some(Device::new(
            DeviceIdentity::from(7u64),
            DeviceKind::Bootloader,
            "Bootloader",
        )));
        let device = source.current_device().unwrap();
        assert!(!device.supports_profiles());
    }
}
