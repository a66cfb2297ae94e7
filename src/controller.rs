//! Profile controller
//!
//! Binds device selection, manual profile management and focus changes to
//! "which layout is currently loaded". All methods run on the caller's
//! thread; focus events arrive through the monitor's single-slot channel
//! and are applied one at a time by [`ProfileController::handle_pending`].

use crossbeam_channel::Receiver;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::device::{Device, DeviceIdentity, DeviceSource};
use crate::error::{ProfileError, Result};
use crate::focus::FocusProbe;
use crate::monitor::MonitorHandle;
use crate::profile::{DEFAULT_PROFILE, ProfileStore, validate_profile_name};
use crate::ui_lock::UiLockCoordinator;

/// The configuration editor: produces and consumes layout blobs
pub trait ConfigEditor: Send {
    /// Load a blob into the editor (and onto the device)
    fn restore_configuration(&mut self, blob: &[u8]) -> Result<()>;

    /// Capture the live configuration as a blob
    fn serialize_configuration(&self) -> Result<Vec<u8>>;
}

/// The presentation layer
pub trait Presenter: Send + Sync {
    /// Enable or disable device/profile selectors and add/remove buttons
    fn set_manual_controls_enabled(&self, enabled: bool);

    /// Render the profile selector
    fn show_profiles(&self, view: &ProfileView);

    /// Non-blocking warning (automatic switching failures)
    fn warn(&self, message: &str);
}

/// What the profile selector should display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileView {
    /// Title of the active device
    pub device: Option<String>,
    pub names: Vec<String>,
    pub selected: Option<String>,
    /// False without a device or for devices that cannot hold profiles
    pub profiles_enabled: bool,
    /// False while `Default` is selected
    pub can_delete: bool,
}

/// Presenter for headless use: everything goes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn set_manual_controls_enabled(&self, enabled: bool) {
        debug!("Manual controls {}", if enabled { "enabled" } else { "disabled" });
    }

    fn show_profiles(&self, view: &ProfileView) {
        match &view.device {
            Some(device) if view.profiles_enabled => info!(
                "{}: profiles {:?}, selected {:?}",
                device, view.names, view.selected
            ),
            Some(device) => info!("{}: profiles not supported", device),
            None => info!("No device"),
        }
    }

    fn warn(&self, message: &str) {
        warn!("{}", message);
    }
}

/// The selected device and its profile state
#[derive(Debug)]
struct ActiveDevice {
    device: Device,
    profiles: Vec<String>,
    current: Option<String>,
}

pub struct ProfileController {
    store: ProfileStore,
    devices: Box<dyn DeviceSource>,
    editor: Box<dyn ConfigEditor>,
    probe: Arc<dyn FocusProbe>,
    presenter: Arc<dyn Presenter>,
    monitor: MonitorHandle,
    ui_lock: Arc<UiLockCoordinator>,
    active: Option<ActiveDevice>,
    /// Last manually selected profile per device
    remembered: BTreeMap<DeviceIdentity, String>,
    process_mode: bool,
}

impl ProfileController {
    pub fn new(
        store: ProfileStore,
        devices: Box<dyn DeviceSource>,
        editor: Box<dyn ConfigEditor>,
        probe: Arc<dyn FocusProbe>,
        presenter: Arc<dyn Presenter>,
        monitor: MonitorHandle,
    ) -> Self {
        let ui_lock = Arc::new(UiLockCoordinator::new(presenter.clone(), monitor.clone()));
        Self {
            store,
            devices,
            editor,
            probe,
            presenter,
            monitor,
            ui_lock,
            active: None,
            remembered: BTreeMap::new(),
            process_mode: false,
        }
    }

    /// Seed the remembered profile per device (e.g. from settings)
    pub fn with_remembered(mut self, remembered: BTreeMap<DeviceIdentity, String>) -> Self {
        self.remembered = remembered;
        self
    }

    pub fn remembered(&self) -> &BTreeMap<DeviceIdentity, String> {
        &self.remembered
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    /// The UI lock shared with other manual call sites
    pub fn ui_lock(&self) -> Arc<UiLockCoordinator> {
        Arc::clone(&self.ui_lock)
    }

    pub fn device(&self) -> Option<&Device> {
        self.active.as_ref().map(|active| &active.device)
    }

    pub fn current_profile(&self) -> Option<&str> {
        self.active.as_ref()?.current.as_deref()
    }

    pub fn profiles(&self) -> &[String] {
        self.active
            .as_ref()
            .map(|active| active.profiles.as_slice())
            .unwrap_or_default()
    }

    pub fn is_process_mode(&self) -> bool {
        self.process_mode
    }

    /// Snapshot for the profile selector
    pub fn view(&self) -> ProfileView {
        let Some(active) = &self.active else {
            return ProfileView::default();
        };
        let enabled = active.device.supports_profiles();
        ProfileView {
            device: Some(active.device.title.clone()),
            names: active.profiles.clone(),
            selected: active.current.clone(),
            profiles_enabled: enabled,
            can_delete: enabled
                && active
                    .current
                    .as_deref()
                    .is_some_and(|name| name != DEFAULT_PROFILE),
        }
    }

    /// Re-read the active device and load its remembered (or `Default`) profile
    ///
    /// The first selection of a device stores its live configuration as
    /// `Default`.
    pub fn on_device_changed(&mut self) -> Result<()> {
        let ui_lock = Arc::clone(&self.ui_lock);
        let _guard = ui_lock.guard(true);

        let result = self.select_device();
        self.publish();
        result
    }

    /// Load a profile chosen by the operator
    pub fn on_profile_selected(&mut self, name: &str) -> Result<()> {
        self.require_profiles()?;
        let result = self.load(name);
        if result.is_ok() {
            self.remember(name);
        }
        self.publish();
        result
    }

    /// Create a profile (copy of `Default`) and select it
    pub fn on_profile_added(&mut self, name: &str) -> Result<()> {
        validate_profile_name(name)?;
        let device = self.require_profiles()?.device.identity.clone();

        let ui_lock = Arc::clone(&self.ui_lock);
        let _guard = ui_lock.guard(true);

        let created = self.store.ensure_exists(&device, name, DEFAULT_PROFILE)?;
        let result = self.refresh_profiles().and_then(|()| self.load(name));
        match result {
            Ok(()) => self.remember(name),
            Err(ref e) if created => {
                // Do not leave a half-added profile behind
                warn!("Adding profile '{}' failed, removing it again: {}", name, e);
                if let Err(e) = self.store.delete(&device, name) {
                    warn!("Failed to remove profile '{}': {}", name, e);
                }
                if let Err(e) = self.refresh_profiles() {
                    warn!("Failed to refresh profiles for {}: {}", device, e);
                }
            }
            Err(_) => {}
        }
        self.publish();
        result
    }

    /// Delete a profile and fall back to `Default`
    pub fn on_profile_deleted(&mut self, name: &str) -> Result<()> {
        if name == DEFAULT_PROFILE {
            return Err(ProfileError::Protected(name.to_string()));
        }
        let device = self.require_profiles()?.device.identity.clone();

        let ui_lock = Arc::clone(&self.ui_lock);
        let _guard = ui_lock.guard(true);

        self.store.delete(&device, name)?;
        if self.remembered.get(&device).is_some_and(|r| r == name) {
            self.remembered.remove(&device);
        }

        let result = self
            .refresh_profiles()
            .and_then(|()| self.load(DEFAULT_PROFILE));
        self.publish();
        result
    }

    /// Apply the profile matching a newly focused application
    ///
    /// Only acts in process mode. Never creates profiles: an application
    /// without a stored profile gets `Default`. Failures leave the loaded
    /// configuration in place and are reported as warnings.
    pub fn on_focus_changed(&mut self, name: &str) {
        if !self.process_mode {
            debug!("Ignoring focus change to '{}' outside process mode", name);
            return;
        }
        let Some(active) = self
            .active
            .as_ref()
            .filter(|active| active.device.supports_profiles())
        else {
            debug!("Ignoring focus change to '{}' without a profile device", name);
            return;
        };

        let device = active.device.identity.clone();
        let target = if self.store.exists(&device, name) {
            name
        } else {
            DEFAULT_PROFILE
        };

        info!("Switching to profile '{}' for '{}'", target, name);
        match self.load(target) {
            Ok(()) => self.publish(),
            Err(e) => {
                warn!("Automatic switch to '{}' failed: {}", target, e);
                self.presenter
                    .warn(&format!("Could not switch to profile '{target}': {e}"));
            }
        }
    }

    /// Apply every focus event waiting on `events`; returns how many
    pub fn handle_pending(&mut self, events: &Receiver<String>) -> usize {
        let mut handled = 0;
        while let Ok(name) = events.try_recv() {
            self.on_focus_changed(&name);
            handled += 1;
        }
        handled
    }

    /// Let focus changes drive profile selection; manual controls are disabled
    pub fn enter_process_mode(&mut self) {
        if self.process_mode {
            return;
        }
        self.ui_lock.lock(false);
        self.monitor.unlock();
        self.process_mode = true;
        info!("Process mode started");
    }

    /// Return to manual profile selection
    pub fn exit_process_mode(&mut self) {
        if !self.process_mode {
            return;
        }
        self.monitor.lock();
        self.ui_lock.unlock(false);
        self.process_mode = false;
        info!("Process mode stopped");
    }

    /// Store the live configuration into the selected profile
    pub fn save_current(&self) -> Result<()> {
        let active = self.require_profiles()?;
        let name = active
            .current
            .clone()
            .ok_or(ProfileError::NoProfileSelected)?;
        let device = active.device.identity.clone();

        let data = self.editor.serialize_configuration()?;
        self.store.write(&device, &name, &data)
    }

    /// Application names offered when adding a profile
    ///
    /// Running applications that do not have a profile yet.
    pub fn add_candidates(&self) -> Vec<String> {
        let known = match self.probe.known_applications() {
            Ok(known) => known,
            Err(e) => {
                warn!("Could not list running applications: {}", e);
                Vec::new()
            }
        };
        let existing = self.profiles();
        known
            .into_iter()
            .filter(|name| !existing.contains(name))
            .collect()
    }

    fn select_device(&mut self) -> Result<()> {
        self.active = None;
        let Some(device) = self.devices.current_device() else {
            info!("No device selected");
            return Ok(());
        };
        info!("Selected device {} ({})", device.title, device.identity);

        let supports_profiles = device.supports_profiles();
        let identity = device.identity.clone();
        self.active = Some(ActiveDevice {
            device,
            profiles: Vec::new(),
            current: None,
        });
        if !supports_profiles {
            info!("Device {} does not support profiles", identity);
            return Ok(());
        }

        let live = self.editor.serialize_configuration()?;
        self.store.ensure_default(&identity, &live)?;
        self.refresh_profiles()?;

        let target = self
            .remembered
            .get(&identity)
            .filter(|name| self.profiles().contains(*name))
            .cloned()
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        self.load(&target)
    }

    fn require_profiles(&self) -> Result<&ActiveDevice> {
        let active = self.active.as_ref().ok_or(ProfileError::NoDevice)?;
        if !active.device.supports_profiles() {
            return Err(ProfileError::ProfilesUnsupported(
                active.device.identity.clone(),
            ));
        }
        Ok(active)
    }

    fn refresh_profiles(&mut self) -> Result<()> {
        let device = self.require_profiles()?.device.identity.clone();
        let profiles = self.store.list(&device)?;
        if let Some(active) = self.active.as_mut() {
            active.profiles = profiles;
        }
        Ok(())
    }

    /// Read a profile and hand it to the editor
    fn load(&mut self, name: &str) -> Result<()> {
        let device = self.require_profiles()?.device.identity.clone();
        let data = self.store.read(&device, name)?;
        self.editor.restore_configuration(&data)?;

        info!("Loaded profile '{}' for device {}", name, device);
        if let Some(active) = self.active.as_mut() {
            active.current = Some(name.to_string());
        }
        Ok(())
    }

    fn remember(&mut self, name: &str) {
        if let Some(active) = &self.active {
            self.remembered
                .insert(active.device.identity.clone(), name.to_string());
        }
    }

    fn publish(&self) {
        self.presenter.show_profiles(&self.view());
    }
}

impl Drop for ProfileController {
    fn drop(&mut self) {
        self.exit_process_mode();
    }
}
