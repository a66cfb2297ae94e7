//! Integration tests for profswitch
//!
//! These tests wire the profile store, focus monitor, UI lock and
//! controller together with in-memory editor, probe and presenter.
//! Tests that require hardware live in hardware_tests.rs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use profswitch::device::StaticDeviceSource;
use profswitch::{
    ConfigEditor, DEFAULT_PROFILE, Device, DeviceIdentity, DeviceKind, FocusMonitor, FocusProbe,
    Presenter, ProfileController, ProfileError, ProfileStore, ProfileView, Result,
};
use tempfile::TempDir;

/// Live configuration plus a log of every restore
#[derive(Default)]
struct EditorState {
    live: Vec<u8>,
    restores: Vec<Vec<u8>>,
    fail_restore: bool,
}

#[derive(Clone, Default)]
struct FakeEditor(Arc<Mutex<EditorState>>);

impl ConfigEditor for FakeEditor {
    fn restore_configuration(&mut self, blob: &[u8]) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        if state.fail_restore {
            return Err(ProfileError::Editor("device unplugged".to_string()));
        }
        state.live = blob.to_vec();
        state.restores.push(blob.to_vec());
        Ok(())
    }

    fn serialize_configuration(&self) -> Result<Vec<u8>> {
        Ok(self.0.lock().unwrap().live.clone())
    }
}

#[derive(Default)]
struct ProbeState {
    focused: Option<String>,
    known: Vec<String>,
}

#[derive(Clone, Default)]
struct FakeProbe(Arc<Mutex<ProbeState>>);

impl FakeProbe {
    fn focus(&self, name: &str) {
        self.0.lock().unwrap().focused = Some(name.to_string());
    }
}

impl FocusProbe for FakeProbe {
    fn focused_application(&self) -> Result<Option<String>> {
        Ok(self.0.lock().unwrap().focused.clone())
    }

    fn known_applications(&self) -> Result<Vec<String>> {
        Ok(self.0.lock().unwrap().known.clone())
    }
}

#[derive(Default)]
struct FakePresenter {
    controls: Mutex<Vec<bool>>,
    views: Mutex<Vec<ProfileView>>,
    warnings: Mutex<Vec<String>>,
}

impl Presenter for FakePresenter {
    fn set_manual_controls_enabled(&self, enabled: bool) {
        self.controls.lock().unwrap().push(enabled);
    }

    fn show_profiles(&self, view: &ProfileView) {
        self.views.lock().unwrap().push(view.clone());
    }

    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

struct Harness {
    _dir: TempDir,
    store: ProfileStore,
    devices: StaticDeviceSource,
    editor: FakeEditor,
    probe: FakeProbe,
    presenter: Arc<FakePresenter>,
    monitor: FocusMonitor,
}

fn keyboard(id: u64) -> Device {
    Device::new(DeviceIdentity::from(id), DeviceKind::Full, format!("Keyboard {id}"))
}

fn harness(device: Option<Device>, live: &[u8]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let editor = FakeEditor::default();
    editor.0.lock().unwrap().live = live.to_vec();
    let probe = FakeProbe::default();
    Harness {
        store: ProfileStore::new(dir.path().join("Profiles")),
        _dir: dir,
        devices: StaticDeviceSource::new(device),
        editor,
        monitor: FocusMonitor::new(Arc::new(probe.clone()), Duration::from_millis(10)),
        probe,
        presenter: Arc::new(FakePresenter::default()),
    }
}

impl Harness {
    fn controller(&self) -> ProfileController {
        ProfileController::new(
            self.store.clone(),
            Box::new(self.devices.clone()),
            Box::new(self.editor.clone()),
            Arc::new(self.probe.clone()),
            self.presenter.clone(),
            self.monitor.handle(),
        )
    }

    fn restores(&self) -> Vec<Vec<u8>> {
        self.editor.0.lock().unwrap().restores.clone()
    }

    fn set_fail_restore(&self, fail: bool) {
        self.editor.0.lock().unwrap().fail_restore = fail;
    }
}

fn id(n: u64) -> DeviceIdentity {
    DeviceIdentity::from(n)
}

#[test]
fn test_first_selection_stores_default() {
    let h = harness(Some(keyboard(42)), b"B0");
    let mut controller = h.controller();

    controller.on_device_changed().unwrap();

    assert_eq!(h.store.read(&id(42), DEFAULT_PROFILE).unwrap(), b"B0");
    assert_eq!(controller.profiles(), ["Default"]);
    assert_eq!(controller.current_profile(), Some(DEFAULT_PROFILE));
    assert_eq!(h.restores(), vec![b"B0".to_vec()]);

    let view = controller.view();
    assert!(view.profiles_enabled);
    assert!(!view.can_delete);
}

#[test]
fn test_existing_default_is_not_overwritten() {
    let h = harness(Some(keyboard(42)), b"B1");
    h.store.write(&id(42), DEFAULT_PROFILE, b"B0").unwrap();
    let mut controller = h.controller();

    controller.on_device_changed().unwrap();

    assert_eq!(h.store.read(&id(42), DEFAULT_PROFILE).unwrap(), b"B0");
    assert_eq!(h.restores(), vec![b"B0".to_vec()]);
}

#[test]
fn test_add_profile_copies_default() {
    let h = harness(Some(keyboard(42)), b"B0");
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();

    controller.on_profile_added("Firefox").unwrap();

    assert_eq!(h.store.read(&id(42), "Firefox").unwrap(), b"B0");
    assert_eq!(controller.profiles(), ["Default", "Firefox"]);
    assert_eq!(controller.current_profile(), Some("Firefox"));
    assert_eq!(controller.remembered()[&id(42)], "Firefox");
    assert!(controller.view().can_delete);
    assert_eq!(h.restores().last().unwrap(), b"B0");
}

#[test]
fn test_add_existing_profile_keeps_content() {
    let h = harness(Some(keyboard(42)), b"B0");
    h.store.write(&id(42), "Firefox", b"B1").unwrap();
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();

    controller.on_profile_added("Firefox").unwrap();

    assert_eq!(h.store.read(&id(42), "Firefox").unwrap(), b"B1");
    assert_eq!(h.restores().last().unwrap(), b"B1");
}

#[test]
fn test_add_rejects_invalid_name() {
    let h = harness(Some(keyboard(42)), b"B0");
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();

    let result = controller.on_profile_added("../etc");
    assert!(matches!(result, Err(ProfileError::InvalidName(_))));
    assert_eq!(controller.profiles(), ["Default"]);
}

#[test]
fn test_failed_add_is_rolled_back() {
    let h = harness(Some(keyboard(42)), b"B0");
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();

    h.set_fail_restore(true);
    assert!(controller.on_profile_added("Slack").is_err());

    assert!(!h.store.exists(&id(42), "Slack"));
    assert_eq!(controller.profiles(), ["Default"]);
    assert_eq!(controller.current_profile(), Some(DEFAULT_PROFILE));
    assert_eq!(controller.ui_lock().count(), 0);
}

#[test]
fn test_delete_default_is_refused() {
    let h = harness(Some(keyboard(42)), b"B0");
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();
    controller.on_profile_added("Firefox").unwrap();

    let result = controller.on_profile_deleted(DEFAULT_PROFILE);
    assert!(matches!(result, Err(ProfileError::Protected(_))));
    assert_eq!(controller.profiles(), ["Default", "Firefox"]);
    assert!(h.store.exists(&id(42), DEFAULT_PROFILE));
}

#[test]
fn test_delete_profile_falls_back_to_default() {
    let h = harness(Some(keyboard(42)), b"B0");
    h.store.write(&id(42), "Firefox", b"B1").unwrap();
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();
    controller.on_profile_selected("Firefox").unwrap();

    controller.on_profile_deleted("Firefox").unwrap();

    assert!(!h.store.exists(&id(42), "Firefox"));
    assert_eq!(controller.profiles(), ["Default"]);
    assert_eq!(controller.current_profile(), Some(DEFAULT_PROFILE));
    assert!(controller.remembered().get(&id(42)).is_none());
    assert_eq!(h.restores().last().unwrap(), b"B0");
}

#[test]
fn test_delete_missing_profile() {
    let h = harness(Some(keyboard(42)), b"B0");
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();

    let result = controller.on_profile_deleted("Ghost");
    assert!(result.as_ref().is_err_and(ProfileError::is_not_found));
    assert_eq!(controller.ui_lock().count(), 0);
}

#[test]
fn test_focus_change_in_process_mode_restores_once() {
    let h = harness(Some(keyboard(42)), b"B0");
    h.store.write(&id(42), "Firefox", b"B1").unwrap();
    let events = h.monitor.subscribe();
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();
    controller.enter_process_mode();
    let before = h.restores().len();

    h.probe.focus("Firefox");
    assert_eq!(h.monitor.handle().tick().as_deref(), Some("Firefox"));
    assert_eq!(controller.handle_pending(&events), 1);

    let restores = h.restores();
    assert_eq!(restores.len(), before + 1);
    assert_eq!(restores.last().unwrap(), b"B1");
    assert_eq!(controller.current_profile(), Some("Firefox"));

    // Same application again: nothing emitted, nothing restored
    assert_eq!(h.monitor.handle().tick(), None);
    assert_eq!(controller.handle_pending(&events), 0);
    assert_eq!(h.restores().len(), before + 1);
}

#[test]
fn test_focus_change_ignored_outside_process_mode() {
    let h = harness(Some(keyboard(42)), b"B0");
    h.store.write(&id(42), "Firefox", b"B1").unwrap();
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();
    let before = h.restores().len();

    controller.on_focus_changed("Firefox");

    assert_eq!(h.restores().len(), before);
    assert_eq!(controller.current_profile(), Some(DEFAULT_PROFILE));
}

#[test]
fn test_unknown_application_uses_default_without_creating() {
    let h = harness(Some(keyboard(42)), b"B0");
    h.store.write(&id(42), "Firefox", b"B1").unwrap();
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();
    controller.on_profile_selected("Firefox").unwrap();
    controller.enter_process_mode();

    controller.on_focus_changed("Slack");

    assert!(!h.store.exists(&id(42), "Slack"));
    assert_eq!(controller.current_profile(), Some(DEFAULT_PROFILE));
    assert_eq!(h.restores().last().unwrap(), b"B0");
    assert_eq!(h.store.list(&id(42)).unwrap(), ["Default", "Firefox"]);
}

#[test]
fn test_failed_switch_warns_and_keeps_state() {
    let h = harness(Some(keyboard(42)), b"B0");
    h.store.write(&id(42), "Firefox", b"B1").unwrap();
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();
    controller.enter_process_mode();

    h.set_fail_restore(true);
    controller.on_focus_changed("Firefox");

    assert_eq!(controller.current_profile(), Some(DEFAULT_PROFILE));
    assert_eq!(h.presenter.warnings.lock().unwrap().len(), 1);
    assert!(controller.is_process_mode());

    // The next focus change is still handled
    h.set_fail_restore(false);
    controller.on_focus_changed("Firefox");
    assert_eq!(controller.current_profile(), Some("Firefox"));
}

#[test]
fn test_stale_focus_events_are_superseded() {
    let h = harness(Some(keyboard(42)), b"B0");
    h.store.write(&id(42), "Code", b"B2").unwrap();
    let events = h.monitor.subscribe();
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();
    controller.enter_process_mode();
    let before = h.restores().len();

    h.probe.focus("Firefox");
    h.monitor.handle().tick();
    h.probe.focus("Code");
    h.monitor.handle().tick();

    assert_eq!(controller.handle_pending(&events), 1);
    assert_eq!(h.restores().len(), before + 1);
    assert_eq!(controller.current_profile(), Some("Code"));
}

#[test]
fn test_process_mode_toggles_locks() {
    let h = harness(Some(keyboard(42)), b"B0");
    let handle = h.monitor.handle();
    handle.lock();
    let mut controller = h.controller();
    let ui_lock = controller.ui_lock();

    controller.enter_process_mode();
    assert!(!handle.is_locked());
    assert_eq!(ui_lock.count(), 1);
    assert_eq!(h.presenter.controls.lock().unwrap().last(), Some(&false));

    // Entering twice does not stack locks
    controller.enter_process_mode();
    assert_eq!(ui_lock.count(), 1);

    controller.exit_process_mode();
    assert!(handle.is_locked());
    assert_eq!(ui_lock.count(), 0);
    assert_eq!(h.presenter.controls.lock().unwrap().last(), Some(&true));
}

#[test]
fn test_manual_operations_keep_monitor_paused() {
    let h = harness(Some(keyboard(42)), b"B0");
    let handle = h.monitor.handle();
    let events = h.monitor.subscribe();
    handle.lock();
    let mut controller = h.controller();

    controller.on_device_changed().unwrap();
    assert!(handle.is_locked());
    controller.on_profile_added("Slack").unwrap();
    assert!(handle.is_locked());
    controller.on_profile_deleted("Slack").unwrap();
    assert!(handle.is_locked());

    // Focus moves before process mode: nothing is observed yet
    h.store.write(&id(42), "Firefox", b"B1").unwrap();
    h.probe.focus("Firefox");
    assert_eq!(handle.tick(), None);
    assert_eq!(controller.handle_pending(&events), 0);

    // The first tick in process mode picks up the focused application
    controller.enter_process_mode();
    assert_eq!(handle.tick().as_deref(), Some("Firefox"));
    assert_eq!(controller.handle_pending(&events), 1);
    assert_eq!(controller.current_profile(), Some("Firefox"));
    assert_eq!(h.restores().last().unwrap(), b"B1");
}

#[test]
fn test_ui_lock_released_after_operations() {
    let h = harness(Some(keyboard(42)), b"B0");
    let mut controller = h.controller();
    let ui_lock = controller.ui_lock();

    controller.on_device_changed().unwrap();
    controller.on_profile_added("Firefox").unwrap();
    controller.on_profile_selected(DEFAULT_PROFILE).unwrap();
    let _ = controller.on_profile_deleted(DEFAULT_PROFILE);
    controller.on_profile_deleted("Firefox").unwrap();

    assert_eq!(ui_lock.count(), 0);
    let controls = h.presenter.controls.lock().unwrap();
    assert_eq!(controls.iter().filter(|enabled| !**enabled).count(), 3);
    assert_eq!(controls.last(), Some(&true));
}

#[test]
fn test_bootloader_has_no_profiles() {
    let device = Device::new(id(7), DeviceKind::Bootloader, "Bootloader");
    let h = harness(Some(device), b"B0");
    let mut controller = h.controller();

    controller.on_device_changed().unwrap();

    let view = controller.view();
    assert!(!view.profiles_enabled);
    assert!(view.names.is_empty());
    assert!(h.restores().is_empty());
    assert!(!h.store.device_dir(&id(7)).exists());
    assert!(matches!(
        controller.on_profile_selected(DEFAULT_PROFILE),
        Err(ProfileError::ProfilesUnsupported(_))
    ));

    controller.enter_process_mode();
    controller.on_focus_changed("Firefox");
    assert!(h.restores().is_empty());
}

#[test]
fn test_no_device() {
    let h = harness(None, b"B0");
    let mut controller = h.controller();

    controller.on_device_changed().unwrap();

    assert!(controller.device().is_none());
    assert_eq!(controller.view(), ProfileView::default());
    assert!(matches!(
        controller.on_profile_added("Firefox"),
        Err(ProfileError::NoDevice)
    ));
}

#[test]
fn test_remembered_profile_loaded_on_device_change() {
    let h = harness(Some(keyboard(42)), b"B0");
    h.store.write(&id(42), DEFAULT_PROFILE, b"B0").unwrap();
    h.store.write(&id(42), "Firefox", b"B1").unwrap();

    let mut remembered = std::collections::BTreeMap::new();
    remembered.insert(id(42), "Firefox".to_string());
    let mut controller = h.controller().with_remembered(remembered);

    controller.on_device_changed().unwrap();
    assert_eq!(controller.current_profile(), Some("Firefox"));
    assert_eq!(h.restores(), vec![b"B1".to_vec()]);
}

#[test]
fn test_stale_remembered_profile_falls_back() {
    let h = harness(Some(keyboard(42)), b"B0");
    let mut remembered = std::collections::BTreeMap::new();
    remembered.insert(id(42), "Gone".to_string());
    let mut controller = h.controller().with_remembered(remembered);

    controller.on_device_changed().unwrap();
    assert_eq!(controller.current_profile(), Some(DEFAULT_PROFILE));
}

#[test]
fn test_switching_devices() {
    let h = harness(Some(keyboard(42)), b"B0");
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();
    controller.on_profile_added("Firefox").unwrap();

    h.devices.replace(Some(keyboard(43)));
    controller.on_device_changed().unwrap();

    assert_eq!(controller.device().unwrap().identity, id(43));
    assert_eq!(controller.profiles(), ["Default"]);
    assert_eq!(h.store.list(&id(42)).unwrap(), ["Default", "Firefox"]);

    // Back to the first keyboard: its last selection is restored
    h.devices.replace(Some(keyboard(42)));
    controller.on_device_changed().unwrap();
    assert_eq!(controller.current_profile(), Some("Firefox"));
}

#[test]
fn test_save_current() {
    let h = harness(Some(keyboard(42)), b"B0");
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();
    controller.on_profile_added("Firefox").unwrap();

    h.editor.0.lock().unwrap().live = b"edited".to_vec();
    controller.save_current().unwrap();

    assert_eq!(h.store.read(&id(42), "Firefox").unwrap(), b"edited");
    assert_eq!(h.store.read(&id(42), DEFAULT_PROFILE).unwrap(), b"B0");
}

#[test]
fn test_add_candidates_skip_existing_profiles() {
    let h = harness(Some(keyboard(42)), b"B0");
    h.probe.0.lock().unwrap().known = vec![
        "Firefox".to_string(),
        "Code".to_string(),
        "Slack".to_string(),
    ];
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();
    controller.on_profile_added("Code").unwrap();

    assert_eq!(controller.add_candidates(), ["Firefox", "Slack"]);
}

#[test]
fn test_monitor_thread_delivers_to_controller() {
    let mut h = harness(Some(keyboard(42)), b"B0");
    h.store.write(&id(42), "Firefox", b"B1").unwrap();
    let events = h.monitor.subscribe();
    let mut controller = h.controller();
    controller.on_device_changed().unwrap();
    controller.enter_process_mode();

    h.probe.focus("Firefox");
    h.monitor.start().unwrap();
    let name = events.recv_timeout(Duration::from_secs(5)).unwrap();
    h.monitor.stop();

    controller.on_focus_changed(&name);
    assert_eq!(controller.current_profile(), Some("Firefox"));
}
