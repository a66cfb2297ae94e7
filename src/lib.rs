//! profswitch - focus-driven keyboard profile switching
//!
//! Switches the keyboard's active layout ("profile") based on which desktop
//! application has focus, while letting the operator manage profiles by hand.

pub mod controller;
pub mod device;
pub mod editor;
pub mod error;
pub mod focus;
pub mod monitor;
pub mod profile;
pub mod settings;
pub mod ui_lock;

pub use controller::{ConfigEditor, LogPresenter, Presenter, ProfileController, ProfileView};
pub use device::{Device, DeviceIdentity, DeviceKind, DeviceSource};
pub use error::{ProfileError, Result};
pub use focus::FocusProbe;
pub use monitor::{FocusMonitor, MonitorHandle};
pub use profile::{DEFAULT_PROFILE, ProfileStore};
pub use ui_lock::{UiLockCoordinator, UiLockGuard};
