//! profswitch - Keyboard Profile Switcher
//!
//! Keeps one layout per application for each keyboard and, in process
//! mode, loads the matching layout whenever application focus changes.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use crossbeam_channel::{self as chan, select};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, error, info};

use profswitch::device::{self, HidDeviceSource, StaticDeviceSource};
use profswitch::editor::LiveLayoutFile;
use profswitch::focus::{self, DisplayServer};
use profswitch::settings::AppSettings;
use profswitch::{
    Device, DeviceIdentity, DeviceKind, DeviceSource, FocusMonitor, LogPresenter,
    ProfileController, ProfileStore,
};

#[derive(Parser, Debug)]
#[command(name = "profswitch", about = "Per-application keyboard profiles", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Profiles root directory
    #[arg(long, value_name = "DIR", global = true)]
    profiles_dir: Option<PathBuf>,

    /// Use this device identity instead of USB detection
    #[arg(long, value_name = "ID", global = true)]
    device: Option<String>,

    /// Live layout file profiles are loaded into
    #[arg(long, value_name = "FILE", global = true)]
    live: Option<PathBuf>,

    /// Settings file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List detected keyboards
    Devices,
    /// List the device's profiles
    List,
    /// List running applications that have no profile yet
    Apps,
    /// Copy a layout file into a profile
    Import { file: PathBuf, name: String },
    /// Copy a profile into a layout file
    Export { name: String, file: PathBuf },
    #[command(flatten)]
    Controller(ControllerCommand),
}

/// Commands that go through the profile controller
#[derive(Subcommand, Debug)]
enum ControllerCommand {
    /// Create a profile as a copy of Default and load it
    Add { name: String },
    /// Delete a profile and load Default
    Delete { name: String },
    /// Load a profile into the live layout
    Select { name: String },
    /// Store the live layout into a profile (the selected one by default)
    Save { name: Option<String> },
    /// Switch profiles as application focus changes, until Ctrl-C
    Run,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    if let Err(e) = run(cli) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings_path = match &cli.config {
        Some(path) => path.clone(),
        None => AppSettings::settings_path()?,
    };
    let mut settings = AppSettings::load_from(&settings_path)?;
    if let Some(dir) = &cli.profiles_dir {
        settings.profiles_dir = Some(dir.clone());
    }
    if let Some(live) = &cli.live {
        settings.live_layout = Some(live.clone());
    }

    let store = ProfileStore::new(settings.profiles_root()?);
    let devices = device_source(cli.device.as_deref())?;

    match cli.command {
        Command::Devices => {
            let keyboards = device::list_keyboards()?;
            if keyboards.is_empty() {
                println!("No keyboards found");
            }
            for kb in keyboards {
                println!("{}\t{:?}\t{}", kb.identity(), kb.kind, kb.title());
            }
            Ok(())
        }
        Command::List => {
            let device = require_device(devices.as_ref())?;
            let remembered = settings.last_profiles.get(device.identity.as_str());
            for name in store.list(&device.identity)? {
                let marker = if Some(&name) == remembered { "*" } else { " " };
                println!("{marker} {name}");
            }
            Ok(())
        }
        Command::Apps => {
            let device = require_device(devices.as_ref())?;
            let existing = store.list(&device.identity)?;
            let probe = focus::create_probe(DisplayServer::detect());
            for name in probe.known_applications()? {
                if !existing.contains(&name) {
                    println!("{name}");
                }
            }
            Ok(())
        }
        Command::Import { file, name } => {
            let device = require_device(devices.as_ref())?;
            let data = fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            store.write(&device.identity, &name, &data)?;
            println!("Imported {:?} as '{}'", file, name);
            Ok(())
        }
        Command::Export { name, file } => {
            let device = require_device(devices.as_ref())?;
            let data = store.read(&device.identity, &name)?;
            fs::write(&file, data).with_context(|| format!("Failed to write {:?}", file))?;
            println!("Exported '{}' to {:?}", name, file);
            Ok(())
        }
        Command::Controller(command) => {
            let result = run_controller(command, &mut settings, store, devices);
            if let Err(e) = settings.save_to(&settings_path) {
                error!("Failed to save settings: {e:#}");
            }
            result
        }
    }
}

fn run_controller(
    command: ControllerCommand,
    settings: &mut AppSettings,
    store: ProfileStore,
    devices: Box<dyn DeviceSource>,
) -> Result<()> {
    let live = LiveLayoutFile::new(settings.live_layout_path()?);
    // Captured before device selection restores a profile over it
    let captured = match &command {
        ControllerCommand::Save { .. } => Some(
            fs::read(live.path()).with_context(|| format!("Failed to read {:?}", live.path()))?,
        ),
        _ => None,
    };

    let probe = focus::create_probe(DisplayServer::detect());
    let mut monitor = FocusMonitor::new(probe.clone(), settings.poll_interval());
    // Automatic switching stays off until process mode
    monitor.lock();
    let events = monitor.subscribe();

    let mut controller = ProfileController::new(
        store,
        devices,
        Box::new(live),
        probe,
        Arc::new(LogPresenter),
        monitor.handle(),
    )
    .with_remembered(settings.remembered_profiles());
    controller.on_device_changed()?;
    if controller.device().is_none() {
        bail!("No keyboard found");
    }

    match command {
        ControllerCommand::Add { name } => controller.on_profile_added(&name)?,
        ControllerCommand::Delete { name } => controller.on_profile_deleted(&name)?,
        ControllerCommand::Select { name } => controller.on_profile_selected(&name)?,
        ControllerCommand::Save { name } => {
            let device = controller
                .device()
                .map(|d| d.identity.clone())
                .context("No keyboard found")?;
            let name = name
                .or_else(|| controller.current_profile().map(str::to_string))
                .context("No profile selected")?;
            controller
                .store()
                .write(&device, &name, captured.as_deref().unwrap_or_default())?;
            controller.on_profile_selected(&name)?;
        }
        ControllerCommand::Run => {
            let (shutdown_tx, shutdown_rx) = chan::bounded::<()>(1);
            ctrlc::set_handler(move || {
                let _ = shutdown_tx.try_send(());
            })
            .context("Failed to set Ctrl-C handler")?;

            monitor.start()?;
            controller.enter_process_mode();
            info!("Watching application focus, press Ctrl-C to stop");

            loop {
                select! {
                    recv(events) -> name => match name {
                        Ok(name) => controller.on_focus_changed(&name),
                        Err(_) => break,
                    },
                    recv(shutdown_rx) -> _ => {
                        info!("Shutting down");
                        break;
                    }
                }
            }

            controller.exit_process_mode();
            monitor.stop();
        }
    }

    settings.set_remembered_profiles(controller.remembered());
    Ok(())
}

fn device_source(device: Option<&str>) -> Result<Box<dyn DeviceSource>> {
    Ok(match device {
        Some(id) => {
            let identity = DeviceIdentity::new(id)?;
            let title = format!("Keyboard {identity}");
            Box::new(StaticDeviceSource::new(Some(Device::new(
                identity,
                DeviceKind::Full,
                title,
            ))))
        }
        None => Box::new(HidDeviceSource::new(None)),
    })
}

fn require_device(devices: &dyn DeviceSource) -> Result<Device> {
    let device = devices.current_device().context("No keyboard found")?;
    if !device.supports_profiles() {
        bail!("{} does not support profiles", device.title);
    }
    Ok(device)
}
