//! padmotiond
//!
//! Serves gamepad buttons, sticks, touchpad and motion sensor data to
//! emulators over the DSU (cemuhook) UDP protocol.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use regex::RegexBuilder;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use padmotiond::{
    config::Config,
    evdev::{list_gamepads, new_device_registry, run_discovery, EvdevBackend, DEVICE_POLL_INTERVAL_SECS},
    mapping::MappingSet,
    normalize::SensorToggleCombo,
    server::{generate_server_id, MotionServer},
    service::{MotionService, ServiceOptions},
    slots::DeviceManager,
};

/// Capacity of the device event channel
const EVENT_CHANNEL_SIZE: usize = 256;

/// padmotiond - DSU motion server for Linux gamepads
#[derive(Parser, Debug)]
#[command(name = "padmotiond")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/padmotiond/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Only serve gamepads whose name matches this regex (case-insensitive)
    #[arg(short, long)]
    filter: Option<String>,

    /// Controller mapping profiles (JSON)
    #[arg(short, long)]
    mapping_file: Option<PathBuf>,

    /// Keep motion sensors on while no client is subscribed
    #[arg(long)]
    no_sensor_auto_toggle: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// List all detected gamepads and exit
    #[arg(long)]
    list_devices: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    write_config: bool,
}

impl Args {
    /// Lay command line flags over the loaded configuration
    fn apply_to(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(filter) = &self.filter {
            config.controller_filter = filter.clone();
        }
        if let Some(path) = &self.mapping_file {
            config.mapping_file = Some(path.clone());
        }
        if self.no_sensor_auto_toggle {
            config.sensor_auto_toggle = false;
        }
        config.validate();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Handle --list-devices flag
    if args.list_devices {
        print_gamepads();
        return Ok(());
    }

    info!("padmotiond starting...");

    let loaded = match &args.config {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    args.apply_to(&mut config);

    // Handle --write-config flag
    if args.write_config {
        if let Err(e) = config.save() {
            error!("Failed to write config: {}", e);
            return Err(e.into());
        }
        return Ok(());
    }

    let filter = RegexBuilder::new(&config.controller_filter)
        .case_insensitive(true)
        .build()
        .map_err(|e| {
            error!(filter = %config.controller_filter, "Invalid controller filter: {}", e);
            e
        })?;

    let mappings = match &config.mapping_file {
        Some(path) => match MappingSet::load(path) {
            Ok(set) => set,
            Err(e) => {
                error!(path = %path.display(), "Failed to load controller mapping: {}", e);
                return Err(e.into());
            }
        },
        None => MappingSet::default(),
    };

    let addr = config.socket_addr()?;
    let socket = match UdpSocket::bind(addr).await {
        Ok(socket) => socket,
        Err(e) => {
            error!(%addr, "Failed to bind UDP socket: {}", e);
            return Err(e.into());
        }
    };
    let server_id = generate_server_id();
    info!(%addr, server_id, "Listening for DSU clients");

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let registry = new_device_registry();
    let backend = EvdevBackend::new(
        registry.clone(),
        Arc::new(mappings),
        event_tx.clone(),
        Duration::from_secs(config.battery_poll_secs),
    );

    info!("Scanning for gamepads (polling every {}s)", DEVICE_POLL_INTERVAL_SECS);
    let discovery_handle = tokio::spawn(run_discovery(registry, event_tx, shutdown_rx.clone()));

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received, exiting...");
        let _ = shutdown_tx.send(true);
    });

    let service = MotionService::new(
        DeviceManager::new(backend, filter),
        MotionServer::new(socket, server_id),
        ServiceOptions {
            sensor_auto_toggle: config.sensor_auto_toggle,
            sensor_toggle_combo: SensorToggleCombo::new(config.sensor_toggle_combo.clone()),
        },
    );
    service.run(event_rx, shutdown_rx).await;

    if let Err(e) = discovery_handle.await {
        error!("Discovery task panicked: {:?}", e);
    }

    info!("padmotiond stopped");
    Ok(())
}

/// Resolve on ctrl-c or SIGTERM
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Cannot listen for SIGTERM: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

/// List all detected gamepads
fn print_gamepads() {
    println!("Scanning for gamepads...\n");

    let devices = list_gamepads();

    if devices.is_empty() {
        println!("No gamepads found.");
        println!("\nTroubleshooting:");
        println!("  - Ensure your controller is connected");
        println!("  - Check that udev rules are installed");
        println!("  - Verify user is in 'input' group");
        return;
    }

    println!("Found {} gamepad(s):\n", devices.len());

    for (i, device) in devices.iter().enumerate() {
        let motion_marker = if device.motion.is_some() { " [motion]" } else { "" };
        println!("{}. {}{}", i + 1, device.name, motion_marker);
        println!("   Path:     {:?}", device.path);
        if !device.unique.is_empty() {
            println!("   Unique:   {}", device.unique);
        }
        if let Some(path) = &device.motion {
            println!("   Motion:   {:?}", path);
        }
        if let Some(path) = &device.touchpad {
            println!("   Touchpad: {:?}", path);
        }
        println!();
    }
}
