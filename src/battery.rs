//! Gamepad battery polling
//!
//! Reads the HID power supply the kernel registers next to a gamepad's input
//! node (`/sys/class/input/eventN/device/device/power_supply/*`) and reports
//! level changes as [`InputKind::Battery`] events.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, watch};

use crate::input::{timestamp_nanos, DeviceEvent, InputKind, PowerLevel};

/// sysfs class directory for input nodes
const SYSFS_INPUT: &str = "/sys/class/input";

/// Find the power supply directory of an input node such as `event5`
pub fn find_power_supply(event_node: &str) -> Result<PathBuf, BatteryError> {
    find_power_supply_in(Path::new(SYSFS_INPUT), event_node)
}

fn find_power_supply_in(input_class: &Path, event_node: &str) -> Result<PathBuf, BatteryError> {
    let supplies = input_class.join(event_node).join("device/device/power_supply");
    if !supplies.exists() {
        return Err(BatteryError::DeviceNotFound);
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(&supplies)
        .map_err(BatteryError::IoError)?
        .flatten()
        .map(|entry| entry.path())
        .collect();
    entries.sort();
    entries.into_iter().next().ok_or(BatteryError::DeviceNotFound)
}

/// Classify a power supply reading
pub fn power_level_from_sysfs(status: &str, capacity: Option<u8>) -> PowerLevel {
    match status.trim() {
        "Charging" | "Full" => return PowerLevel::Wired,
        _ => {}
    }

    match capacity {
        None => PowerLevel::Unknown,
        Some(0..=5) => PowerLevel::Empty,
        Some(6..=20) => PowerLevel::Low,
        Some(21..=70) => PowerLevel::Medium,
        Some(_) => PowerLevel::Full,
    }
}

/// Read the current level of a power supply directory
pub fn read_power_level(supply: &Path) -> Result<PowerLevel, BatteryError> {
    let status = fs::read_to_string(supply.join("status")).map_err(BatteryError::IoError)?;
    let capacity = match fs::read_to_string(supply.join("capacity")) {
        Ok(raw) => Some(
            raw.trim()
                .parse::<u8>()
                .map_err(|e| BatteryError::ParseError(format!("capacity '{}': {}", raw.trim(), e)))?,
        ),
        Err(_) => None,
    };
    Ok(power_level_from_sysfs(&status, capacity))
}

/// Battery handler for one gamepad
pub struct BatteryHandler {
    device_id: u32,
    supply: PathBuf,
    last: Option<PowerLevel>,
}

impl BatteryHandler {
    pub fn new(device_id: u32, supply: PathBuf) -> Self {
        Self {
            device_id,
            supply,
            last: None,
        }
    }

    /// Read the level, returns it only when it differs from the last read
    pub fn poll(&mut self) -> Option<PowerLevel> {
        match read_power_level(&self.supply) {
            Ok(level) if self.last != Some(level) => {
                tracing::debug!(device_id = self.device_id, ?level, "Battery level changed");
                self.last = Some(level);
                Some(level)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(device_id = self.device_id, error = %e, "Failed to read battery");
                None
            }
        }
    }
}

/// Battery error type
#[derive(Debug)]
pub enum BatteryError {
    DeviceNotFound,
    IoError(std::io::Error),
    ParseError(String),
}

impl std::fmt::Display for BatteryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatteryError::DeviceNotFound => write!(f, "No power supply found"),
            BatteryError::IoError(e) => write!(f, "I/O error: {}", e),
            BatteryError::ParseError(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for BatteryError {}

/// Poll a gamepad's battery until `stop` flips
pub async fn start_battery_updater(
    device_id: u32,
    event_node: String,
    poll_interval: Duration,
    event_tx: mpsc::Sender<DeviceEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let supply = match find_power_supply(&event_node) {
        Ok(supply) => supply,
        Err(e) => {
            tracing::debug!(device_id, node = %event_node, error = %e, "Battery not available");
            return;
        }
    };

    tracing::debug!(device_id, supply = %supply.display(), "Polling battery");
    let mut handler = BatteryHandler::new(device_id, supply);
    let mut interval = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = interval.tick() => {
                if let Some(level) = handler.poll() {
                    let event = DeviceEvent::new(device_id, timestamp_nanos(SystemTime::now()), InputKind::Battery(level));
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}
