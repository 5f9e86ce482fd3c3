//! evdev gamepad backend
//!
//! Finds gamepads through the Linux evdev subsystem without requiring root
//! privileges (uses udev rules for device access) and feeds their input to
//! the motion service as [`DeviceEvent`]s.
//!
//! ## Device Detection
//! Scans `/dev/input/event*` every [`DEVICE_POLL_INTERVAL_SECS`] seconds. A
//! node is a gamepad when it has `BTN_SOUTH` and `ABS_X`. Drivers such as
//! hid-playstation and hid-nintendo register motion sensors and touchpads as
//! separate nodes named `"<gamepad> Motion Sensors"` and `"<gamepad> Touchpad"`,
//! those are paired with their gamepad.
//!
//! ## Event Handling
//! Every opened gamepad gets reader tasks for its nodes. Readers translate
//! kernel events into normalized inputs and stop when the device handle is
//! dropped or the node goes away.

use std::collections::HashMap;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use evdev::{Device, PropType};
use tokio::sync::{mpsc, watch};

use crate::battery::start_battery_updater;
use crate::input::{
    timestamp_nanos, Axis, Button, DeviceEvent, GamepadBackend, GamepadDevice, InputKind,
    MotionSensors, SensorKind, SensorVariant,
};
use crate::mapping::{ControllerMapping, MappingSet, ABS_HAT0X, ABS_HAT0Y, ABS_X, BTN_SOUTH};
use crate::normalize::STANDARD_GRAVITY;

/// Device polling interval (2 seconds)
pub const DEVICE_POLL_INTERVAL_SECS: u64 = 2;

const INPUT_DIR: &str = "/dev/input";

const MOTION_SUFFIX: &str = " Motion Sensors";
const TOUCHPAD_SUFFIX: &str = " Touchpad";

// Raw event types and codes not covered by the mapping table
const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;
const EV_ABS: u16 = 0x03;
const EV_MSC: u16 = 0x04;
const SYN_REPORT: u16 = 0x00;
const MSC_TIMESTAMP: u16 = 0x05;
const BTN_LEFT: u16 = 0x110;
const ABS_MT_SLOT: u16 = 0x2f;
const ABS_MT_POSITION_X: u16 = 0x35;
const ABS_MT_POSITION_Y: u16 = 0x36;
const ABS_MT_TRACKING_ID: u16 = 0x39;

// ============================================================================
// Discovery
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Gamepad,
    Motion,
    Touchpad,
}

/// One probed input node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub path: PathBuf,
    pub name: String,
    pub unique: String,
    pub kind: NodeKind,
}

/// A gamepad and its companion nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Path to the gamepad event device (e.g., /dev/input/event5)
    pub path: PathBuf,
    /// Device name as reported by the kernel
    pub name: String,
    /// Unique id (usually the Bluetooth address), may be empty
    pub unique: String,
    pub motion: Option<PathBuf>,
    pub touchpad: Option<PathBuf>,
}

impl DeviceInfo {
    /// Node name such as `event5`
    pub fn event_node(&self) -> Option<String> {
        self.path.file_name().and_then(|n| n.to_str()).map(str::to_string)
    }
}

/// Decide what a node is from its name and capabilities
pub fn classify_node(
    name: &str,
    has_gamepad_buttons: bool,
    has_abs_x: bool,
    is_accelerometer: bool,
    has_multitouch: bool,
) -> Option<NodeKind> {
    if is_accelerometer && name.ends_with(MOTION_SUFFIX) {
        Some(NodeKind::Motion)
    } else if has_multitouch && name.ends_with(TOUCHPAD_SUFFIX) {
        Some(NodeKind::Touchpad)
    } else if has_gamepad_buttons && has_abs_x {
        Some(NodeKind::Gamepad)
    } else {
        None
    }
}

fn open_node(path: &Path) -> Result<Device, EvdevError> {
    Device::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            EvdevError::PermissionDenied
        } else {
            EvdevError::IoError(e)
        }
    })
}

fn probe_node(path: &Path) -> Result<Option<NodeInfo>, EvdevError> {
    let device = open_node(path)?;
    let name = device.name().unwrap_or("Unknown").to_string();

    let has_gamepad_buttons = device
        .supported_keys()
        .map(|keys| keys.iter().any(|k| k.code() == BTN_SOUTH))
        .unwrap_or(false);
    let (has_abs_x, has_multitouch) = device
        .supported_absolute_axes()
        .map(|axes| {
            (
                axes.iter().any(|a| a.0 == ABS_X),
                axes.iter().any(|a| a.0 == ABS_MT_POSITION_X),
            )
        })
        .unwrap_or((false, false));
    let is_accelerometer = device.properties().contains(PropType::ACCELEROMETER);

    Ok(classify_node(&name, has_gamepad_buttons, has_abs_x, is_accelerometer, has_multitouch).map(
        |kind| NodeInfo {
            path: path.to_path_buf(),
            name,
            unique: device.unique_name().unwrap_or("").to_string(),
            kind,
        },
    ))
}

fn companion_of(gamepad: &NodeInfo, node: &NodeInfo, suffix: &str) -> bool {
    let same_unique = gamepad.unique.is_empty() || node.unique.is_empty() || gamepad.unique == node.unique;
    node.name.strip_suffix(suffix) == Some(gamepad.name.as_str()) && same_unique
}

/// Group probed nodes into gamepads with their motion and touchpad nodes
pub fn pair_nodes(mut nodes: Vec<NodeInfo>) -> Vec<DeviceInfo> {
    nodes.sort_by(|a, b| a.path.cmp(&b.path));
    let (gamepads, mut companions): (Vec<NodeInfo>, Vec<NodeInfo>) =
        nodes.into_iter().partition(|n| n.kind == NodeKind::Gamepad);

    let mut claim = |gamepad: &NodeInfo, kind: NodeKind, suffix: &str| -> Option<PathBuf> {
        let index = companions
            .iter()
            .position(|n| n.kind == kind && companion_of(gamepad, n, suffix))?;
        Some(companions.remove(index).path)
    };

    gamepads
        .into_iter()
        .map(|gamepad| {
            let motion = claim(&gamepad, NodeKind::Motion, MOTION_SUFFIX);
            let touchpad = claim(&gamepad, NodeKind::Touchpad, TOUCHPAD_SUFFIX);
            DeviceInfo {
                path: gamepad.path,
                name: gamepad.name,
                unique: gamepad.unique,
                motion,
                touchpad,
            }
        })
        .collect()
}

/// Scan /dev/input for gamepads
pub fn scan_gamepads() -> Result<Vec<DeviceInfo>, EvdevError> {
    let input_dir = PathBuf::from(INPUT_DIR);
    if !input_dir.exists() {
        tracing::error!("Input directory does not exist: {:?}", input_dir);
        return Err(EvdevError::DeviceNotFound);
    }

    let entries = std::fs::read_dir(&input_dir).map_err(EvdevError::IoError)?;
    let mut nodes = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        // Only check event devices
        if !filename.starts_with("event") {
            continue;
        }

        match probe_node(&path) {
            Ok(Some(node)) => nodes.push(node),
            Ok(None) => continue,
            Err(e) => {
                tracing::debug!("Could not check device {:?}: {}", path, e);
                continue;
            }
        }
    }

    Ok(pair_nodes(nodes))
}

/// Get a list of all gamepads, empty on error
pub fn list_gamepads() -> Vec<DeviceInfo> {
    scan_gamepads().unwrap_or_default()
}

/// Device ids handed out by discovery, shared with the backend
pub type DeviceRegistry = Arc<Mutex<HashMap<u32, DeviceInfo>>>;

pub fn new_device_registry() -> DeviceRegistry {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Tracks which gamepads are present between scans
pub struct Discovery {
    registry: DeviceRegistry,
    known: HashMap<PathBuf, u32>,
    next_id: u32,
}

impl Discovery {
    pub fn new(registry: DeviceRegistry) -> Self {
        Self {
            registry,
            known: HashMap::new(),
            next_id: 1,
        }
    }

    /// Diff a scan against the previous one
    pub fn update(&mut self, found: Vec<DeviceInfo>, timestamp: u64) -> Vec<DeviceEvent> {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let mut events = Vec::new();

        let present: Vec<PathBuf> = found.iter().map(|d| d.path.clone()).collect();
        self.known.retain(|path, &mut device_id| {
            if present.contains(path) {
                return true;
            }
            tracing::info!(device_id, path = %path.display(), "Gamepad disconnected");
            registry.remove(&device_id);
            events.push(DeviceEvent::new(device_id, timestamp, InputKind::Removed));
            false
        });

        for info in found {
            match self.known.get(&info.path) {
                Some(device_id) => {
                    // Companion nodes may show up after the gamepad
                    registry.insert(*device_id, info);
                }
                None => {
                    let device_id = self.next_id;
                    self.next_id += 1;
                    tracing::info!(
                        device_id,
                        path = %info.path.display(),
                        name = %info.name,
                        motion = info.motion.is_some(),
                        touchpad = info.touchpad.is_some(),
                        "Gamepad detected"
                    );
                    self.known.insert(info.path.clone(), device_id);
                    registry.insert(device_id, info);
                    events.push(DeviceEvent::new(device_id, timestamp, InputKind::Added));
                }
            }
        }

        events
    }
}

/// Rescan for gamepads until `stop` flips
pub async fn run_discovery(
    registry: DeviceRegistry,
    event_tx: mpsc::Sender<DeviceEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let mut discovery = Discovery::new(registry);
    let mut interval = tokio::time::interval(Duration::from_secs(DEVICE_POLL_INTERVAL_SECS));

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = interval.tick() => {}
        }

        let found = match scan_gamepads() {
            Ok(found) => found,
            Err(EvdevError::PermissionDenied) => {
                tracing::error!("Permission denied accessing input devices.");
                tracing::error!("Ensure udev rules are installed and user is in 'input' group.");
                continue;
            }
            Err(e) => {
                tracing::error!("Error during device scan: {}", e);
                continue;
            }
        };

        for event in discovery.update(found, timestamp_nanos(SystemTime::now())) {
            if event_tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

// ============================================================================
// Translation
// ============================================================================

/// Turns raw kernel events of one node into normalized inputs
pub trait NodeTranslator {
    fn feed(&mut self, ev_type: u16, code: u16, value: i32, time_ns: u64) -> Vec<InputKind>;
}

/// Reported range of an absolute axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsRange {
    pub min: i32,
    pub max: i32,
}

impl Default for AbsRange {
    fn default() -> Self {
        Self {
            min: i16::MIN as i32,
            max: i16::MAX as i32,
        }
    }
}

/// Rescale a kernel axis value to the normalized i16 range of `axis`
pub fn scale_axis(axis: Axis, value: i32, range: AbsRange) -> i16 {
    let span = i64::from(range.max) - i64::from(range.min);
    if span <= 0 {
        return 0;
    }
    let offset = i64::from(value) - i64::from(range.min);

    let scaled = match axis {
        Axis::TriggerLeft | Axis::TriggerRight => (offset * i64::from(i16::MAX) / span).clamp(0, i64::from(i16::MAX)),
        _ => (offset * 65535 / span + i64::from(i16::MIN)).clamp(i64::from(i16::MIN), i64::from(i16::MAX)),
    };
    scaled as i16
}

/// Gamepad node: buttons, sticks, triggers and the d-pad hat
pub struct GamepadTranslator {
    mapping: ControllerMapping,
    ranges: HashMap<u16, AbsRange>,
}

impl GamepadTranslator {
    pub fn new(mapping: ControllerMapping, ranges: HashMap<u16, AbsRange>) -> Self {
        Self { mapping, ranges }
    }
}

fn hat(negative: Button, positive: Button, value: i32) -> [InputKind; 2] {
    [
        InputKind::Button { button: negative, pressed: value < 0 },
        InputKind::Button { button: positive, pressed: value > 0 },
    ]
}

impl NodeTranslator for GamepadTranslator {
    fn feed(&mut self, ev_type: u16, code: u16, value: i32, _time_ns: u64) -> Vec<InputKind> {
        match ev_type {
            // Autorepeat (2) is not a state change
            EV_KEY if value == 0 || value == 1 => self
                .mapping
                .button(code)
                .map(|button| InputKind::Button { button, pressed: value == 1 })
                .into_iter()
                .collect(),
            EV_ABS if code == ABS_HAT0X => hat(Button::DpadLeft, Button::DpadRight, value).to_vec(),
            EV_ABS if code == ABS_HAT0Y => hat(Button::DpadUp, Button::DpadDown, value).to_vec(),
            EV_ABS => match self.mapping.axis(code) {
                Some(axis) => {
                    let range = self.ranges.get(&code).copied().unwrap_or_default();
                    vec![InputKind::Axis { axis, value: scale_axis(axis, value, range) }]
                }
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Finger {
    active: bool,
    x: u16,
    y: u16,
    dirty: bool,
}

/// Touchpad node: multitouch slots 0 and 1 plus the click button
#[derive(Debug, Default)]
pub struct TouchTranslator {
    slot: usize,
    fingers: [Finger; 2],
}

impl NodeTranslator for TouchTranslator {
    fn feed(&mut self, ev_type: u16, code: u16, value: i32, _time_ns: u64) -> Vec<InputKind> {
        match (ev_type, code) {
            (EV_KEY, BTN_LEFT) if value == 0 || value == 1 => {
                return vec![InputKind::Button { button: Button::Touchpad, pressed: value == 1 }];
            }
            (EV_ABS, ABS_MT_SLOT) => self.slot = usize::try_from(value).unwrap_or(usize::MAX),
            (EV_ABS, ABS_MT_TRACKING_ID | ABS_MT_POSITION_X | ABS_MT_POSITION_Y) => {
                if let Some(finger) = self.fingers.get_mut(self.slot) {
                    let coordinate = value.clamp(0, i32::from(u16::MAX)) as u16;
                    match code {
                        ABS_MT_TRACKING_ID => finger.active = value >= 0,
                        ABS_MT_POSITION_X => finger.x = coordinate,
                        _ => finger.y = coordinate,
                    }
                    finger.dirty = true;
                }
            }
            (EV_SYN, SYN_REPORT) => {
                let mut out = Vec::new();
                for (index, finger) in self.fingers.iter_mut().enumerate() {
                    if finger.dirty {
                        finger.dirty = false;
                        out.push(InputKind::Touchpad {
                            finger: index as u8,
                            x: finger.x,
                            y: finger.y,
                            pressure: if finger.active { 1.0 } else { 0.0 },
                        });
                    }
                }
                return out;
            }
            _ => {}
        }
        Vec::new()
    }
}

/// Extends the wrapping 32-bit microsecond sensor clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SensorClock {
    last: Option<u32>,
    micros: u64,
}

impl SensorClock {
    pub fn advance(&mut self, raw: u32) {
        self.micros = match self.last {
            Some(previous) => self.micros + u64::from(raw.wrapping_sub(previous)),
            None => u64::from(raw),
        };
        self.last = Some(raw);
    }

    pub fn nanos(&self) -> u64 {
        self.micros * 1000
    }
}

/// Motion node: accelerometer on ABS_X..Z, gyroscope on ABS_RX..RZ
pub struct MotionTranslator {
    variant: SensorVariant,
    /// Units per g, per axis
    accel_resolution: [f32; 3],
    /// Units per degree/s, per axis
    gyro_resolution: [f32; 3],
    accel: [i32; 3],
    gyro: [i32; 3],
    clock: SensorClock,
    has_clock: bool,
}

impl MotionTranslator {
    pub fn new(variant: SensorVariant, resolutions: &HashMap<u16, i32>) -> Self {
        let resolution = |code: u16| resolutions.get(&code).copied().filter(|&r| r > 0).unwrap_or(1) as f32;
        Self {
            variant,
            accel_resolution: [resolution(0x00), resolution(0x01), resolution(0x02)],
            gyro_resolution: [resolution(0x03), resolution(0x04), resolution(0x05)],
            accel: [0; 3],
            gyro: [0; 3],
            clock: SensorClock::default(),
            has_clock: false,
        }
    }
}

impl NodeTranslator for MotionTranslator {
    fn feed(&mut self, ev_type: u16, code: u16, value: i32, time_ns: u64) -> Vec<InputKind> {
        match (ev_type, code) {
            (EV_ABS, 0x00..=0x02) => self.accel[code as usize] = value,
            (EV_ABS, 0x03..=0x05) => self.gyro[code as usize - 3] = value,
            (EV_MSC, MSC_TIMESTAMP) => {
                self.clock.advance(value as u32);
                self.has_clock = true;
            }
            (EV_SYN, SYN_REPORT) => {
                let sensor_timestamp = if self.has_clock { self.clock.nanos() } else { time_ns };
                let mut accel = [0f32; 3];
                let mut gyro = [0f32; 3];
                for i in 0..3 {
                    accel[i] = self.accel[i] as f32 / self.accel_resolution[i] * STANDARD_GRAVITY;
                    gyro[i] = self.gyro[i] as f32 / self.gyro_resolution[i] * PI / 180.0;
                }
                return vec![
                    InputKind::Sensor {
                        sensor: SensorKind::Accel(self.variant),
                        data: accel,
                        sensor_timestamp,
                    },
                    InputKind::Sensor {
                        sensor: SensorKind::Gyro(self.variant),
                        data: gyro,
                        sensor_timestamp,
                    },
                ];
            }
            _ => {}
        }
        Vec::new()
    }
}

/// Joy-Cons report their side in the name
pub fn sensor_variant(name: &str) -> SensorVariant {
    if name.contains("(L)") {
        SensorVariant::Left
    } else if name.contains("(R)") {
        SensorVariant::Right
    } else {
        SensorVariant::Primary
    }
}

// ============================================================================
// Readers
// ============================================================================

fn abs_info(device: &Device) -> Vec<(u16, AbsRange, i32)> {
    match device.get_absinfo() {
        Ok(axes) => axes
            .map(|(code, info)| {
                (
                    code.0,
                    AbsRange {
                        min: info.minimum(),
                        max: info.maximum(),
                    },
                    info.resolution(),
                )
            })
            .collect(),
        Err(e) => {
            tracing::debug!(error = %e, "Could not read axis ranges");
            Vec::new()
        }
    }
}

/// Forward a node's events until `stop` flips or the node goes away
async fn run_reader<T: NodeTranslator>(
    device_id: u32,
    device: Device,
    mut translator: T,
    event_tx: mpsc::Sender<DeviceEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let name = device.name().unwrap_or("Unknown").to_string();
    let mut events = match device.into_event_stream() {
        Ok(events) => events,
        Err(e) => {
            tracing::error!(device_id, name = %name, "Failed to read events: {}", e);
            return;
        }
    };

    tracing::debug!(device_id, name = %name, "Listening for events");

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            result = events.next_event() => match result {
                Ok(event) => {
                    let time_ns = timestamp_nanos(event.timestamp());
                    for kind in translator.feed(event.event_type().0, event.code(), event.value(), time_ns) {
                        if event_tx.send(DeviceEvent::new(device_id, time_ns, kind)).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    tracing::info!(device_id, name = %name, "Input node closed: {}", e);
                    break;
                }
            }
        }
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Opens gamepads found by discovery
pub struct EvdevBackend {
    registry: DeviceRegistry,
    mappings: Arc<MappingSet>,
    event_tx: mpsc::Sender<DeviceEvent>,
    battery_poll: Duration,
}

impl EvdevBackend {
    pub fn new(
        registry: DeviceRegistry,
        mappings: Arc<MappingSet>,
        event_tx: mpsc::Sender<DeviceEvent>,
        battery_poll: Duration,
    ) -> Self {
        Self {
            registry,
            mappings,
            event_tx,
            battery_poll,
        }
    }
}

impl GamepadBackend for EvdevBackend {
    type Device = EvdevGamepad;
    type Error = EvdevError;

    fn open(&mut self, device_id: u32) -> Result<EvdevGamepad, EvdevError> {
        let info = self
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&device_id)
            .cloned()
            .ok_or(EvdevError::DeviceNotFound)?;

        let device = open_node(&info.path)?;
        let name = device.name().unwrap_or("Unknown").to_string();
        let ranges = abs_info(&device)
            .into_iter()
            .map(|(code, range, _)| (code, range))
            .collect();
        let translator = GamepadTranslator::new(self.mappings.for_device(&name), ranges);

        let (stop, stop_rx) = watch::channel(false);
        tokio::spawn(run_reader(device_id, device, translator, self.event_tx.clone(), stop_rx.clone()));

        if let Some(path) = &info.touchpad {
            match open_node(path) {
                Ok(touchpad) => {
                    tokio::spawn(run_reader(
                        device_id,
                        touchpad,
                        TouchTranslator::default(),
                        self.event_tx.clone(),
                        stop_rx.clone(),
                    ));
                }
                Err(e) => tracing::warn!(device_id, path = %path.display(), "Touchpad unavailable: {}", e),
            }
        }

        if let Some(node) = info.event_node() {
            tokio::spawn(start_battery_updater(
                device_id,
                node,
                self.battery_poll,
                self.event_tx.clone(),
                stop_rx,
            ));
        }

        let motion = match info.motion {
            Some(_) => {
                let variant = sensor_variant(&name);
                MotionSensors {
                    accel: Some(variant),
                    gyro: Some(variant),
                }
            }
            None => MotionSensors::default(),
        };

        Ok(EvdevGamepad {
            device_id,
            name,
            motion,
            motion_path: info.motion,
            event_tx: self.event_tx.clone(),
            stop,
            motion_stop: None,
        })
    }
}

/// An open gamepad, dropping it stops all its readers
pub struct EvdevGamepad {
    device_id: u32,
    name: String,
    motion: MotionSensors,
    motion_path: Option<PathBuf>,
    event_tx: mpsc::Sender<DeviceEvent>,
    stop: watch::Sender<bool>,
    motion_stop: Option<watch::Sender<bool>>,
}

impl GamepadDevice for EvdevGamepad {
    fn name(&self) -> &str {
        &self.name
    }

    fn motion_sensors(&self) -> MotionSensors {
        self.motion
    }

    fn set_sensors_enabled(&mut self, enabled: bool) -> bool {
        if !enabled {
            if let Some(stop) = self.motion_stop.take() {
                let _ = stop.send(true);
            }
            return true;
        }

        if self.motion_stop.is_some() {
            return true;
        }
        let (Some(path), Some(variant)) = (&self.motion_path, self.motion.accel) else {
            return false;
        };

        let device = match open_node(path) {
            Ok(device) => device,
            Err(e) => {
                tracing::warn!(device_id = self.device_id, path = %path.display(), "Motion sensors unavailable: {}", e);
                return false;
            }
        };
        let resolutions = abs_info(&device)
            .into_iter()
            .map(|(code, _, resolution)| (code, resolution))
            .collect();

        let (stop, stop_rx) = watch::channel(false);
        tokio::spawn(run_reader(
            self.device_id,
            device,
            MotionTranslator::new(variant, &resolutions),
            self.event_tx.clone(),
            stop_rx,
        ));
        self.motion_stop = Some(stop);
        true
    }
}

impl Drop for EvdevGamepad {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
        if let Some(stop) = self.motion_stop.take() {
            let _ = stop.send(true);
        }
    }
}

/// evdev error type
#[derive(Debug)]
pub enum EvdevError {
    /// Gamepad not found
    DeviceNotFound,
    /// Permission denied accessing device
    PermissionDenied,
    /// I/O error
    IoError(std::io::Error),
}

impl std::fmt::Display for EvdevError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvdevError::DeviceNotFound => write!(f, "Gamepad not found"),
            EvdevError::PermissionDenied => write!(
                f,
                "Permission denied. Ensure udev rules are installed and user is in 'input' group."
            ),
            EvdevError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for EvdevError {}
