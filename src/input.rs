//! Device input contract
//!
//! The core never talks to hardware directly. A backend (see [`crate::evdev`])
//! reports [`DeviceEvent`]s through a channel and hands out
//! [`GamepadDevice`] handles when the slot manager asks to open a device.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Normalized gamepad axis, values in SDL-native `i16` ranges
///
/// Sticks span `-32768..=32767`, triggers `0..=32767`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    LeftX,
    LeftY,
    RightX,
    RightY,
    TriggerLeft,
    TriggerRight,
}

/// Normalized gamepad button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    A,
    B,
    X,
    Y,
    Back,
    Guide,
    Start,
    LeftStick,
    RightStick,
    LeftShoulder,
    RightShoulder,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    Touchpad,
}

/// Which physical sensor of a device an accel/gyro reading comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorVariant {
    Primary,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// m/s², gravity included
    Accel(SensorVariant),
    /// rad/s
    Gyro(SensorVariant),
}

/// Power state as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerLevel {
    Unknown,
    Empty,
    Low,
    Medium,
    Full,
    Wired,
}

/// What happened on a device
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputKind {
    Added,
    Removed,
    Axis {
        axis: Axis,
        value: i16,
    },
    Button {
        button: Button,
        pressed: bool,
    },
    Touchpad {
        finger: u8,
        x: u16,
        y: u16,
        /// `> 0` while the finger is down
        pressure: f32,
    },
    Sensor {
        sensor: SensorKind,
        data: [f32; 3],
        /// Sensor clock in nanoseconds
        sensor_timestamp: u64,
    },
    Battery(PowerLevel),
}

/// One event from the device collaborator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceEvent {
    pub device_id: u32,
    /// Event time in nanoseconds. Events of one input frame share it.
    pub timestamp: u64,
    pub kind: InputKind,
}

impl DeviceEvent {
    pub fn new(device_id: u32, timestamp: u64, kind: InputKind) -> Self {
        Self {
            device_id,
            timestamp,
            kind,
        }
    }
}

/// Event time as nanoseconds since the Unix epoch, 0 for earlier times
pub fn timestamp_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Motion sensors a device exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionSensors {
    pub accel: Option<SensorVariant>,
    pub gyro: Option<SensorVariant>,
}

impl MotionSensors {
    /// Both an accelerometer and a gyroscope are present
    pub fn is_supported(&self) -> bool {
        self.accel.is_some() && self.gyro.is_some()
    }
}

/// An opened gamepad. Dropping it releases the native device.
pub trait GamepadDevice {
    fn name(&self) -> &str;

    fn motion_sensors(&self) -> MotionSensors;

    /// Switch motion reporting on or off, returns whether the device accepted it
    fn set_sensors_enabled(&mut self, enabled: bool) -> bool;
}

/// Source of gamepad handles
pub trait GamepadBackend {
    type Device: GamepadDevice;
    type Error: fmt::Display;

    fn open(&mut self, device_id: u32) -> Result<Self::Device, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_support_needs_both_sensors() {
        let mut sensors = MotionSensors::default();
        assert!(!sensors.is_supported());

        sensors.accel = Some(SensorVariant::Primary);
        assert!(!sensors.is_supported());

        sensors.gyro = Some(SensorVariant::Left);
        assert!(sensors.is_supported());
    }

    #[test]
    fn test_button_names_deserialize() {
        let buttons: Vec<Button> =
            serde_json::from_str(r#"["a", "dpad_up", "left_shoulder", "touchpad"]"#).unwrap();
        assert_eq!(
            buttons,
            vec![Button::A, Button::DpadUp, Button::LeftShoulder, Button::Touchpad]
        );
    }

    #[test]
    fn test_axis_names_deserialize() {
        let axis: Axis = serde_json::from_str(r#""trigger_right""#).unwrap();
        assert_eq!(axis, Axis::TriggerRight);
    }
}
