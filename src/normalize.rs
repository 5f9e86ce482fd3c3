//! Event normalizer
//!
//! Turns device-native readings into protocol units and applies them to a
//! [`GamepadState`]. Every mutation reports whether the state actually
//! changed so the orchestration loop only notifies clients about real
//! updates.
//!
//! All conversions are deterministic integer or single-precision float
//! arithmetic and must stay bit-for-bit stable, clients compare successive
//! frames.

use crate::gamepad::{BatteryLevel, GamepadState, Touch};
use crate::input::{Axis, Button, InputKind, PowerLevel, SensorKind};

/// Upper bound of a device-native axis
pub const AXIS_MAX: i32 = 32767;

/// Lower bound of a device-native axis
pub const AXIS_MIN: i32 = -32768;

/// Standard gravity in m/s²
pub const STANDARD_GRAVITY: f32 = 9.80665;

// ============================================================================
// Remapping
// ============================================================================

fn remap_range(value: i32, old_min: i32, new_min: i32, old_range: i32, new_range: i32) -> u8 {
    (((value - old_min) * new_range) / old_range + new_min) as u8
}

/// Trigger axis `[0, 32767]` to `[0, 255]`, negative readings count as rest
pub fn remap_trigger(raw: i16) -> u8 {
    let value = i32::from(raw).max(0);
    remap_range(value, 0, 0, AXIS_MAX, i32::from(u8::MAX))
}

/// Stick axis `[-32768, 32767]` to `[0, 255]`
pub fn remap_stick(raw: i16) -> u8 {
    remap_range(
        i32::from(raw),
        AXIS_MIN,
        0,
        AXIS_MAX - AXIS_MIN,
        i32::from(u8::MAX),
    )
}

/// Sensor clock nanoseconds to protocol microseconds
pub fn sensor_timestamp_to_micros(nanos: u64) -> u64 {
    nanos / 1000
}

/// m/s² to multiples of g
pub fn accel_to_protocol(value: f32) -> f32 {
    value / STANDARD_GRAVITY
}

/// rad/s to deg/s
///
/// The multiplication happens in single precision and the division by π in
/// double precision, matching what existing servers emit.
pub fn gyro_to_protocol(value: f32) -> f32 {
    (f64::from(value * 180.0) / std::f64::consts::PI) as f32
}

// ============================================================================
// Change detection
// ============================================================================

fn try_modify<T: PartialEq>(from: &mut T, to: T) -> bool {
    if *from == to {
        return false;
    }
    *from = to;
    true
}

/// Float update, differences within one float step are not changes
fn try_modify_float(from: &mut f32, to: f32) -> bool {
    if (*from - to).abs() <= f32::EPSILON {
        return false;
    }
    *from = to;
    true
}

// ============================================================================
// Per-kind handlers
// ============================================================================

pub fn apply_axis(state: &mut GamepadState, axis: Axis, value: i16) -> bool {
    match axis {
        Axis::TriggerLeft => try_modify(&mut state.trigger.left, remap_trigger(value)),
        Axis::TriggerRight => try_modify(&mut state.trigger.right, remap_trigger(value)),
        Axis::LeftX => try_modify(&mut state.left_stick.x, remap_stick(value)),
        Axis::LeftY => try_modify(&mut state.left_stick.y, remap_stick(value)),
        Axis::RightX => try_modify(&mut state.right_stick.x, remap_stick(value)),
        Axis::RightY => try_modify(&mut state.right_stick.y, remap_stick(value)),
    }
}

fn button_slot(state: &mut GamepadState, button: Button) -> &mut bool {
    match button {
        Button::A => &mut state.face.a,
        Button::B => &mut state.face.b,
        Button::X => &mut state.face.x,
        Button::Y => &mut state.face.y,
        Button::Back => &mut state.special.back,
        Button::Guide => &mut state.special.guide,
        Button::Start => &mut state.special.start,
        Button::LeftStick => &mut state.left_stick.pressed,
        Button::RightStick => &mut state.right_stick.pressed,
        Button::LeftShoulder => &mut state.shoulder.left,
        Button::RightShoulder => &mut state.shoulder.right,
        Button::DpadUp => &mut state.dpad.up,
        Button::DpadDown => &mut state.dpad.down,
        Button::DpadLeft => &mut state.dpad.left,
        Button::DpadRight => &mut state.dpad.right,
        Button::Touchpad => &mut state.touchpad.pressed,
    }
}

/// Current pressed state of a button
pub fn is_pressed(state: &GamepadState, button: Button) -> bool {
    let mut copy = *state;
    *button_slot(&mut copy, button)
}

pub fn apply_button(state: &mut GamepadState, button: Button, pressed: bool) -> bool {
    try_modify(button_slot(state, button), pressed)
}

fn apply_touch(touch: &mut Touch, x: u16, y: u16, pressure: f32) -> bool {
    let touched = pressure > 0.0;
    let mut changed = false;

    if touched && !touch.touched {
        touch.id = touch.id.wrapping_add(1);
        changed = true;
    }
    changed |= try_modify(&mut touch.touched, touched);
    changed |= try_modify(&mut touch.x, x);
    changed |= try_modify(&mut touch.y, y);
    changed
}

pub fn apply_touchpad(state: &mut GamepadState, finger: u8, x: u16, y: u16, pressure: f32) -> bool {
    match finger {
        0 => apply_touch(&mut state.touchpad.first_touch, x, y, pressure),
        1 => apply_touch(&mut state.touchpad.second_touch, x, y, pressure),
        _ => false,
    }
}

pub fn apply_sensor(
    state: &mut GamepadState,
    sensor: SensorKind,
    data: [f32; 3],
    sensor_timestamp: u64,
) -> bool {
    let motion = &mut state.sensor;
    let mut changed = try_modify(
        &mut motion.timestamp,
        sensor_timestamp_to_micros(sensor_timestamp),
    );

    match sensor {
        SensorKind::Accel(_) => {
            changed |= try_modify_float(&mut motion.accel.x, accel_to_protocol(-data[0]));
            changed |= try_modify_float(&mut motion.accel.y, accel_to_protocol(-data[1]));
            changed |= try_modify_float(&mut motion.accel.z, accel_to_protocol(-data[2]));
        }
        SensorKind::Gyro(_) => {
            changed |= try_modify_float(&mut motion.gyro.pitch, gyro_to_protocol(data[0]));
            changed |= try_modify_float(&mut motion.gyro.yaw, gyro_to_protocol(-data[1]));
            changed |= try_modify_float(&mut motion.gyro.roll, gyro_to_protocol(-data[2]));
        }
    }

    changed
}

pub fn apply_battery(state: &mut GamepadState, level: PowerLevel) -> bool {
    let level = match level {
        PowerLevel::Empty => BatteryLevel::Empty,
        PowerLevel::Low => BatteryLevel::Low,
        PowerLevel::Medium => BatteryLevel::Medium,
        PowerLevel::Full => BatteryLevel::Full,
        PowerLevel::Wired => BatteryLevel::Wired,
        PowerLevel::Unknown => return false,
    };
    try_modify(&mut state.battery, level)
}

/// Apply one input to a slot's state, returns whether anything changed
pub fn apply(state: &mut GamepadState, kind: &InputKind) -> bool {
    match *kind {
        InputKind::Axis { axis, value } => apply_axis(state, axis, value),
        InputKind::Button { button, pressed } => apply_button(state, button, pressed),
        InputKind::Touchpad {
            finger,
            x,
            y,
            pressure,
        } => apply_touchpad(state, finger, x, y, pressure),
        InputKind::Sensor {
            sensor,
            data,
            sensor_timestamp,
        } => apply_sensor(state, sensor, data, sensor_timestamp),
        InputKind::Battery(level) => apply_battery(state, level),
        InputKind::Added | InputKind::Removed => false,
    }
}

// ============================================================================
// Sensor toggle combination
// ============================================================================

/// Default button chord that toggles motion reporting
pub const DEFAULT_SENSOR_TOGGLE_COMBO: [Button; 4] =
    [Button::A, Button::Y, Button::DpadUp, Button::DpadDown];

/// Button chord that toggles motion reporting on a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorToggleCombo {
    buttons: Vec<Button>,
}

impl SensorToggleCombo {
    /// An empty chord falls back to the default one
    pub fn new(mut buttons: Vec<Button>) -> Self {
        buttons.sort();
        buttons.dedup();
        if buttons.is_empty() {
            buttons = DEFAULT_SENSOR_TOGGLE_COMBO.to_vec();
        }
        Self { buttons }
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }

    /// Whether a button that just changed completes the chord
    ///
    /// Only a press of one of the chord's own buttons can fire it, so holding
    /// the chord and moving a stick does not retrigger.
    pub fn is_triggered(&self, state: &GamepadState, button: Button, pressed: bool) -> bool {
        pressed
            && self.buttons.contains(&button)
            && self.buttons.iter().all(|&b| is_pressed(state, b))
    }
}

impl Default for SensorToggleCombo {
    fn default() -> Self {
        Self::new(DEFAULT_SENSOR_TOGGLE_COMBO.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SensorVariant;

    #[test]
    fn test_trigger_remap_bounds() {
        assert_eq!(remap_trigger(0), 0);
        assert_eq!(remap_trigger(32767), 255);
        assert_eq!(remap_trigger(16384), 127);
        assert_eq!(remap_trigger(-100), 0);
    }

    #[test]
    fn test_stick_remap_bounds() {
        assert_eq!(remap_stick(-32768), 0);
        assert_eq!(remap_stick(32767), 255);
        // (32768 * 255) / 65535 = 127.50.. truncated
        assert_eq!(remap_stick(0), 127);
    }

    #[test]
    fn test_sensor_timestamp_is_truncated_to_micros() {
        assert_eq!(sensor_timestamp_to_micros(1_999), 1);
        assert_eq!(sensor_timestamp_to_micros(5_000_000), 5_000);
    }

    #[test]
    fn test_accel_one_g_maps_to_one() {
        assert_eq!(accel_to_protocol(STANDARD_GRAVITY), 1.0);
        assert_eq!(accel_to_protocol(-STANDARD_GRAVITY), -1.0);
    }

    #[test]
    fn test_gyro_rad_to_deg() {
        let value = gyro_to_protocol(std::f32::consts::PI);
        assert!((value - 180.0).abs() < 1e-4);
        assert_eq!(gyro_to_protocol(0.0), 0.0);
    }

    #[test]
    fn test_axis_change_detection() {
        let mut state = GamepadState::default();
        assert!(apply_axis(&mut state, Axis::TriggerRight, 32767));
        assert_eq!(state.trigger.right, 255);
        assert!(!apply_axis(&mut state, Axis::TriggerRight, 32767));

        // Different raw value, same remapped value
        assert!(apply_axis(&mut state, Axis::LeftX, 0));
        assert!(!apply_axis(&mut state, Axis::LeftX, 1));
    }

    #[test]
    fn test_button_change_detection() {
        let mut state = GamepadState::default();
        assert!(apply_button(&mut state, Button::A, true));
        assert!(state.face.a);
        assert!(!apply_button(&mut state, Button::A, true));
        assert!(apply_button(&mut state, Button::A, false));

        assert!(apply_button(&mut state, Button::Touchpad, true));
        assert!(state.touchpad.pressed);
        assert!(apply_button(&mut state, Button::RightStick, true));
        assert!(state.right_stick.pressed);
    }

    #[test]
    fn test_touch_id_increments_on_rising_edge_only() {
        let mut state = GamepadState::default();

        assert!(apply_touchpad(&mut state, 0, 100, 200, 1.0));
        assert_eq!(state.touchpad.first_touch.id, 1);
        assert!(state.touchpad.first_touch.touched);

        // Finger moves while down: same id
        assert!(apply_touchpad(&mut state, 0, 110, 200, 0.5));
        assert_eq!(state.touchpad.first_touch.id, 1);

        // Lift, then touch again
        assert!(apply_touchpad(&mut state, 0, 110, 200, 0.0));
        assert!(!state.touchpad.first_touch.touched);
        assert!(apply_touchpad(&mut state, 0, 110, 200, 1.0));
        assert_eq!(state.touchpad.first_touch.id, 2);

        // Second finger is independent
        assert!(apply_touchpad(&mut state, 1, 5, 5, 1.0));
        assert_eq!(state.touchpad.second_touch.id, 1);
        assert_eq!(state.touchpad.first_touch.id, 2);
    }

    #[test]
    fn test_touch_id_wraps() {
        let mut state = GamepadState::default();
        state.touchpad.first_touch.id = u8::MAX;
        assert!(apply_touchpad(&mut state, 0, 0, 0, 1.0));
        assert_eq!(state.touchpad.first_touch.id, 0);
    }

    #[test]
    fn test_third_finger_is_ignored() {
        let mut state = GamepadState::default();
        assert!(!apply_touchpad(&mut state, 2, 1, 1, 1.0));
        assert_eq!(state, GamepadState::default());
    }

    #[test]
    fn test_accel_axes_are_inverted() {
        let mut state = GamepadState::default();
        let changed = apply_sensor(
            &mut state,
            SensorKind::Accel(SensorVariant::Primary),
            [STANDARD_GRAVITY, 0.0, -STANDARD_GRAVITY],
            2_000_000,
        );
        assert!(changed);
        assert_eq!(state.sensor.accel.x, -1.0);
        assert_eq!(state.sensor.accel.y, 0.0);
        assert_eq!(state.sensor.accel.z, 1.0);
        assert_eq!(state.sensor.timestamp, 2_000);
    }

    #[test]
    fn test_gyro_yaw_and_roll_are_inverted() {
        let mut state = GamepadState::default();
        let rad = std::f32::consts::FRAC_PI_2;
        apply_sensor(
            &mut state,
            SensorKind::Gyro(SensorVariant::Left),
            [rad, rad, rad],
            1_000,
        );
        assert!(state.sensor.gyro.pitch > 89.9);
        assert!(state.sensor.gyro.yaw < -89.9);
        assert!(state.sensor.gyro.roll < -89.9);
    }

    #[test]
    fn test_sensor_timestamp_alone_is_a_change() {
        let mut state = GamepadState::default();
        let kind = SensorKind::Gyro(SensorVariant::Primary);
        assert!(apply_sensor(&mut state, kind, [0.0; 3], 1_000));
        assert!(!apply_sensor(&mut state, kind, [0.0; 3], 1_000));
        assert!(apply_sensor(&mut state, kind, [0.0; 3], 2_000));
    }

    #[test]
    fn test_float_noise_below_epsilon_is_not_a_change() {
        let mut value = 0.5f32;
        assert!(!try_modify_float(&mut value, 0.5 + f32::EPSILON / 2.0));
        assert!(try_modify_float(&mut value, 0.5 + 4.0 * f32::EPSILON));
    }

    #[test]
    fn test_battery_unknown_is_ignored() {
        let mut state = GamepadState::default();
        assert!(apply_battery(&mut state, PowerLevel::Wired));
        assert_eq!(state.battery, BatteryLevel::Wired);
        assert!(!apply_battery(&mut state, PowerLevel::Unknown));
        assert_eq!(state.battery, BatteryLevel::Wired);
    }

    #[test]
    fn test_lifecycle_events_do_not_mutate() {
        let mut state = GamepadState::default();
        assert!(!apply(&mut state, &InputKind::Added));
        assert!(!apply(&mut state, &InputKind::Removed));
    }

    #[test]
    fn test_default_combo_fires_on_last_button() {
        let combo = SensorToggleCombo::default();
        let mut state = GamepadState::default();

        for button in [Button::A, Button::Y, Button::DpadUp] {
            apply_button(&mut state, button, true);
            assert!(!combo.is_triggered(&state, button, true));
        }

        apply_button(&mut state, Button::DpadDown, true);
        assert!(combo.is_triggered(&state, Button::DpadDown, true));

        // Releasing never fires
        apply_button(&mut state, Button::DpadDown, false);
        assert!(!combo.is_triggered(&state, Button::DpadDown, false));
    }

    #[test]
    fn test_custom_combo() {
        let combo =
            SensorToggleCombo::new(vec![Button::Back, Button::A, Button::Y, Button::DpadUp]);
        let mut state = GamepadState::default();
        for button in [Button::Back, Button::A, Button::Y, Button::DpadUp] {
            apply_button(&mut state, button, true);
        }
        assert!(combo.is_triggered(&state, Button::DpadUp, true));
        // A button outside the chord does not fire it
        apply_button(&mut state, Button::B, true);
        assert!(!combo.is_triggered(&state, Button::B, true));
    }

    #[test]
    fn test_empty_combo_uses_default() {
        let combo = SensorToggleCombo::new(Vec::new());
        assert_eq!(combo, SensorToggleCombo::default());
    }
}
