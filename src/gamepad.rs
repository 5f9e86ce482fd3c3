//! In-memory gamepad state
//!
//! One [`GamepadState`] per occupied slot, held in a fixed four-entry
//! [`SlotTable`]. Values are already in protocol units: the event normalizer
//! converts device-native readings before they land here.

use std::ops::{Index, IndexMut};

/// Number of device slots the protocol can address
pub const SLOT_COUNT: usize = 4;

// ============================================================================
// Battery
// ============================================================================

/// Battery level as reported on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BatteryLevel {
    #[default]
    Unknown = 0x00,
    Empty = 0x01,
    Low = 0x02,
    Medium = 0x03,
    Full = 0x05,
    Wired = 0xEE,
}

impl BatteryLevel {
    /// Wire byte for this level
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte, unknown values map to `Unknown`
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => BatteryLevel::Empty,
            0x02 => BatteryLevel::Low,
            0x03 => BatteryLevel::Medium,
            0x05 => BatteryLevel::Full,
            0xEE => BatteryLevel::Wired,
            _ => BatteryLevel::Unknown,
        }
    }
}

// ============================================================================
// Controls
// ============================================================================

/// Face buttons (Xbox naming, south = A)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaceButtons {
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dpad {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpecialButtons {
    pub back: bool,
    pub guide: bool,
    pub start: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Shoulders {
    pub left: bool,
    pub right: bool,
}

/// Analog trigger values, 0 at rest, 255 fully pulled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Triggers {
    pub left: u8,
    pub right: u8,
}

/// Analog stick position (0..=255 per axis) plus stick click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stick {
    pub pressed: bool,
    pub x: u8,
    pub y: u8,
}

/// One finger on the touchpad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Touch {
    pub touched: bool,
    /// Incremented on every new touch, wraps around
    pub id: u8,
    pub x: u16,
    pub y: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Touchpad {
    pub pressed: bool,
    pub first_touch: Touch,
    pub second_touch: Touch,
}

/// Accelerometer reading in g
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Accel {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Gyroscope reading in deg/s
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Gyro {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sensor {
    /// Device exposes both an accelerometer and a gyroscope
    pub supported: bool,
    pub accel: Accel,
    pub gyro: Gyro,
    /// Sensor clock in microseconds. Treated as an opaque change marker.
    pub timestamp: u64,
}

/// Complete state of one connected gamepad
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GamepadState {
    pub battery: BatteryLevel,
    pub face: FaceButtons,
    pub dpad: Dpad,
    pub special: SpecialButtons,
    pub shoulder: Shoulders,
    pub trigger: Triggers,
    pub left_stick: Stick,
    pub right_stick: Stick,
    pub touchpad: Touchpad,
    pub sensor: Sensor,
}

impl GamepadState {
    /// Fresh state for a newly opened device
    pub fn with_sensor_support(supported: bool) -> Self {
        let mut state = Self::default();
        state.sensor.supported = supported;
        state
    }
}

// ============================================================================
// Slot table
// ============================================================================

/// Fixed table of device slots, `None` marks a free slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotTable {
    slots: [Option<GamepadState>; SLOT_COUNT],
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first free slot
    pub fn find_free_slot(&self) -> Option<u8> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(|index| index as u8)
    }

    pub fn get(&self, slot: u8) -> Option<&GamepadState> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: u8) -> Option<&mut GamepadState> {
        self.slots.get_mut(slot as usize).and_then(Option::as_mut)
    }

    pub fn is_occupied(&self, slot: u8) -> bool {
        self.get(slot).is_some()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Iterate over `(slot, state)` for every slot
    pub fn iter(&self) -> impl Iterator<Item = (u8, Option<&GamepadState>)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, state)| (index as u8, state.as_ref()))
    }
}

impl Index<u8> for SlotTable {
    type Output = Option<GamepadState>;

    fn index(&self, slot: u8) -> &Self::Output {
        &self.slots[slot as usize]
    }
}

impl IndexMut<u8> for SlotTable {
    fn index_mut(&mut self, slot: u8) -> &mut Self::Output {
        &mut self.slots[slot as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_level_bytes() {
        assert_eq!(BatteryLevel::Unknown.as_byte(), 0x00);
        assert_eq!(BatteryLevel::Full.as_byte(), 0x05);
        assert_eq!(BatteryLevel::Wired.as_byte(), 0xEE);
        assert_eq!(BatteryLevel::from_byte(0x03), BatteryLevel::Medium);
        assert_eq!(BatteryLevel::from_byte(0x04), BatteryLevel::Unknown);
    }

    #[test]
    fn test_default_state_is_at_rest() {
        let state = GamepadState::default();
        assert_eq!(state.battery, BatteryLevel::Unknown);
        assert!(!state.face.a);
        assert_eq!(state.trigger.left, 0);
        assert_eq!(state.sensor.timestamp, 0);
        assert!(!state.sensor.supported);
    }

    #[test]
    fn test_find_free_slot_lowest_first() {
        let mut table = SlotTable::new();
        assert_eq!(table.find_free_slot(), Some(0));

        table[0] = Some(GamepadState::default());
        table[1] = Some(GamepadState::default());
        assert_eq!(table.find_free_slot(), Some(2));

        table[0] = None;
        assert_eq!(table.find_free_slot(), Some(0));
    }

    #[test]
    fn test_full_table_has_no_free_slot() {
        let mut table = SlotTable::new();
        for slot in 0..SLOT_COUNT as u8 {
            table[slot] = Some(GamepadState::default());
        }
        assert_eq!(table.find_free_slot(), None);
        assert_eq!(table.occupied_count(), 4);
    }

    #[test]
    fn test_out_of_range_slot_is_empty() {
        let table = SlotTable::new();
        assert!(table.get(7).is_none());
        assert!(!table.is_occupied(4));
    }
}
