//! Controller mapping
//!
//! Translates Linux input codes into normalized [`Button`]s and [`Axis`]es.
//! The built-in table follows the kernel gamepad API layout. A mapping file
//! can carry per-controller overrides:
//!
//! ```json
//! [
//!   {
//!     "name": "8bitdo",
//!     "buttons": { "304": "b", "305": "a" },
//!     "axes": { "2": "right_x", "5": "right_y" }
//!   }
//! ]
//! ```
//!
//! The first profile whose (case-insensitive) name pattern matches a device
//! is laid over the defaults.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::input::{Axis, Button};

// ============================================================================
// Linux input codes
// ============================================================================

pub const BTN_SOUTH: u16 = 0x130;
pub const BTN_EAST: u16 = 0x131;
pub const BTN_NORTH: u16 = 0x133;
pub const BTN_WEST: u16 = 0x134;
pub const BTN_TL: u16 = 0x136;
pub const BTN_TR: u16 = 0x137;
pub const BTN_SELECT: u16 = 0x13a;
pub const BTN_START: u16 = 0x13b;
pub const BTN_MODE: u16 = 0x13c;
pub const BTN_THUMBL: u16 = 0x13d;
pub const BTN_THUMBR: u16 = 0x13e;
pub const BTN_DPAD_UP: u16 = 0x220;
pub const BTN_DPAD_DOWN: u16 = 0x221;
pub const BTN_DPAD_LEFT: u16 = 0x222;
pub const BTN_DPAD_RIGHT: u16 = 0x223;

pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_Z: u16 = 0x02;
pub const ABS_RX: u16 = 0x03;
pub const ABS_RY: u16 = 0x04;
pub const ABS_RZ: u16 = 0x05;
pub const ABS_HAT0X: u16 = 0x10;
pub const ABS_HAT0Y: u16 = 0x11;

const DEFAULT_BUTTONS: [(u16, Button); 15] = [
    (BTN_SOUTH, Button::A),
    (BTN_EAST, Button::B),
    (BTN_WEST, Button::X),
    (BTN_NORTH, Button::Y),
    (BTN_TL, Button::LeftShoulder),
    (BTN_TR, Button::RightShoulder),
    (BTN_SELECT, Button::Back),
    (BTN_START, Button::Start),
    (BTN_MODE, Button::Guide),
    (BTN_THUMBL, Button::LeftStick),
    (BTN_THUMBR, Button::RightStick),
    (BTN_DPAD_UP, Button::DpadUp),
    (BTN_DPAD_DOWN, Button::DpadDown),
    (BTN_DPAD_LEFT, Button::DpadLeft),
    (BTN_DPAD_RIGHT, Button::DpadRight),
];

const DEFAULT_AXES: [(u16, Axis); 6] = [
    (ABS_X, Axis::LeftX),
    (ABS_Y, Axis::LeftY),
    (ABS_RX, Axis::RightX),
    (ABS_RY, Axis::RightY),
    (ABS_Z, Axis::TriggerLeft),
    (ABS_RZ, Axis::TriggerRight),
];

// ============================================================================
// Mapping
// ============================================================================

/// Code translation table for one controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerMapping {
    buttons: HashMap<u16, Button>,
    axes: HashMap<u16, Axis>,
}

impl Default for ControllerMapping {
    fn default() -> Self {
        Self {
            buttons: DEFAULT_BUTTONS.into_iter().collect(),
            axes: DEFAULT_AXES.into_iter().collect(),
        }
    }
}

impl ControllerMapping {
    pub fn button(&self, code: u16) -> Option<Button> {
        self.buttons.get(&code).copied()
    }

    pub fn axis(&self, code: u16) -> Option<Axis> {
        self.axes.get(&code).copied()
    }

    fn overlay(&mut self, profile: &MappingProfile) {
        // A remapped button or axis must not stay reachable from its old code
        for (&code, &button) in &profile.buttons {
            self.buttons.retain(|_, b| *b != button);
            self.buttons.insert(code, button);
        }
        for (&code, &axis) in &profile.axes {
            self.axes.retain(|_, a| *a != axis);
            self.axes.insert(code, axis);
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MappingProfile {
    name: String,
    #[serde(default)]
    buttons: HashMap<u16, Button>,
    #[serde(default)]
    axes: HashMap<u16, Axis>,
}

/// All profiles from a mapping file
#[derive(Debug, Clone, Default)]
pub struct MappingSet {
    profiles: Vec<(Regex, MappingProfile)>,
}

impl MappingSet {
    /// Load profiles from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(MappingError::IoError)?;
        let set = Self::from_json(&contents)?;

        tracing::info!(
            path = %path.display(),
            profiles = set.profiles.len(),
            "Controller mapping loaded"
        );
        Ok(set)
    }

    pub fn from_json(contents: &str) -> Result<Self, MappingError> {
        let raw: Vec<MappingProfile> =
            serde_json::from_str(contents).map_err(MappingError::ParseError)?;

        let mut profiles = Vec::with_capacity(raw.len());
        for profile in raw {
            let pattern = RegexBuilder::new(&profile.name)
                .case_insensitive(true)
                .build()
                .map_err(|e| MappingError::InvalidPattern(profile.name.clone(), e))?;
            profiles.push((pattern, profile));
        }
        Ok(Self { profiles })
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Mapping for a device, defaults plus the first matching profile
    pub fn for_device(&self, name: &str) -> ControllerMapping {
        let mut mapping = ControllerMapping::default();
        if let Some((_, profile)) = self.profiles.iter().find(|(pattern, _)| pattern.is_match(name)) {
            tracing::debug!(device = name, profile = %profile.name, "Applying controller mapping");
            mapping.overlay(profile);
        }
        mapping
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Mapping file error type
#[derive(Debug)]
pub enum MappingError {
    /// I/O error reading the file
    IoError(std::io::Error),
    /// JSON parsing error
    ParseError(serde_json::Error),
    /// Profile name is not a valid regex
    InvalidPattern(String, regex::Error),
}

impl std::fmt::Display for MappingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingError::IoError(e) => write!(f, "I/O error: {}", e),
            MappingError::ParseError(e) => write!(f, "Parse error: {}", e),
            MappingError::InvalidPattern(name, e) => {
                write!(f, "Invalid profile name pattern '{}': {}", name, e)
            }
        }
    }
}

impl std::error::Error for MappingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MappingError::IoError(e) => Some(e),
            MappingError::ParseError(e) => Some(e),
            MappingError::InvalidPattern(_, e) => Some(e),
        }
    }
}
