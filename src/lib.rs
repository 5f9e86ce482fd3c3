//! padmotiond library
//!
//! Public API for testing and integration.

pub mod battery;
pub mod clients;
pub mod config;
pub mod evdev;
pub mod gamepad;
pub mod input;
pub mod mapping;
pub mod normalize;
pub mod protocol;
pub mod server;
pub mod service;
pub mod slots;

/// Re-export commonly used types
pub use battery::{start_battery_updater, BatteryError};
pub use clients::ActiveClients;
pub use config::{Config, ConfigError};
pub use evdev::{list_gamepads, run_discovery, DeviceInfo, EvdevBackend, EvdevError};
pub use gamepad::{BatteryLevel, GamepadState, SlotTable, SLOT_COUNT};
pub use input::{DeviceEvent, GamepadBackend, GamepadDevice, InputKind};
pub use mapping::{MappingError, MappingSet};
pub use protocol::{decode_request, encode_pad_data_response, encode_response, Request, Response};
pub use server::{generate_server_id, MotionServer, DEFAULT_PORT};
pub use service::{MotionService, ServiceOptions};
pub use slots::DeviceManager;
