//! Configuration management for padmotiond
//!
//! Handles loading, validation and saving of the JSON configuration file.
//! Configuration is stored at `~/.config/padmotiond/config.json`. Command
//! line flags override individual values after loading.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::input::Button;
use crate::normalize::DEFAULT_SENSOR_TOGGLE_COMBO;
use crate::server::DEFAULT_PORT;

// ============================================================================
// Constants
// ============================================================================

/// Default config directory name
const CONFIG_DIR: &str = "padmotiond";

/// Default config file name
const CONFIG_FILE: &str = "config.json";

/// Default battery poll interval in seconds
const DEFAULT_BATTERY_POLL_SECS: u64 = 2;

// ============================================================================
// Main Configuration
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// UDP port the server listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Local address to bind
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Case-insensitive regex a gamepad name must match
    #[serde(default = "default_controller_filter")]
    pub controller_filter: String,

    /// Optional controller mapping profiles (JSON)
    #[serde(default)]
    pub mapping_file: Option<PathBuf>,

    /// Turn motion sensors off while no client is subscribed
    #[serde(default = "default_true")]
    pub sensor_auto_toggle: bool,

    /// Buttons that toggle motion reporting when held together
    #[serde(default = "default_sensor_toggle_combo")]
    pub sensor_toggle_combo: Vec<Button>,

    /// Seconds between battery reads
    #[serde(default = "default_battery_poll_secs")]
    pub battery_poll_secs: u64,

    /// Configuration file path (not serialized)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

fn default_port() -> u16 { DEFAULT_PORT }
fn default_bind_address() -> String { "0.0.0.0".to_string() }
fn default_controller_filter() -> String { ".*".to_string() }
fn default_true() -> bool { true }
fn default_sensor_toggle_combo() -> Vec<Button> { DEFAULT_SENSOR_TOGGLE_COMBO.to_vec() }
fn default_battery_poll_secs() -> u64 { DEFAULT_BATTERY_POLL_SECS }

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: default_bind_address(),
            controller_filter: default_controller_filter(),
            mapping_file: None,
            sensor_auto_toggle: true,
            sensor_toggle_combo: default_sensor_toggle_combo(),
            battery_poll_secs: DEFAULT_BATTERY_POLL_SECS,
            config_path: None,
        }
    }
}

impl Config {
    /// Get the default config directory path
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(CONFIG_DIR))
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load configuration from the default location
    ///
    /// Returns default config if file doesn't exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_config_path() {
            Some(path) => Self::load(&path),
            None => {
                tracing::warn!("Could not determine config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from file path
    ///
    /// Returns default config if file doesn't exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            let mut config = Self::default();
            config.config_path = Some(path.to_path_buf());
            return Ok(config);
        }

        let contents = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        let mut config: Config =
            serde_json::from_str(&contents).map_err(ConfigError::ParseError)?;

        config.validate();
        config.config_path = Some(path.to_path_buf());

        tracing::info!(
            path = %path.display(),
            port = config.port,
            filter = %config.controller_filter,
            sensor_auto_toggle = config.sensor_auto_toggle,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Normalise values that would otherwise misbehave
    pub fn validate(&mut self) {
        if self.controller_filter.trim().is_empty() {
            self.controller_filter = default_controller_filter();
        }
        self.sensor_toggle_combo.sort();
        self.sensor_toggle_combo.dedup();
        if self.sensor_toggle_combo.is_empty() {
            self.sensor_toggle_combo = default_sensor_toggle_combo();
        }
        self.battery_poll_secs = self.battery_poll_secs.max(1);
    }

    /// Address to bind the UDP socket to
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.bind_address.parse().map_err(|_| {
            ConfigError::ValidationError(format!("invalid bind address '{}'", self.bind_address))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = match &self.config_path {
            Some(p) => p.clone(),
            None => Self::default_config_path()
                .ok_or_else(|| ConfigError::ValidationError("No config path".to_string()))?,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }

        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::ParseError)?;
        fs::write(&path, contents).map_err(ConfigError::IoError)?;

        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration error type
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading/writing file
    IoError(std::io::Error),
    /// JSON parsing error
    ParseError(serde_json::Error),
    /// Validation error
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "I/O error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(e) => Some(e),
            ConfigError::ValidationError(_) => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
