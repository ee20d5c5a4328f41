//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::slime::packet::MacAddress;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub axis: AxisConfig,

    #[serde(default)]
    pub slime: SlimeConfig,

    #[serde(default)]
    pub osc: OscConfig,

    #[serde(default)]
    pub haptics: HapticsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rig network configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AxisConfig {
    #[serde(default = "default_telemetry_group")]
    pub telemetry_group: Ipv4Addr,

    #[serde(default = "default_telemetry_port")]
    pub telemetry_port: u16,

    #[serde(default = "default_message_group")]
    pub message_group: Ipv4Addr,

    #[serde(default = "default_message_port")]
    pub message_port: u16,

    #[serde(default = "default_command_endpoint")]
    pub command_endpoint: SocketAddr,

    /// Local interface used to join the multicast groups
    #[serde(default = "default_interface")]
    pub interface: Ipv4Addr,

    /// Seconds without a rotation change before a tracker counts as idle
    #[serde(default = "default_activity_timeout")]
    pub activity_timeout_secs: u64,
}

fn default_telemetry_group() -> Ipv4Addr {
    Ipv4Addr::new(239, 255, 239, 172)
}

fn default_telemetry_port() -> u16 {
    45071
}

fn default_message_group() -> Ipv4Addr {
    Ipv4Addr::new(239, 255, 239, 174)
}

fn default_message_port() -> u16 {
    45069
}

fn default_command_endpoint() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 45068))
}

fn default_interface() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_activity_timeout() -> u64 {
    60
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            telemetry_group: default_telemetry_group(),
            telemetry_port: default_telemetry_port(),
            message_group: default_message_group(),
            message_port: default_message_port(),
            command_endpoint: default_command_endpoint(),
            interface: default_interface(),
            activity_timeout_secs: default_activity_timeout(),
        }
    }
}

/// SlimeVR server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SlimeConfig {
    #[serde(default = "default_slime_endpoint")]
    pub endpoint: SocketAddr,

    /// Base device identifier, offset per tracker
    #[serde(default)]
    pub mac_address: MacAddress,

    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,

    #[serde(default = "default_firmware_build")]
    pub firmware_build: u32,
}

fn default_slime_endpoint() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 6969))
}

fn default_firmware_version() -> String {
    "0.4.0".to_string()
}

fn default_firmware_build() -> u32 {
    17
}

impl Default for SlimeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_slime_endpoint(),
            mac_address: MacAddress::default(),
            firmware_version: default_firmware_version(),
            firmware_build: default_firmware_build(),
        }
    }
}

/// OSC receive configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OscConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_osc_endpoint")]
    pub endpoint: SocketAddr,
}

fn default_osc_endpoint() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 9001))
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_osc_endpoint(),
        }
    }
}

/// Haptic feedback configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HapticsConfig {
    #[serde(default = "default_true")]
    pub enable_touch: bool,

    #[serde(default = "default_one")]
    pub touch_intensity: f32,

    #[serde(default = "default_one")]
    pub touch_duration_s: f32,

    #[serde(default = "default_true")]
    pub enable_proximity: bool,

    /// Values at or below this produce no vibration
    #[serde(default)]
    pub proximity_threshold: f32,

    #[serde(default = "default_prox_min_intensity")]
    pub proximity_min_intensity: f32,

    #[serde(default = "default_one")]
    pub proximity_max_intensity: f32,

    #[serde(default = "default_prox_duration")]
    pub proximity_duration_s: f32,

    /// Square proximity values before mapping them to intensity
    #[serde(default = "default_true")]
    pub nonlinear_proximity: bool,

    #[serde(default = "default_true")]
    pub enable_axhaptics_support: bool,

    #[serde(default = "default_true")]
    pub enable_bhaptics_support: bool,
}

fn default_true() -> bool {
    true
}

fn default_one() -> f32 {
    1.0
}

fn default_prox_min_intensity() -> f32 {
    0.25
}

fn default_prox_duration() -> f32 {
    0.1
}

impl HapticsConfig {
    /// Width of the proximity intensity range
    pub fn prox_intensity_range(&self) -> f32 {
        self.proximity_max_intensity - self.proximity_min_intensity
    }
}

impl Default for HapticsConfig {
    fn default() -> Self {
        Self {
            enable_touch: true,
            touch_intensity: default_one(),
            touch_duration_s: default_one(),
            enable_proximity: true,
            proximity_threshold: 0.0,
            proximity_min_intensity: default_prox_min_intensity(),
            proximity_max_intensity: default_one(),
            proximity_duration_s: default_prox_duration(),
            nonlinear_proximity: true,
            enable_axhaptics_support: true,
            enable_bhaptics_support: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("axslime").join("config.toml")),
            Some(PathBuf::from("/etc/axslime/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("AXSLIME_SLIME_ENDPOINT").and_then(|v| parse_addr(&v)) {
            self.slime.endpoint = addr;
        }
        if let Some(addr) = lookup("AXSLIME_OSC_ENDPOINT").and_then(|v| parse_addr(&v)) {
            self.osc.endpoint = addr;
        }
        if let Some(addr) = lookup("AXSLIME_COMMAND_ENDPOINT").and_then(|v| parse_addr(&v)) {
            self.axis.command_endpoint = addr;
        }

        if let Some(level) = lookup("AXSLIME_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("AXSLIME_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn parse_addr(value: &str) -> Option<SocketAddr> {
    match value.parse() {
        Ok(addr) => Some(addr),
        Err(e) => {
            tracing::warn!(value, error = %e, "Ignoring invalid socket address override");
            None
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# AxSlime Configuration
#
# Environment variables override these settings:
# - AXSLIME_SLIME_ENDPOINT
# - AXSLIME_OSC_ENDPOINT
# - AXSLIME_COMMAND_ENDPOINT
# - AXSLIME_LOG_LEVEL
# - AXSLIME_LOG_FORMAT

[axis]
# Telemetry multicast group and port
telemetry_group = "239.255.239.172"
telemetry_port = 45071

# Message multicast group and port
message_group = "239.255.239.174"
message_port = 45069

# Where rig commands are sent
command_endpoint = "127.0.0.1:45068"

# Interface used to join the multicast groups
interface = "0.0.0.0"

# Seconds without movement before a tracker is considered idle
activity_timeout_secs = 60

[slime]
# SlimeVR server address
endpoint = "127.0.0.1:6969"

# Base device identifier; each tracker adds its id to it
mac_address = "02:41:58:53:4C:00"

# Firmware identity announced in the handshake
firmware_version = "0.4.0"
firmware_build = 17

[osc]
# Receive haptics parameters over OSC
enabled = true

# OSC listen address
endpoint = "127.0.0.1:9001"

[haptics]
enable_touch = true
touch_intensity = 1.0
touch_duration_s = 1.0

enable_proximity = true
# Proximity values at or below this are ignored
proximity_threshold = 0.0
proximity_min_intensity = 0.25
proximity_max_intensity = 1.0
proximity_duration_s = 0.1
# Square proximity values for a steeper response near contact
nonlinear_proximity = true

enable_axhaptics_support = true
enable_bhaptics_support = true

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
