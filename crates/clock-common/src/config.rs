//! Configuration structures for the clock driver.
//!
//! Supports TOML deserialization with defaults matching the reference
//! FPGA board (port `0x233`, IRQ 11).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default I/O port of the clock peripheral.
pub const DEFAULT_PORT_BASE: u16 = 0x233;

/// Default interrupt line of the periodic sync signal.
pub const DEFAULT_IRQ: u32 = 11;

/// Largest timezone offset accepted, in minutes.
pub const MAX_MINUTES_WEST: i32 = 24 * 60;

/// Top-level driver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Device identity and hardware resources.
    pub device: DeviceConfig,

    /// Port backend selection.
    pub port: PortConfig,

    /// Synchronization policy.
    pub sync: SyncConfig,
}

/// Device identity and hardware resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Driver name registered with the device model.
    pub name: String,

    /// Name of the read-only query attribute.
    pub attribute: String,

    /// Address of the single 8-bit I/O port.
    pub port_base: u16,

    /// Interrupt line delivering the periodic sync signal.
    pub irq: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: String::from("fpga_clock"),
            attribute: String::from("fpga_clock"),
            port_base: DEFAULT_PORT_BASE,
            irq: DEFAULT_IRQ,
        }
    }
}

/// Port backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Which port implementation drives the peripheral.
    pub backend: PortBackend,
}

/// Supported port backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PortBackend {
    /// In-memory model of the peripheral.
    #[default]
    Simulated,
    /// Real x86 port I/O (requires `CAP_SYS_RAWIO`).
    Raw,
}

/// Synchronization policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Period of the sync signal when the daemon generates it.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Where the local timezone offset comes from.
    pub timezone: TimezoneSource,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timezone: TimezoneSource::Host,
        }
    }
}

/// Timezone offset source for converting host time to civil time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimezoneSource {
    /// Use the host's configured local timezone.
    #[default]
    Host,
    /// No offset.
    Utc,
    /// Fixed offset in minutes west of Greenwich.
    MinutesWest(i32),
}

impl ClockConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(?path, device = %config.device.name, "Configuration parsed");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check values serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.name.is_empty() {
            return Err(ConfigError::Invalid("device.name must not be empty".into()));
        }
        if self.device.attribute.is_empty() {
            return Err(ConfigError::Invalid(
                "device.attribute must not be empty".into(),
            ));
        }
        if self.sync.interval.is_zero() {
            return Err(ConfigError::Invalid("sync.interval must be non-zero".into()));
        }
        if let TimezoneSource::MinutesWest(minutes) = self.sync.timezone {
            if minutes.unsigned_abs() > MAX_MINUTES_WEST.unsigned_abs() {
                return Err(ConfigError::Invalid(format!(
                    "sync.timezone.minutes_west {minutes} outside +-{MAX_MINUTES_WEST}"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Semantically invalid value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
