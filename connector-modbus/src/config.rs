//! Configuration for the Modbus connector.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use connector_common::{Format, KEY_PREFIX, LoggingConfig, ZenohConfig};

use crate::endianness::Endianness;
use crate::master::{Endpoint, Framing};
use crate::register::{MAX_READ_WORDS, Register};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete connector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConnectorConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Wire format of published measurements
    #[serde(default)]
    pub serialization: Format,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Modbus-specific settings
    pub modbus: ModbusConfig,
}

/// Modbus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Key expression prefix (default: "timeseries/modbus")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Devices to poll
    pub devices: Vec<DeviceConfig>,
}

fn default_key_prefix() -> String {
    format!("{}/modbus", KEY_PREFIX)
}

/// A device and the registers read from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name (used as measurement source and in key expressions)
    pub name: String,

    /// How to reach the device
    pub connector: ConnectorConfig,

    /// Registers to read each poll, in emission order
    pub registers: Vec<Register>,
}

/// Connection settings of one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// IP address or hostname of the device (or gateway)
    pub ip: String,

    /// TCP port (default: 502)
    #[serde(default = "default_modbus_port")]
    pub port: u16,

    /// Byte and word layout used by the device
    #[serde(default)]
    pub endianness: Endianness,

    /// Framing on top of the TCP stream (default: tcp)
    #[serde(default)]
    pub protocol: Protocol,

    /// Use ASCII framing; takes precedence over `protocol`
    #[serde(default, alias = "useASCII")]
    pub use_ascii: bool,

    /// Connect and per-read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_poll_interval() -> u64 {
    10
}

impl ConnectorConfig {
    /// Endpoint derived from address and framing settings.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.ip.clone(),
            port: self.port,
            framing: Framing::select(self.protocol, self.use_ascii),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Modbus framing protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Native Modbus TCP
    #[default]
    Tcp,
    /// RTU frames over the TCP stream (serial gateways)
    Rtu,
}

impl ModbusConnectorConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ModbusConnectorConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modbus.devices.is_empty() {
            return Err(ConfigError::Validation(
                "At least one device must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for device in &self.modbus.devices {
            if device.name.is_empty() {
                return Err(ConfigError::Validation(
                    "Device name cannot be empty".to_string(),
                ));
            }

            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate device name '{}'",
                    device.name
                )));
            }

            device.validate()?;
        }

        Ok(())
    }
}

impl DeviceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| ConfigError::Validation(format!("Device '{}': {}", self.name, msg));

        if self.connector.ip.trim().is_empty() {
            return Err(invalid("ip cannot be empty".to_string()));
        }

        if self.connector.port == 0 {
            return Err(invalid("port must be 1-65535".to_string()));
        }

        if self.connector.timeout_ms == 0 {
            return Err(invalid("timeout_ms must be greater than 0".to_string()));
        }

        if self.registers.is_empty() {
            return Err(invalid("at least one register must be configured".to_string()));
        }

        for register in &self.registers {
            if register.size == 0 {
                return Err(invalid(format!(
                    "register {}:{} has size 0",
                    register.unit, register.starting_address
                )));
            }

            if register.word_count() > MAX_READ_WORDS {
                return Err(invalid(format!(
                    "register {}:{} needs {} words, more than the {} allowed per read",
                    register.unit,
                    register.starting_address,
                    register.word_count(),
                    MAX_READ_WORDS
                )));
            }

            if register.last_address() > u16::MAX as u32 {
                return Err(invalid(format!(
                    "register {}:{} runs past address {}",
                    register.unit,
                    register.starting_address,
                    u16::MAX
                )));
            }
        }

        Ok(())
    }
}
