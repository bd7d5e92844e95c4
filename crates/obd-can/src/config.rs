//! OBD client configuration
//!
//! This module contains configuration types for the client: addressing,
//! transport timing, the CAN driver to open, and extra PID definitions.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::addressing::AddressingMode;
use crate::isotp::SequenceErrorPolicy;
use crate::obd::DecodeRule;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObdConfig {
    /// 11-bit or 29-bit identifiers
    #[serde(default)]
    pub addressing: AddressingMode,
    /// ISO-TP timing and retry options
    #[serde(default)]
    pub transport: TransportOptions,
    /// CAN driver to open
    #[serde(default)]
    pub driver: DriverConfig,
    /// Additional PID definitions, merged over the standard table
    #[serde(default)]
    pub pids: Vec<PidDef>,
}

impl ObdConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.timeout_ms == 0 {
            return Err(ConfigError::Invalid("transport.timeout_ms must be > 0".to_string()));
        }
        if self.transport.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "transport.poll_interval_ms must be > 0".to_string(),
            ));
        }
        for pid in &self.pids {
            if pid.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "PID 0x{:02X} has an empty name",
                    pid.code
                )));
            }
            if let DecodeRule::Linear { width, divisor, .. } = pid.rule {
                if !(1..=2).contains(&width) || divisor == 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "PID '{}': linear rule needs width 1 or 2 and a non-zero divisor",
                        pid.name
                    )));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// ISO-TP request/response options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportOptions {
    /// Response timeout, renewed on every accepted multi-frame segment
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after a failed transmit
    #[serde(default = "default_retries")]
    pub retries: u8,
    /// Delay between transmit attempts
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Sleep between empty receive polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Filler for unused request bytes
    #[serde(default = "default_padding")]
    pub padding: u8,
    /// What to do with an out-of-sequence consecutive frame
    #[serde(default)]
    pub sequence_errors: SequenceErrorPolicy,
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_retries() -> u8 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_poll_interval_ms() -> u64 {
    1
}

fn default_padding() -> u8 {
    0xCC
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            padding: default_padding(),
            sequence_errors: SequenceErrorPolicy::default(),
        }
    }
}

impl TransportOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// Driver Configuration
// =============================================================================

/// CAN driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DriverConfig {
    /// Raw SocketCAN (Linux only)
    SocketCan(SocketCanConfig),
    /// In-process virtual bus
    Virtual,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::SocketCan(SocketCanConfig::default())
    }
}

/// SocketCAN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketCanConfig {
    /// CAN interface name (e.g., "can0")
    #[serde(default = "default_interface")]
    pub interface: String,
}

fn default_interface() -> String {
    "can0".to_string()
}

impl Default for SocketCanConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
        }
    }
}

// =============================================================================
// PID Configuration
// =============================================================================

/// Extra registry entry
///
/// ```toml
/// [[pids]]
/// name = "oil_temp"
/// code = 0x5C
/// unit = "°C"
/// rule = { kind = "linear", width = 1, multiplier = 1.0, divisor = 1.0, offset = -40.0 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidDef {
    pub name: String,
    pub code: u8,
    pub rule: DecodeRule,
    #[serde(default)]
    pub unit: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ObdConfig::from_toml("").unwrap();
        assert_eq!(config.addressing, AddressingMode::Standard);
        assert_eq!(config.transport.timeout_ms, 1000);
        assert_eq!(config.transport.retries, 2);
        assert_eq!(config.transport.retry_backoff_ms, 50);
        assert_eq!(config.transport.padding, 0xCC);
        assert_eq!(config.transport.sequence_errors, SequenceErrorPolicy::Ignore);
        assert!(matches!(config.driver, DriverConfig::SocketCan(ref c) if c.interface == "can0"));
    }

    #[test]
    fn test_load_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
addressing = "extended"

[transport]
timeout_ms = 250
retries = 5
sequence_errors = "abort"

[driver]
type = "virtual"

[[pids]]
name = "oil_temp"
code = 0x5C
unit = "°C"
rule = {{ kind = "linear", width = 1, multiplier = 1.0, divisor = 1.0, offset = -40.0 }}
"#
        )
        .unwrap();

        let config = ObdConfig::load(file.path()).unwrap();
        assert_eq!(config.addressing, AddressingMode::Extended);
        assert_eq!(config.transport.timeout(), Duration::from_millis(250));
        assert_eq!(config.transport.retries, 5);
        assert_eq!(config.transport.poll_interval_ms, 1);
        assert_eq!(config.transport.sequence_errors, SequenceErrorPolicy::Abort);
        assert!(matches!(config.driver, DriverConfig::Virtual));
        assert_eq!(config.pids.len(), 1);
        assert_eq!(config.pids[0].code, 0x5C);
    }

    #[test]
    fn test_rejects_zero_divisor() {
        let err = ObdConfig::from_toml(
            r#"
[[pids]]
name = "broken"
code = 0x5C
rule = { kind = "linear", width = 1, multiplier = 1.0, divisor = 0.0, offset = 0.0 }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            ObdConfig::from_toml("addressing = "),
            Err(ConfigError::Parse(_))
        ));
    }
}
