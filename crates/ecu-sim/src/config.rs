//! Simulator configuration
//!
//! Everything has a default, so an empty file (or no file at all) gives the
//! plain live-data ECU. Trouble codes and the VIN are only answered when
//! configured.

use std::path::Path;
use std::time::Duration;

use obd_can::{AddressingMode, ConfigError, DtcCode, Vin};
use serde::{Deserialize, Serialize};

/// Complete simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcuConfig {
    /// 11-bit or 29-bit identifiers
    #[serde(default)]
    pub addressing: AddressingMode,

    /// CAN interface
    #[serde(default = "default_interface")]
    pub interface: String,

    /// PIDs advertised in the supported-PID bitmaps
    #[serde(default = "default_supported_pids")]
    pub supported_pids: Vec<u8>,

    /// Seed for reproducible values; random when absent
    #[serde(default)]
    pub seed: Option<u64>,

    /// VIN returned for service 0x09 PID 0x02
    #[serde(default)]
    pub vin: Option<Vin>,

    /// Trouble codes returned for service 0x03
    #[serde(default)]
    pub dtcs: Option<Vec<DtcCode>>,

    /// How long a multi-frame answer waits for the tester's flow control
    #[serde(default = "default_flow_control_timeout_ms")]
    pub flow_control_timeout_ms: u64,
}

fn default_interface() -> String {
    "vcan0".to_string()
}

fn default_supported_pids() -> Vec<u8> {
    vec![
        1, 3, 4, 5, 6, 11, 12, 13, 14, 15, 16, 17, 19, 21, 31, 33, 46, 47, 48, 49, 51, 52, 66,
        67, 68, 69, 71, 73, 76,
    ]
}

fn default_flow_control_timeout_ms() -> u64 {
    1000
}

impl Default for EcuConfig {
    fn default() -> Self {
        Self {
            addressing: AddressingMode::default(),
            interface: default_interface(),
            supported_pids: default_supported_pids(),
            seed: None,
            vin: None,
            dtcs: None,
            flow_control_timeout_ms: default_flow_control_timeout_ms(),
        }
    }
}

impl EcuConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        if config.flow_control_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "flow_control_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn flow_control_timeout(&self) -> Duration {
        Duration::from_millis(self.flow_control_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EcuConfig::from_toml("").unwrap();
        assert_eq!(config.addressing, AddressingMode::Standard);
        assert_eq!(config.interface, "vcan0");
        assert_eq!(config.supported_pids.len(), 29);
        assert!(config.vin.is_none());
        assert!(config.dtcs.is_none());
        assert_eq!(config.flow_control_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
addressing = "extended"
interface = "vcan1"
supported_pids = [0x0C, 0x0D]
seed = 7
vin = "WVWZZZ1KZAW000001"
dtcs = ["P0143", "U0100"]
"#
        )
        .unwrap();

        let config = EcuConfig::load(file.path()).unwrap();
        assert_eq!(config.addressing, AddressingMode::Extended);
        assert_eq!(config.interface, "vcan1");
        assert_eq!(config.supported_pids, vec![0x0C, 0x0D]);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.vin.unwrap().to_string(), "WVWZZZ1KZAW000001");
        assert_eq!(
            config.dtcs.unwrap(),
            vec![DtcCode::from_bytes(0x01, 0x43), DtcCode::from_bytes(0xC1, 0x00)]
        );
    }

    #[test]
    fn test_rejects_bad_vin_and_dtc() {
        assert!(matches!(
            EcuConfig::from_toml(r#"vin = "TOO-SHORT""#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EcuConfig::from_toml(r#"dtcs = ["Q1234"]"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EcuConfig::from_toml("flow_control_timeout_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }
}
