//! PID registry and physical-value decoding

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ObdError;
use crate::config::PidDef;

/// How the data bytes of a PID response become a physical value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeRule {
    /// Bytes returned unchanged (bit-encoded PIDs)
    Raw,
    /// `raw * multiplier / divisor + offset`, where `raw` is the first byte
    /// (`width = 1`) or the first two bytes big-endian (`width = 2`)
    Linear {
        width: u8,
        multiplier: f64,
        divisor: f64,
        offset: f64,
    },
    /// Oxygen sensor: `A / 200` volts and `B * 100 / 128 - 100` % trim;
    /// `B = 0xFF` means the sensor is not used for trim
    VoltageTrim,
}

impl DecodeRule {
    pub const fn byte(multiplier: f64, divisor: f64, offset: f64) -> Self {
        Self::Linear {
            width: 1,
            multiplier,
            divisor,
            offset,
        }
    }

    pub const fn word(multiplier: f64, divisor: f64, offset: f64) -> Self {
        Self::Linear {
            width: 2,
            multiplier,
            divisor,
            offset,
        }
    }

    /// Minimum number of data bytes the rule reads
    pub fn min_len(&self) -> usize {
        match self {
            Self::Raw => 0,
            Self::Linear { width, .. } => usize::from(*width),
            Self::VoltageTrim => 2,
        }
    }

    /// Decode `data` (the bytes after service id and PID echo).
    /// Returns `None` if `data` is too short.
    pub fn decode(&self, data: &[u8]) -> Option<PidValue> {
        if data.len() < self.min_len() {
            return None;
        }
        let value = match *self {
            Self::Raw => PidValue::Bytes(data.to_vec()),
            Self::Linear {
                width,
                multiplier,
                divisor,
                offset,
            } => {
                let raw = if width >= 2 {
                    (u32::from(data[0]) << 8) + u32::from(data[1])
                } else {
                    u32::from(data[0])
                };
                PidValue::Number(f64::from(raw) * multiplier / divisor + offset)
            }
            Self::VoltageTrim => PidValue::VoltageTrim {
                voltage: f64::from(data[0]) / 200.0,
                trim: (data[1] != 0xFF).then(|| f64::from(data[1]) * 100.0 / 128.0 - 100.0),
            },
        };
        Some(value)
    }
}

/// A decoded PID value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PidValue {
    Number(f64),
    Bytes(Vec<u8>),
    VoltageTrim { voltage: f64, trim: Option<f64> },
}

impl PidValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }
}

fn fmt_number(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.fract() == 0.0 {
        write!(f, "{:.0}", v)
    } else {
        write!(f, "{:.2}", v)
    }
}

impl fmt::Display for PidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => fmt_number(f, *v),
            Self::Bytes(bytes) => write!(f, "{}", hex::encode_upper(bytes)),
            Self::VoltageTrim { voltage, trim } => {
                write!(f, "{:.3} V", voltage)?;
                match trim {
                    Some(trim) => {
                        write!(f, ", ")?;
                        fmt_number(f, *trim)?;
                        write!(f, " %")
                    }
                    None => write!(f, ", trim n/a"),
                }
            }
        }
    }
}

/// One registry entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PidEntry {
    pub name: String,
    pub code: u8,
    pub rule: DecodeRule,
    pub unit: String,
}

impl PidEntry {
    pub fn new(name: impl Into<String>, code: u8, rule: DecodeRule, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code,
            rule,
            unit: unit.into(),
        }
    }

    pub fn decode(&self, data: &[u8]) -> Result<PidValue, ObdError> {
        self.rule.decode(data).ok_or_else(|| ObdError::Decode {
            pid: self.name.clone(),
            reason: format!("need {} data byte(s), got {}", self.rule.min_len(), data.len()),
        })
    }
}

impl From<&PidDef> for PidEntry {
    fn from(def: &PidDef) -> Self {
        Self::new(def.name.to_ascii_lowercase(), def.code, def.rule, def.unit.clone())
    }
}

const BIT_ENCODED: &str = "Bit encoded";

/// SAE J1979 service 0x01 PIDs known out of the box
const STANDARD_PIDS: &[(&str, u8, DecodeRule, &str)] = &[
    ("monitor_status", 0x01, DecodeRule::Raw, BIT_ENCODED),
    ("fuel_status", 0x03, DecodeRule::Raw, BIT_ENCODED),
    ("engine_load", 0x04, DecodeRule::byte(100.0, 255.0, 0.0), "%"),
    ("coolant_temp", 0x05, DecodeRule::byte(1.0, 1.0, -40.0), "°C"),
    ("stft_bank1", 0x06, DecodeRule::byte(100.0, 128.0, -100.0), "%"),
    ("ltft_bank1", 0x07, DecodeRule::byte(100.0, 128.0, -100.0), "%"),
    ("intake_press", 0x0B, DecodeRule::byte(1.0, 1.0, 0.0), "kPa"),
    ("rpm", 0x0C, DecodeRule::word(1.0, 4.0, 0.0), "rpm"),
    ("speed", 0x0D, DecodeRule::byte(1.0, 1.0, 0.0), "km/h"),
    ("timing_adv", 0x0E, DecodeRule::byte(1.0, 2.0, -64.0), "° before TDC"),
    ("intake_temp", 0x0F, DecodeRule::byte(1.0, 1.0, -40.0), "°C"),
    ("maf", 0x10, DecodeRule::word(1.0, 100.0, 0.0), "g/s"),
    ("throttle_pos", 0x11, DecodeRule::byte(100.0, 255.0, 0.0), "%"),
    ("o2_sensors", 0x13, DecodeRule::Raw, BIT_ENCODED),
    ("o2_s1_bank1", 0x14, DecodeRule::VoltageTrim, "V, %"),
    ("o2_s2_bank1", 0x15, DecodeRule::VoltageTrim, "V, %"),
    ("run_time", 0x1F, DecodeRule::word(1.0, 1.0, 0.0), "s"),
    ("mil_dist", 0x21, DecodeRule::word(1.0, 1.0, 0.0), "km"),
    ("evap_purge", 0x2E, DecodeRule::byte(100.0, 255.0, 0.0), "%"),
    ("fuel_level", 0x2F, DecodeRule::byte(100.0, 255.0, 0.0), "%"),
    ("warm_ups", 0x30, DecodeRule::byte(1.0, 1.0, 0.0), "count"),
    ("clr_dist", 0x31, DecodeRule::word(1.0, 1.0, 0.0), "km"),
    ("baro_press", 0x33, DecodeRule::byte(1.0, 1.0, 0.0), "kPa"),
    ("o2_s1_ratio", 0x34, DecodeRule::word(2.0, 65536.0, 0.0), "ratio"),
    ("volt_module", 0x42, DecodeRule::word(1.0, 1000.0, 0.0), "V"),
    ("abs_load", 0x43, DecodeRule::word(100.0, 255.0, 0.0), "%"),
    ("cmd_air_fuel", 0x44, DecodeRule::word(2.0, 65536.0, 0.0), "ratio"),
    ("rel_throttle", 0x45, DecodeRule::byte(100.0, 255.0, 0.0), "%"),
    ("throttle_b", 0x47, DecodeRule::byte(100.0, 255.0, 0.0), "%"),
    ("accel_d", 0x49, DecodeRule::byte(100.0, 255.0, 0.0), "%"),
    ("cmd_throttle", 0x4C, DecodeRule::byte(100.0, 255.0, 0.0), "%"),
    ("time_run_mil", 0x41, DecodeRule::word(1.0, 1.0, 0.0), "min"),
    ("time_since_dtc", 0x4D, DecodeRule::word(1.0, 1.0, 0.0), "min"),
];

/// Named PID lookup table, keyed by lowercase name
#[derive(Debug, Clone, Default)]
pub struct PidRegistry {
    entries: BTreeMap<String, PidEntry>,
}

impl PidRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry seeded with the standard PID table
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for &(name, code, rule, unit) in STANDARD_PIDS {
            registry.insert(PidEntry::new(name, code, rule, unit));
        }
        registry
    }

    /// Standard table with `defs` merged over it (same name replaces)
    pub fn with_defs(defs: &[PidDef]) -> Self {
        let mut registry = Self::standard();
        for def in defs {
            if let Some(old) = registry.insert(PidEntry::from(def)) {
                tracing::debug!(pid = %old.name, "Configured PID replaces built-in entry");
            }
        }
        registry
    }

    /// Add or replace an entry, returning the replaced one
    pub fn insert(&mut self, entry: PidEntry) -> Option<PidEntry> {
        self.entries.insert(entry.name.to_ascii_lowercase(), entry)
    }

    /// Case-insensitive lookup by name
    pub fn get(&self, name: &str) -> Option<&PidEntry> {
        self.entries.get(&name.to_ascii_lowercase())
    }

    pub fn by_code(&self, code: u8) -> Option<&PidEntry> {
        self.entries.values().find(|e| e.code == code)
    }

    /// Entries ordered by PID code
    pub fn entries(&self) -> Vec<&PidEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by_key(|e| (e.code, e.name.clone()));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn number(name: &str, data: &[u8]) -> f64 {
        let registry = PidRegistry::standard();
        registry.get(name).unwrap().decode(data).unwrap().as_f64().unwrap()
    }

    #[rstest]
    #[case("rpm", &[0x1A, 0x0A], 1666.5)]
    #[case("coolant_temp", &[0x5A], 50.0)]
    #[case("speed", &[0x37], 55.0)]
    #[case("engine_load", &[0xFF], 100.0)]
    #[case("stft_bank1", &[0x80], 0.0)]
    #[case("timing_adv", &[0x80], 0.0)]
    #[case("maf", &[0x01, 0xF4], 5.0)]
    #[case("volt_module", &[0x33, 0x90], 13.2)]
    #[case("run_time", &[0x01, 0x00], 256.0)]
    #[case("o2_s1_ratio", &[0x80, 0x00], 1.0)]
    #[case("abs_load", &[0x00, 0xFF], 100.0)]
    fn test_standard_decoding(#[case] name: &str, #[case] data: &[u8], #[case] expected: f64) {
        let value = number(name, data);
        assert!((value - expected).abs() < 1e-9, "{}: {} != {}", name, value, expected);
    }

    #[test]
    fn test_extra_bytes_are_ignored() {
        assert_eq!(number("coolant_temp", &[0x5A, 0x11, 0x22]), 50.0);
    }

    #[test]
    fn test_raw_rule_returns_bytes() {
        let registry = PidRegistry::standard();
        let value = registry.get("monitor_status").unwrap().decode(&[0x00, 0x07, 0xE5, 0x00]).unwrap();
        assert_eq!(value, PidValue::Bytes(vec![0x00, 0x07, 0xE5, 0x00]));
        assert_eq!(value.to_string(), "0007E500");
    }

    #[test]
    fn test_voltage_trim() {
        let registry = PidRegistry::standard();
        let entry = registry.get("o2_s1_bank1").unwrap();

        assert_eq!(
            entry.decode(&[0x5A, 0x80]).unwrap(),
            PidValue::VoltageTrim { voltage: 0.45, trim: Some(0.0) }
        );
        assert_eq!(
            entry.decode(&[0x5A, 0xFF]).unwrap(),
            PidValue::VoltageTrim { voltage: 0.45, trim: None }
        );
    }

    #[test]
    fn test_short_data_is_a_decode_error() {
        let registry = PidRegistry::standard();
        let err = registry.get("rpm").unwrap().decode(&[0x1A]).unwrap_err();
        assert!(matches!(err, ObdError::Decode { ref pid, .. } if pid == "rpm"));
        assert!(registry.get("o2_s2_bank1").unwrap().decode(&[0x10]).is_err());
    }

    #[test]
    fn test_standard_table_contents() {
        let registry = PidRegistry::standard();
        assert_eq!(registry.len(), 33);
        assert_eq!(registry.get("RPM").unwrap().code, 0x0C);
        assert_eq!(registry.by_code(0x4D).unwrap().name, "time_since_dtc");
        assert_eq!(registry.get("timing_adv").unwrap().unit, "° before TDC");
        assert!(registry.get("oil_temp").is_none());

        let codes: Vec<u8> = registry.entries().iter().map(|e| e.code).collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        assert_eq!(codes, sorted);
    }

    #[test]
    fn test_configured_pids_merge_over_standard() {
        let defs = vec![
            PidDef {
                name: "Oil_Temp".to_string(),
                code: 0x5C,
                rule: DecodeRule::byte(1.0, 1.0, -40.0),
                unit: "°C".to_string(),
            },
            PidDef {
                name: "speed".to_string(),
                code: 0x0D,
                rule: DecodeRule::byte(1.0, 1.609344, 0.0),
                unit: "mph".to_string(),
            },
        ];
        let registry = PidRegistry::with_defs(&defs);

        assert_eq!(registry.len(), 34);
        assert_eq!(registry.get("oil_temp").unwrap().decode(&[0x82]).unwrap(), PidValue::Number(90.0));
        assert_eq!(registry.get("speed").unwrap().unit, "mph");
    }

    #[test]
    fn test_display() {
        assert_eq!(PidValue::Number(1666.5).to_string(), "1666.50");
        assert_eq!(PidValue::Number(50.0).to_string(), "50");
        assert_eq!(
            PidValue::VoltageTrim { voltage: 0.45, trim: None }.to_string(),
            "0.450 V, trim n/a"
        );
    }
}
