//! Diagnostic trouble codes and the vehicle identification number

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of a VIN in bytes
pub const VIN_LEN: usize = 17;

const CATEGORIES: [char; 4] = ['P', 'C', 'B', 'U'];

/// A two-byte trouble code as reported by service 0x03
///
/// The top two bits of the first byte select the system (powertrain,
/// chassis, body, network); the remaining 14 bits are shown as four digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DtcCode([u8; 2]);

impl DtcCode {
    pub fn from_bytes(a: u8, b: u8) -> Self {
        Self([a, b])
    }

    pub fn bytes(&self) -> [u8; 2] {
        self.0
    }

    /// System letter: P, C, B or U
    pub fn category(&self) -> char {
        CATEGORIES[usize::from(self.0[0] >> 6)]
    }

    /// Decode consecutive byte pairs. Returns `None` for an odd length.
    pub fn from_pairs(data: &[u8]) -> Option<Vec<Self>> {
        if data.len() % 2 != 0 {
            return None;
        }
        Some(data.chunks_exact(2).map(|p| Self::from_bytes(p[0], p[1])).collect())
    }
}

impl fmt::Display for DtcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b] = self.0;
        write!(
            f,
            "{}{:X}{:X}{:X}{:X}",
            self.category(),
            (a >> 4) & 0x3,
            a & 0xF,
            b >> 4,
            b & 0xF
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid trouble code '{0}'")]
pub struct DtcParseError(pub String);

impl FromStr for DtcCode {
    type Err = DtcParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DtcParseError(s.to_string());
        let chars: Vec<char> = s.trim().chars().collect();
        if chars.len() != 5 {
            return Err(invalid());
        }

        let category = CATEGORIES
            .iter()
            .position(|c| *c == chars[0].to_ascii_uppercase())
            .ok_or_else(invalid)? as u8;
        let mut digits = [0u8; 4];
        for (slot, c) in digits.iter_mut().zip(&chars[1..]) {
            *slot = c.to_digit(16).ok_or_else(invalid)? as u8;
        }
        if digits[0] > 3 {
            return Err(invalid());
        }

        Ok(Self([
            (category << 6) | (digits[0] << 4) | digits[1],
            (digits[2] << 4) | digits[3],
        ]))
    }
}

impl Serialize for DtcCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DtcCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Vehicle identification number, exactly 17 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vin([u8; VIN_LEN]);

impl Vin {
    pub fn as_bytes(&self) -> &[u8; VIN_LEN] {
        &self.0
    }

    /// The VIN as text, if every byte is printable ASCII
    pub fn as_str(&self) -> Option<&str> {
        if self.0.iter().all(|b| b.is_ascii_graphic()) {
            std::str::from_utf8(&self.0).ok()
        } else {
            None
        }
    }
}

impl TryFrom<&[u8]> for Vin {
    type Error = usize;

    /// Fails with the offending length
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; VIN_LEN]>::try_from(bytes).map(Self).map_err(|_| bytes.len())
    }
}

impl FromStr for Vin {
    type Err = usize;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.as_bytes())
    }
}

impl fmt::Display for Vin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => f.write_str(s),
            None => write!(f, "{}", String::from_utf8_lossy(&self.0)),
        }
    }
}

impl Serialize for Vin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Vin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|len| serde::de::Error::custom(format!("VIN must be {} bytes, got {}", VIN_LEN, len)))
    }
}
