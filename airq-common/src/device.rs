//! RS-485 slave addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reasons a raw device identifier is not a usable RS-485 slave id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("'{0}' is not numeric")]
    NotNumeric(String),

    #[error("{0} is outside the slave id range 1-255")]
    OutOfRange(String),
}

/// An RS-485 slave id in the range 1-255.
///
/// The only way to obtain one is through validation, so every address that
/// reaches the transport is already known to be in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u8")]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 255;

    /// Create an address, returning `None` for the reserved id 0.
    pub const fn new(id: u8) -> Option<Self> {
        if id >= Self::MIN { Some(Self(id)) } else { None }
    }

    /// The raw slave id.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u64> for DeviceAddress {
    type Error = AddressError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(DeviceAddress::new)
            .ok_or_else(|| AddressError::OutOfRange(value.to_string()))
    }
}

impl TryFrom<i64> for DeviceAddress {
    type Error = AddressError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u64::try_from(value)
            .map_err(|_| AddressError::OutOfRange(value.to_string()))
            .and_then(DeviceAddress::try_from)
    }
}

impl FromStr for DeviceAddress {
    type Err = AddressError;

    /// Accepts only a non-empty run of ASCII digits; signs, whitespace and
    /// decimal points are rejected as non-numeric.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AddressError::OutOfRange(String::new()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddressError::NotNumeric(s.to_string()));
        }

        // All digits, so the only parse failure left is overflow.
        match s.parse::<u64>() {
            Ok(value) => DeviceAddress::try_from(value),
            Err(_) => Err(AddressError::OutOfRange(s.to_string())),
        }
    }
}

impl From<DeviceAddress> for u8 {
    fn from(address: DeviceAddress) -> Self {
        address.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
