//! UPC barcodes.
//!
//! A barcode is a valid UPC iff it parses as an integer whose decimal
//! representation is exactly 12 characters long. Surrounding whitespace and a
//! leading `+` are tolerated by the integer cast; leading zeros are not
//! preserved by it, so `012345678901` is rejected (its integer has 11 digits).
//! Negative values are rejected even though a bare integer cast of
//! `-12345678901` has 12 characters: this is a stricter reading that treats a
//! UPC as 12 unsigned digits.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// Number of decimal digits in a valid UPC.
pub const UPC_LEN: usize = 12;

/// A validated 12-digit UPC.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Upc(u64);

impl Upc {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let value: i128 = raw
            .trim()
            .parse()
            .map_err(|_| DomainError::InvalidUpc(raw.to_string()))?;

        if value < 0 || value.to_string().len() != UPC_LEN {
            return Err(DomainError::InvalidUpc(raw.to_string()));
        }

        Ok(Self(value as u64))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Returns true iff `raw` is a valid UPC.
pub fn is_valid_upc(raw: &str) -> bool {
    Upc::parse(raw).is_ok()
}

impl ValueObject for Upc {}

impl core::fmt::Display for Upc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Upc {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Upc {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Upc> for String {
    fn from(value: Upc) -> Self {
        value.to_string()
    }
}
