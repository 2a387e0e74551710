//! 128-bit balance and amount arithmetic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

use crate::TypesError;

/// A 128-bit raw-unit amount. Big-endian on the wire.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u128::MAX);

    pub const fn raw(value: u128) -> Self {
        Self(value)
    }

    pub fn number(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn to_be_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Parse a decimal string. Fails on empty input, a leading zero on a
    /// multi-digit number, a sign, non-digit characters, over-long input,
    /// or overflow.
    pub fn decode_dec(text: &str) -> Result<Self, TypesError> {
        if text.is_empty() || text.len() > 39 {
            return Err(TypesError::InvalidDecimal);
        }
        if text.len() > 1 && text.starts_with('0') {
            return Err(TypesError::InvalidDecimal);
        }
        if text.starts_with('-') || text.starts_with('+') {
            return Err(TypesError::InvalidDecimal);
        }
        text.parse::<u128>()
            .map(Self)
            .map_err(|_| TypesError::InvalidDecimal)
    }

    /// Parse a hex string of at most 32 digits. Fails on empty or non-hex input.
    pub fn decode_hex(text: &str) -> Result<Self, TypesError> {
        if text.is_empty() || text.len() > 32 {
            return Err(TypesError::InvalidHex);
        }
        u128::from_str_radix(text, 16)
            .map(Self)
            .map_err(|_| TypesError::InvalidHex)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
