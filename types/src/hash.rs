//! 256-bit hash types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// A 32-byte Blake2b block hash.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

/// The root of a block: the previous hash for chain blocks, the account
/// public key for account-open blocks. Byte-compatible with [`BlockHash`].
pub type Root = BlockHash;

/// The link field of a state block: a pending source hash on receive, a
/// destination account on send. Interpretation depends on balance direction.
pub type Link = BlockHash;

impl BlockHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse a 64-character hex string. Fails on wrong length or non-hex input.
    pub fn decode_hex(text: &str) -> Result<Self, TypesError> {
        if text.len() != 64 || !text.is_ascii() {
            return Err(TypesError::InvalidHex);
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in text.as_bytes().chunks(2).enumerate() {
            let hi = hex_value(chunk[0]).ok_or(TypesError::InvalidHex)?;
            let lo = hex_value(chunk[1]).ok_or(TypesError::InvalidHex)?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash(")?;
        for b in &self.0[..4] {
            write!(f, "{:02X}", b)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl From<crate::PublicKey> for BlockHash {
    fn from(key: crate::PublicKey) -> Self {
        Self(key.0)
    }
}
