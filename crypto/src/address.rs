//! Account string codec.
//!
//! An account renders as `chr_` followed by 60 base32 digits: 52 encoding
//! the 256-bit public key (the top 4 bits of the 260-bit group are padding)
//! and 8 encoding a Blake2b-40 checksum over the key bytes. `chr-` is
//! accepted on decode, as are the legacy 65-character `nano_`/`nano-`
//! renderings. Alphabet avoids the visually ambiguous 0/2/l/o/v.

use crate::hash::account_checksum;
use crate::CryptoError;
use chr_types::PublicKey;

const ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";

/// Reverse lookup: ASCII byte → 5-bit value (0xFF = invalid).
const DECODE: [u8; 128] = {
    let mut table = [0xFFu8; 128];
    let mut i = 0;
    while i < 32 {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Number of base32 digits after the prefix: 52 key + 8 checksum.
const DIGITS: usize = 60;

/// Render a public key as a `chr_` account string (64 characters).
///
/// The encoded payload is the 300-bit group `pad(4) ‖ key(256) ‖ check(40)`
/// emitted as 60 digits, most-significant first. The checksum word is the
/// little-endian interpretation of the 5 Blake2b bytes, so its big-endian
/// byte order on the wire is reversed.
pub fn encode_account(key: &PublicKey) -> String {
    let check = account_checksum(key.as_bytes());
    let check_be = [check[4], check[3], check[2], check[1], check[0]];

    let mut result = String::with_capacity(64);
    result.push_str("chr_");
    let mut acc: u32 = 0;
    let mut bits: u32 = 4; // four zero padding bits ahead of the key
    for &byte in key.as_bytes().iter().chain(check_be.iter()) {
        acc = (acc << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            result.push(ALPHABET[((acc >> bits) & 0x1F) as usize] as char);
        }
    }
    debug_assert_eq!(bits, 0);
    result
}

/// Decode an account string back to its public key.
///
/// Fails on wrong prefix, wrong length, invalid symbol, non-zero padding,
/// or checksum mismatch.
pub fn decode_account(source: &str) -> Result<PublicKey, CryptoError> {
    let digits = match source.as_bytes() {
        [b'c', b'h', b'r', b'_' | b'-', rest @ ..] if rest.len() == DIGITS => rest,
        [b'n', b'a', b'n', b'o', b'_' | b'-', rest @ ..] if rest.len() == DIGITS => rest,
        _ => return Err(CryptoError::InvalidAccountString),
    };
    // The first digit carries the 4 padding bits plus the key's top bit.
    if digits[0] != b'1' && digits[0] != b'3' {
        return Err(CryptoError::InvalidAccountString);
    }

    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut bytes = [0u8; 37];
    let mut pos = 0;
    for (i, &c) in digits.iter().enumerate() {
        if c >= 128 {
            return Err(CryptoError::InvalidAccountString);
        }
        let value = DECODE[c as usize];
        if value == 0xFF {
            return Err(CryptoError::InvalidAccountString);
        }
        acc = (acc << 5) | value as u32;
        bits += 5;
        if i == 0 {
            // Discard the four padding bits.
            bits -= 4;
            acc &= 1;
        }
        while bits >= 8 {
            bits -= 8;
            bytes[pos] = (acc >> bits) as u8;
            pos += 1;
            acc &= (1 << bits) - 1;
        }
    }
    debug_assert_eq!(pos, 37);

    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes[..32]);
    let check_be = &bytes[32..37];
    let expected = account_checksum(&key);
    let expected_be = [expected[4], expected[3], expected[2], expected[1], expected[0]];
    if check_be != expected_be {
        return Err(CryptoError::BadChecksum);
    }
    Ok(PublicKey(key))
}
