//! Blake2b hashing.

use blake2::digest::consts::U32;
use blake2::digest::{Update, VariableOutput};
use blake2::{Blake2b, Blake2bVar, Digest};

type Blake2b256 = Blake2b<U32>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    Digest::update(&mut hasher, data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        Digest::update(&mut hasher, part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// The 5-byte account checksum: Blake2b with 40-bit output over the raw key.
pub fn account_checksum(key: &[u8; 32]) -> [u8; 5] {
    let mut hasher = Blake2bVar::new(5).expect("5 is a valid Blake2b output length");
    hasher.update(key);
    let mut output = [0u8; 5];
    hasher
        .finalize_variable(&mut output)
        .expect("output length matches");
    output
}

/// The 8-byte work digest over `work ‖ root`, interpreted little-endian.
pub fn work_value(root: &[u8; 32], work: u64) -> u64 {
    let mut hasher = Blake2bVar::new(8).expect("8 is a valid Blake2b output length");
    hasher.update(&work.to_le_bytes());
    hasher.update(root);
    let mut output = [0u8; 8];
    hasher
        .finalize_variable(&mut output)
        .expect("output length matches");
    u64::from_le_bytes(output)
}
