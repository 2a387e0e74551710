//! Work validation.

use chr_types::Root;

/// The difficulty a nonce achieves for a root.
pub fn work_difficulty(root: &Root, work: u64) -> u64 {
    chr_crypto::hash::work_value(root.as_bytes(), work)
}

/// Whether `work` meets `threshold` for `root`.
pub fn validate_work(root: &Root, work: u64, threshold: u64) -> bool {
    work_difficulty(root, work) >= threshold
}
