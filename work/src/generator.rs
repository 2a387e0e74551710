//! Work generation.

use crate::validator::validate_work;
use chr_types::Root;
use rand::Rng;

/// Scan nonces from a random starting point until one meets `threshold`.
///
/// Suitable for tests and the local work pool; callers wanting cancellation
/// run this on a dedicated thread.
pub fn generate_work(root: &Root, threshold: u64) -> u64 {
    let mut nonce: u64 = rand::thread_rng().gen();
    while !validate_work(root, nonce, threshold) {
        nonce = nonce.wrapping_add(1);
    }
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use chr_types::BlockHash;

    #[test]
    fn generates_valid_work_for_test_threshold() {
        let root = BlockHash::new([0xAB; 32]);
        let threshold = 0xFF00_0000_0000_0000;
        let work = generate_work(&root, threshold);
        assert!(validate_work(&root, work, threshold));
    }
}
