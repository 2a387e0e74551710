//! Property suite for work generation and validation.

use chr_types::BlockHash;
use chr_work::{generate_work, validate_work, work_difficulty};
use proptest::prelude::*;

/// Test-network threshold: cheap enough to generate in a property loop.
const EASY: u64 = 0xFF00_0000_0000_0000;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn generated_work_always_validates(bytes in prop::array::uniform32(any::<u8>())) {
        let root = BlockHash::new(bytes);
        let work = generate_work(&root, EASY);
        prop_assert!(validate_work(&root, work, EASY));
    }

    #[test]
    fn difficulty_is_the_exact_boundary(bytes in prop::array::uniform32(any::<u8>()), work in any::<u64>()) {
        let root = BlockHash::new(bytes);
        let achieved = work_difficulty(&root, work);
        prop_assert!(validate_work(&root, work, achieved));
        if achieved < u64::MAX {
            prop_assert!(!validate_work(&root, work, achieved + 1));
        }
    }
}
