//! Property suites for the value codecs.

use chr_types::{Amount, BlockHash};
use proptest::prelude::*;

proptest! {
    #[test]
    fn amount_decimal_roundtrip(value in any::<u128>()) {
        let amount = Amount::raw(value);
        prop_assert_eq!(Amount::decode_dec(&amount.to_string()).unwrap(), amount);
    }

    #[test]
    fn amount_be_bytes_roundtrip(value in any::<u128>()) {
        let amount = Amount::raw(value);
        prop_assert_eq!(Amount::from_be_bytes(amount.to_be_bytes()), amount);
    }

    #[test]
    fn hash_hex_roundtrip(bytes in prop::array::uniform32(any::<u8>())) {
        let hash = BlockHash::new(bytes);
        let text = hash.to_string();
        prop_assert_eq!(text.len(), 64);
        prop_assert_eq!(BlockHash::decode_hex(&text).unwrap(), hash);
    }

    #[test]
    fn hash_hex_rejects_bad_lengths(text in "[0-9A-F]{0,63}") {
        prop_assert!(BlockHash::decode_hex(&text).is_err());
    }

    #[test]
    fn saturating_arithmetic_never_panics(a in any::<u128>(), b in any::<u128>()) {
        let left = Amount::raw(a);
        let right = Amount::raw(b);
        let _ = left.saturating_add(right);
        let _ = left.saturating_sub(right);
    }
}
