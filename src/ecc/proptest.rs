//! Property-Based Tests for the Tag and Data Codes
//!
//! # Test Properties
//!
//! 1. **Roundtrip**: unpack(pack(tags)) = tags for in-range fields
//! 2. **Single-bit correction**: any flipped payload bit is repaired
//! 3. **No silent corruption**: out-of-range syndromes leave bytes untouched
//! 4. **Data ECC**: any single flipped data bit in a random block is repaired

#![cfg(test)]

use proptest::prelude::*;

use super::data::{Correction, DataEcc, HammingEcc, ECC_BLOCK_SIZE};
use super::tags::{calc_tags_ecc, check_tags_ecc, Tags, TagsEccOutcome, ECC_FIELD_BITS};

// =============================================================================
// Property Strategies
// =============================================================================

/// Strategy for tag records with every field inside its width.
fn tags_strategy() -> impl Strategy<Value = Tags> {
    (
        0u32..(1 << 20),
        0u8..4,
        0u16..(1 << 10),
        0u32..(1 << 18),
        0u8..4,
    )
        .prop_map(|(chunk_id, serial_number, byte_count_lsb, object_id, byte_count_msb)| {
            let mut tags = Tags {
                chunk_id,
                serial_number,
                byte_count_lsb,
                object_id,
                ecc: 0,
                byte_count_msb,
            };
            tags.calc_ecc();
            tags
        })
}

/// Strategy for bit positions outside the ecc field.
fn payload_bit_strategy() -> impl Strategy<Value = u32> {
    (0u32..64).prop_filter("payload bits only", |b| !ECC_FIELD_BITS.contains(b))
}

fn block_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), ECC_BLOCK_SIZE)
}

// =============================================================================
// Tag Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: packing then unpacking preserves every field.
    #[test]
    fn prop_tags_roundtrip(tags in tags_strategy()) {
        prop_assert_eq!(Tags::from_bytes(&tags.to_bytes()), tags);
    }

    /// Property: a freshly encoded record checks clean.
    #[test]
    fn prop_fresh_record_is_clean(tags in tags_strategy()) {
        let mut bytes = tags.to_bytes();
        prop_assert_eq!(check_tags_ecc(&mut bytes), TagsEccOutcome::Ok);
        prop_assert_eq!(bytes, tags.to_bytes());
    }

    /// Property: one flipped payload bit is corrected back to the original.
    #[test]
    fn prop_single_bit_corrected(tags in tags_strategy(), bit in payload_bit_strategy()) {
        let word = u64::from_le_bytes(tags.to_bytes()) ^ (1u64 << bit);
        let mut bytes = word.to_le_bytes();

        prop_assert_eq!(check_tags_ecc(&mut bytes), TagsEccOutcome::Corrected);
        prop_assert_eq!(Tags::from_bytes(&bytes), tags);
    }

    /// Property: whenever the check reports unrecoverable, the bytes are
    /// exactly what was read.
    #[test]
    fn prop_unrecoverable_leaves_bytes(
        tags in tags_strategy(),
        a in 0u32..64,
        b in 0u32..64,
    ) {
        let word = u64::from_le_bytes(tags.to_bytes()) ^ (1u64 << a) ^ (1u64 << b);
        let read = word.to_le_bytes();
        let mut bytes = read;

        if check_tags_ecc(&mut bytes) == TagsEccOutcome::Unrecoverable {
            prop_assert_eq!(bytes, read);
        }
    }

    /// Property: the code never depends on the ecc field.
    #[test]
    fn prop_calc_ignores_ecc_field(tags in tags_strategy(), ecc in 0u16..4096) {
        let mut other = tags;
        other.ecc = ecc;
        prop_assert_eq!(calc_tags_ecc(&tags.to_bytes()), calc_tags_ecc(&other.to_bytes()));
    }
}

// =============================================================================
// Data ECC Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: any single flipped data bit is repaired.
    #[test]
    fn prop_data_single_bit_fixed(
        block in block_strategy(),
        byte in 0usize..ECC_BLOCK_SIZE,
        bit in 0u8..8,
    ) {
        let ecc = HammingEcc;
        let mut original = [0u8; ECC_BLOCK_SIZE];
        original.copy_from_slice(&block);
        let code = ecc.calc(&original);

        let mut data = original;
        data[byte] ^= 1 << bit;
        let mut stored = code;
        let calc = ecc.calc(&data);

        prop_assert_eq!(ecc.correct(&mut data, &mut stored, &calc), Correction::Fixed);
        prop_assert_eq!(data, original);
    }

    /// Property: the code is deterministic.
    #[test]
    fn prop_data_code_deterministic(block in block_strategy()) {
        let ecc = HammingEcc;
        let mut data = [0u8; ECC_BLOCK_SIZE];
        data.copy_from_slice(&block);
        prop_assert_eq!(ecc.calc(&data), ecc.calc(&data));
    }
}
