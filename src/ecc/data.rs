//! Data-Area ECC
//!
//! Each 512-byte data area is protected as two independent 256-byte blocks,
//! each with a 3-byte Hamming code stored in the spare area. The code holds
//! 22 parity bits:
//!
//! ```text
//! code[0]:  LP07 LP06 LP05 LP04 LP03 LP02 LP01 LP00   (line parity, bits 3..0 of byte index)
//! code[1]:  LP15 LP14 LP13 LP12 LP11 LP10 LP09 LP08   (line parity, bits 7..4 of byte index)
//! code[2]:  CP5  CP4  CP3  CP2  CP1  CP0  1    1      (column parity)
//! ```
//!
//! Every bit is stored inverted so an erased data block (all 0xFF) has the
//! code `FF FF FF`.
//!
//! A single flipped data bit makes every parity pair differ in exactly one
//! member, which locates the byte and the bit. A single flipped code bit makes
//! exactly one bit of the difference set. Anything else is uncorrectable.

use tracing::trace;

use crate::bits::count_bits;

/// Bytes covered by one data ECC code
pub const ECC_BLOCK_SIZE: usize = 256;

/// Bytes in one data ECC code
pub const ECC_CODE_SIZE: usize = 3;

/// Outcome of correcting one 256-byte block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Correction {
    /// Code matched
    #[default]
    NoError,
    /// A single data or code bit was repaired
    Fixed,
    /// Too many bits differ to repair
    Unfixed,
}

/// Port for the 256-byte data-area ECC.
///
/// Implementations must be deterministic: the code computed on write is
/// compared against the code recomputed on read.
pub trait DataEcc {
    /// Compute the code for one 256-byte block
    fn calc(&self, data: &[u8; ECC_BLOCK_SIZE]) -> [u8; ECC_CODE_SIZE];

    /// Repair `data` (or `read_code`) using the stored and recomputed codes
    fn correct(
        &self,
        data: &mut [u8; ECC_BLOCK_SIZE],
        read_code: &mut [u8; ECC_CODE_SIZE],
        calc_code: &[u8; ECC_CODE_SIZE],
    ) -> Correction;
}

// =============================================================================
// Hamming ECC
// =============================================================================

/// Column parity for every byte value:
/// bit 7 CP5 (bits 4..7), bit 6 CP4 (bits 0..3), bit 5 CP3 (bits 2,3,6,7),
/// bit 4 CP2 (bits 0,1,4,5), bit 3 CP1 (odd bits), bit 2 CP0 (even bits),
/// bit 0 parity of the whole byte.
static COLUMN_PARITY_TABLE: [u8; 256] = build_column_parity_table();

const fn parity_of(x: u8, mask: u8) -> u8 {
    ((x & mask).count_ones() & 1) as u8
}

const fn build_column_parity_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let b = i as u8;
        table[i] = parity_of(b, 0xF0) << 7
            | parity_of(b, 0x0F) << 6
            | parity_of(b, 0xCC) << 5
            | parity_of(b, 0x33) << 4
            | parity_of(b, 0xAA) << 3
            | parity_of(b, 0x55) << 2
            | parity_of(b, 0xFF);
        i += 1;
    }
    table
}

/// Interleave four line-parity bits with their complements, high nibble
/// bit first: `lp.3 lp'.3 lp.2 lp'.2 ...`.
fn interleave_nibble(line: u8, line_prime: u8) -> u8 {
    (0..4).fold(0u8, |acc, i| {
        let bit = 3 - i;
        let pos = 7 - 2 * i;
        acc | ((line >> bit) & 1) << pos | ((line_prime >> bit) & 1) << (pos - 1)
    })
}

/// Classic 256-byte Hamming code: corrects one bit, detects two.
#[derive(Debug, Clone, Copy, Default)]
pub struct HammingEcc;

impl DataEcc for HammingEcc {
    fn calc(&self, data: &[u8; ECC_BLOCK_SIZE]) -> [u8; ECC_CODE_SIZE] {
        let mut col_parity = 0u8;
        let mut line_parity = 0u8;
        let mut line_parity_prime = 0u8;

        for (i, &byte) in data.iter().enumerate() {
            let b = COLUMN_PARITY_TABLE[byte as usize];
            col_parity ^= b;
            if b & 0x01 != 0 {
                line_parity ^= i as u8;
                line_parity_prime ^= !(i as u8);
            }
        }

        [
            !interleave_nibble(line_parity, line_parity_prime),
            !interleave_nibble(line_parity >> 4, line_parity_prime >> 4),
            !col_parity | 0x03,
        ]
    }

    fn correct(
        &self,
        data: &mut [u8; ECC_BLOCK_SIZE],
        read_code: &mut [u8; ECC_CODE_SIZE],
        calc_code: &[u8; ECC_CODE_SIZE],
    ) -> Correction {
        let d0 = read_code[0] ^ calc_code[0];
        let d1 = read_code[1] ^ calc_code[1];
        let d2 = read_code[2] ^ calc_code[2];

        if d0 | d1 | d2 == 0 {
            return Correction::NoError;
        }

        if (d0 ^ (d0 >> 1)) & 0x55 == 0x55
            && (d1 ^ (d1 >> 1)) & 0x55 == 0x55
            && (d2 ^ (d2 >> 1)) & 0x54 == 0x54
        {
            // every pair split: the odd members spell out the location
            let odd_bits = |d: u8| (0..4).fold(0u8, |acc, i| acc | ((d >> (7 - 2 * i)) & 1) << (3 - i));
            let byte = (odd_bits(d1) << 4 | odd_bits(d0)) as usize;
            let bit = odd_bits(d2) >> 1;

            trace!(byte, bit, "data ecc single bit repair");
            data[byte] ^= 1 << bit;
            return Correction::Fixed;
        }

        if count_bits(d0) + count_bits(d1) + count_bits(d2) == 1 {
            // the stored code took the hit, data is fine
            *read_code = *calc_code;
            return Correction::Fixed;
        }

        Correction::Unfixed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> [u8; ECC_BLOCK_SIZE] {
        let mut data = [0u8; ECC_BLOCK_SIZE];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37).wrapping_add(11);
        }
        data
    }

    #[test]
    fn test_column_parity_table() {
        assert_eq!(COLUMN_PARITY_TABLE[0x00], 0x00);
        assert_eq!(COLUMN_PARITY_TABLE[0xFF], 0x00);
        // bit 0: CP0 and whole-byte parity
        assert_eq!(COLUMN_PARITY_TABLE[0x01], 0b0101_0101);
        // bit 7: CP5, CP3, CP1 and whole-byte parity
        assert_eq!(COLUMN_PARITY_TABLE[0x80], 0b1010_1001);
    }

    #[test]
    fn test_erased_block_code() {
        let ecc = HammingEcc;
        assert_eq!(ecc.calc(&[0xFF; ECC_BLOCK_SIZE]), [0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_zero_block_code() {
        let ecc = HammingEcc;
        assert_eq!(ecc.calc(&[0x00; ECC_BLOCK_SIZE]), [0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_clean_block() {
        let ecc = HammingEcc;
        let mut data = pattern();
        let mut stored = ecc.calc(&data);
        let calc = ecc.calc(&data);

        assert_eq!(ecc.correct(&mut data, &mut stored, &calc), Correction::NoError);
        assert_eq!(data, pattern());
    }

    #[test]
    fn test_every_single_data_bit_is_fixed() {
        let ecc = HammingEcc;
        let original = pattern();
        let code = ecc.calc(&original);

        for byte in 0..ECC_BLOCK_SIZE {
            for bit in 0..8 {
                let mut data = original;
                data[byte] ^= 1 << bit;
                let mut stored = code;
                let calc = ecc.calc(&data);

                let result = ecc.correct(&mut data, &mut stored, &calc);
                assert_eq!(result, Correction::Fixed, "byte {} bit {}", byte, bit);
                assert_eq!(data, original, "byte {} bit {}", byte, bit);
            }
        }
    }

    #[test]
    fn test_single_code_bit_is_fixed() {
        let ecc = HammingEcc;
        let original = pattern();
        let code = ecc.calc(&original);

        for idx in 0..ECC_CODE_SIZE {
            for bit in 0..8 {
                // bits 0 and 1 of code[2] are constant padding
                if idx == 2 && bit < 2 {
                    continue;
                }
                let mut data = original;
                let mut stored = code;
                stored[idx] ^= 1 << bit;

                let result = ecc.correct(&mut data, &mut stored, &code);
                assert_eq!(result, Correction::Fixed);
                assert_eq!(data, original);
                assert_eq!(stored, code);
            }
        }
    }

    #[test]
    fn test_double_bit_is_unfixed() {
        let ecc = HammingEcc;
        let original = pattern();
        let code = ecc.calc(&original);

        let mut data = original;
        data[0] ^= 0x01;
        data[1] ^= 0x01;
        let mut stored = code;
        let calc = ecc.calc(&data);

        assert_eq!(ecc.correct(&mut data, &mut stored, &calc), Correction::Unfixed);
    }
}
