//! Tag Record and Tag ECC
//!
//! The logical tag record is 64 bits packed into two little-endian 32-bit
//! words:
//!
//! ```text
//! word 0:  [31..22 byte_count_lsb][21..20 serial][19..0 chunk_id]
//! word 1:  [31..30 byte_count_msb][29..18 ecc   ][17..0 object_id]
//! ```
//!
//! The ECC is a position-XOR code: every set bit contributes its 1-based
//! position to an accumulator. Positions run from byte 0 to byte 7 and from
//! the least significant bit to the most significant bit within a byte, i.e.
//! position `p` is bit `p - 1` of the record read as a little-endian `u64`.
//! The ecc field is zero while the accumulator is computed.
//!
//! A single flipped payload bit produces a syndrome equal to its position and
//! is corrected. Two flipped bits usually produce a syndrome above 64 and are
//! reported as unrecoverable, but some pairs alias to a valid position. A flip
//! inside the ecc field itself yields a power-of-two syndrome; for the low
//! seven ecc bits that syndrome names a payload bit, which then gets
//! miscorrected. Media written by existing implementations depends on this
//! exact code, so the gap is kept as is.

use tracing::warn;

/// Size of a packed tag record in bytes
pub const TAGS_BYTES: usize = 8;

/// Highest syndrome that names a single bit position
const MAX_SINGLE_BIT_SYNDROME: u16 = 64;

// Field layout within the little-endian u64 view of the record.
const CHUNK_ID_SHIFT: u32 = 0;
const CHUNK_ID_BITS: u32 = 20;
const SERIAL_SHIFT: u32 = 20;
const SERIAL_BITS: u32 = 2;
const BYTE_COUNT_LSB_SHIFT: u32 = 22;
const BYTE_COUNT_LSB_BITS: u32 = 10;
const OBJECT_ID_SHIFT: u32 = 32;
const OBJECT_ID_BITS: u32 = 18;
const ECC_SHIFT: u32 = 50;
const ECC_BITS: u32 = 12;
const BYTE_COUNT_MSB_SHIFT: u32 = 62;
const BYTE_COUNT_MSB_BITS: u32 = 2;

const fn mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

const ECC_FIELD_MASK: u64 = mask(ECC_BITS) << ECC_SHIFT;

/// Bit positions (0-based, little-endian u64 view) occupied by the ecc field.
pub const ECC_FIELD_BITS: std::ops::Range<u32> = ECC_SHIFT..ECC_SHIFT + ECC_BITS;

// =============================================================================
// Tag ECC Outcome
// =============================================================================

/// Result of checking a tag record against its stored ecc
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagsEccOutcome {
    /// Stored and recomputed ecc agree
    Ok,
    /// A single bit was flipped back
    Corrected,
    /// Syndrome does not name a bit; record left as read
    Unrecoverable,
}

// =============================================================================
// Tag Record
// =============================================================================

/// Logical tag record as stored in the spare area
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tags {
    /// Chunk position within the owning object (20 bits)
    pub chunk_id: u32,
    /// Serial number used to pick the newest copy of a chunk (2 bits)
    pub serial_number: u8,
    /// Low 10 bits of the byte count
    pub byte_count_lsb: u16,
    /// Owning object (18 bits)
    pub object_id: u32,
    /// Stored tag ecc (12 bits)
    pub ecc: u16,
    /// High 2 bits of the byte count; all-ones on small-page devices
    pub byte_count_msb: u8,
}

impl Tags {
    /// Pack into the 8-byte on-media representation, truncating every field
    /// to its width.
    pub fn to_bytes(&self) -> [u8; TAGS_BYTES] {
        let word = (u64::from(self.chunk_id) & mask(CHUNK_ID_BITS)) << CHUNK_ID_SHIFT
            | (u64::from(self.serial_number) & mask(SERIAL_BITS)) << SERIAL_SHIFT
            | (u64::from(self.byte_count_lsb) & mask(BYTE_COUNT_LSB_BITS)) << BYTE_COUNT_LSB_SHIFT
            | (u64::from(self.object_id) & mask(OBJECT_ID_BITS)) << OBJECT_ID_SHIFT
            | (u64::from(self.ecc) & mask(ECC_BITS)) << ECC_SHIFT
            | (u64::from(self.byte_count_msb) & mask(BYTE_COUNT_MSB_BITS)) << BYTE_COUNT_MSB_SHIFT;
        word.to_le_bytes()
    }

    /// Unpack from the 8-byte on-media representation.
    pub fn from_bytes(bytes: &[u8; TAGS_BYTES]) -> Self {
        let word = u64::from_le_bytes(*bytes);
        let field = |shift: u32, bits: u32| (word >> shift) & mask(bits);
        Self {
            chunk_id: field(CHUNK_ID_SHIFT, CHUNK_ID_BITS) as u32,
            serial_number: field(SERIAL_SHIFT, SERIAL_BITS) as u8,
            byte_count_lsb: field(BYTE_COUNT_LSB_SHIFT, BYTE_COUNT_LSB_BITS) as u16,
            object_id: field(OBJECT_ID_SHIFT, OBJECT_ID_BITS) as u32,
            ecc: field(ECC_SHIFT, ECC_BITS) as u16,
            byte_count_msb: field(BYTE_COUNT_MSB_SHIFT, BYTE_COUNT_MSB_BITS) as u8,
        }
    }

    /// Recompute and store the ecc field.
    pub fn calc_ecc(&mut self) {
        self.ecc = calc_tags_ecc(&self.to_bytes());
    }

    /// Check the stored ecc, correcting a single flipped bit in place.
    pub fn check_ecc(&mut self) -> TagsEccOutcome {
        let mut bytes = self.to_bytes();
        let outcome = check_tags_ecc(&mut bytes);
        if outcome == TagsEccOutcome::Corrected {
            *self = Self::from_bytes(&bytes);
        }
        outcome
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Compute the tag ecc over a packed record. The ecc field of `bytes` is
/// ignored.
pub fn calc_tags_ecc(bytes: &[u8; TAGS_BYTES]) -> u16 {
    let word = u64::from_le_bytes(*bytes) & !ECC_FIELD_MASK;
    (0..64u16)
        .filter(|&bit| word & (1u64 << bit) != 0)
        .fold(0, |ecc, bit| ecc ^ (bit + 1))
}

fn stored_ecc(word: u64) -> u16 {
    ((word & ECC_FIELD_MASK) >> ECC_SHIFT) as u16
}

fn with_ecc(word: u64, ecc: u16) -> u64 {
    (word & !ECC_FIELD_MASK) | ((u64::from(ecc) << ECC_SHIFT) & ECC_FIELD_MASK)
}

/// Check a packed record against its stored ecc.
///
/// On a valid single-bit syndrome the bit is flipped back and the ecc field
/// refreshed. Any other non-zero syndrome leaves `bytes` untouched.
pub fn check_tags_ecc(bytes: &mut [u8; TAGS_BYTES]) -> TagsEccOutcome {
    let word = u64::from_le_bytes(*bytes);
    let syndrome = stored_ecc(word) ^ calc_tags_ecc(bytes);

    match syndrome {
        0 => TagsEccOutcome::Ok,
        1..=MAX_SINGLE_BIT_SYNDROME => {
            let fixed = word ^ (1u64 << (syndrome - 1));
            let fixed_bytes = fixed.to_le_bytes();
            let refreshed = with_ecc(fixed, calc_tags_ecc(&fixed_bytes));
            *bytes = refreshed.to_le_bytes();
            TagsEccOutcome::Corrected
        }
        _ => {
            warn!(syndrome, "tag ecc syndrome does not name a single bit");
            TagsEccOutcome::Unrecoverable
        }
    }
}
