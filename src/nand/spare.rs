//! Spare Area Layout
//!
//! Physical layout of the 16-byte spare area that follows every chunk:
//!
//! ```text
//! offset  0    1    2    3    4      5      6    7    8..11  11   12   13..16
//!       ┌────┬────┬────┬────┬──────┬──────┬────┬────┬──────┬────┬────┬──────┐
//!       │ t0 │ t1 │ t2 │ t3 │ page │ block│ t4 │ t5 │ ecc1 │ t6 │ t7 │ ecc2 │
//!       └────┴────┴────┴────┴──────┴──────┴────┴────┴──────┴────┴────┴──────┘
//! ```
//!
//! `tN` is byte N of the packed tag record, `page` the page status marker
//! (programmed to 0 when the chunk is deleted), `block` the block status
//! marker (programmed to `'Y'` when the block is bad), and `ecc1`/`ecc2` the
//! data ECC codes for bytes 0..256 and 256..512 of the data area.

use crate::ecc::{Correction, Tags, TagsEccOutcome, ECC_CODE_SIZE, TAGS_BYTES};
use crate::nand::device::EccStats;

/// Size of the spare area in bytes
pub const SPARE_BYTES: usize = 16;

/// Page status written to delete a chunk
pub const PAGE_STATUS_DELETED: u8 = 0;

/// Block status written to mark a block bad
pub const BLOCK_STATUS_BAD: u8 = b'Y';

const PAGE_STATUS_OFFSET: usize = 4;
const BLOCK_STATUS_OFFSET: usize = 5;
const ECC1_OFFSET: usize = 8;
const ECC2_OFFSET: usize = 13;

/// Spare offset of each tag byte
const TAG_BYTE_OFFSETS: [usize; TAGS_BYTES] = [0, 1, 2, 3, 6, 7, 11, 12];

// =============================================================================
// Spare
// =============================================================================

/// Decoded spare area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spare {
    /// Packed tag record, in tag byte order
    pub tag_bytes: [u8; TAGS_BYTES],
    pub page_status: u8,
    pub block_status: u8,
    /// Code for data bytes 0..256
    pub ecc1: [u8; ECC_CODE_SIZE],
    /// Code for data bytes 256..512
    pub ecc2: [u8; ECC_CODE_SIZE],
}

impl Default for Spare {
    fn default() -> Self {
        Self::ERASED
    }
}

impl Spare {
    /// Spare as read from an erased chunk
    pub const ERASED: Spare = Spare {
        tag_bytes: [0xFF; TAGS_BYTES],
        page_status: 0xFF,
        block_status: 0xFF,
        ecc1: [0xFF; ECC_CODE_SIZE],
        ecc2: [0xFF; ECC_CODE_SIZE],
    };

    /// Serialise to the on-media layout.
    pub fn to_bytes(&self) -> [u8; SPARE_BYTES] {
        let mut raw = [0u8; SPARE_BYTES];
        for (&offset, &b) in TAG_BYTE_OFFSETS.iter().zip(self.tag_bytes.iter()) {
            raw[offset] = b;
        }
        raw[PAGE_STATUS_OFFSET] = self.page_status;
        raw[BLOCK_STATUS_OFFSET] = self.block_status;
        raw[ECC1_OFFSET..ECC1_OFFSET + ECC_CODE_SIZE].copy_from_slice(&self.ecc1);
        raw[ECC2_OFFSET..ECC2_OFFSET + ECC_CODE_SIZE].copy_from_slice(&self.ecc2);
        raw
    }

    /// Parse from the on-media layout.
    pub fn from_bytes(raw: &[u8; SPARE_BYTES]) -> Self {
        let mut spare = Self::ERASED;
        for (b, &offset) in spare.tag_bytes.iter_mut().zip(TAG_BYTE_OFFSETS.iter()) {
            *b = raw[offset];
        }
        spare.page_status = raw[PAGE_STATUS_OFFSET];
        spare.block_status = raw[BLOCK_STATUS_OFFSET];
        spare.ecc1.copy_from_slice(&raw[ECC1_OFFSET..ECC1_OFFSET + ECC_CODE_SIZE]);
        spare.ecc2.copy_from_slice(&raw[ECC2_OFFSET..ECC2_OFFSET + ECC_CODE_SIZE]);
        spare
    }

    /// True if no bit of the spare has ever been programmed.
    pub fn is_erased(&self) -> bool {
        *self == Self::ERASED
    }

    /// Compute the tag ecc and store the packed record in the tag slots.
    pub fn load_tags(&mut self, tags: &mut Tags) {
        tags.calc_ecc();
        self.tag_bytes = tags.to_bytes();
    }
}

/// Extract and check the tag record, counting ecc repairs and failures.
///
/// On an unrecoverable syndrome the record is returned as read.
pub fn tags_from_spare(spare: &Spare, stats: &mut EccStats) -> (Tags, TagsEccOutcome) {
    let mut tags = Tags::from_bytes(&spare.tag_bytes);
    let outcome = tags.check_ecc();
    match outcome {
        TagsEccOutcome::Corrected => stats.tags_ecc_fixed += 1,
        TagsEccOutcome::Unrecoverable => stats.tags_ecc_unfixed += 1,
        TagsEccOutcome::Ok => {}
    }
    (tags, outcome)
}

// =============================================================================
// Hardware ECC Spare
// =============================================================================

/// Spare read through a controller that corrects the data area itself and
/// reports the outcome for each 256-byte half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NandSpare {
    pub spare: Spare,
    pub eccres1: Correction,
    pub eccres2: Correction,
}
