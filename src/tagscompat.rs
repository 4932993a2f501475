//! Tags Compatibility Layer
//!
//! Chunk-level operations for the legacy spare layout: write and read a chunk
//! with its tags, mark a block bad, and classify a block during mount.
//!
//! # Markers
//!
//! | marker        | where                    | meaning                         |
//! |---------------|--------------------------|---------------------------------|
//! | `page == 0`   | spare byte 4             | chunk deleted                   |
//! | `block == 'Y'`| spare byte 5, chunks 0+1 | block bad                       |
//! | all `0xFF`    | whole spare              | chunk never written             |
//!
//! Markers are tested by counting set bits: fewer than seven set bits means
//! programmed. This tolerates a single bit that decayed back to 1 in a marker,
//! and a single stray 0 in an erased byte.
//!
//! # Limitations
//!
//! The format has no per-block sequence number, so [`BlockQuery::sequence_number`]
//! is always 0 and write order cannot be recovered from this layer.

use serde::Serialize;
use tracing::{instrument, warn};

use crate::bits::{count_bits, is_programmed, MARKER_THRESHOLD};
use crate::ecc::{DataEcc, Tags, TagsEccOutcome};
use crate::error::{Error, Result};
use crate::nand::chunk_io::EccResult;
use crate::nand::device::{Device, NandDriver};
use crate::nand::spare::{tags_from_spare, Spare, BLOCK_STATUS_BAD, PAGE_STATUS_DELETED};

/// Byte count bits held in the low field
const BYTE_COUNT_LSB_MASK: u32 = 0x3FF;
const BYTE_COUNT_MSB_SHIFT: u32 = 10;
/// High byte count field on devices with chunks below 1 KiB
const BYTE_COUNT_MSB_LEGACY: u8 = 0b11;

// =============================================================================
// Extended Tags
// =============================================================================

/// Tags plus chunk status as seen by the filesystem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtendedTags {
    /// Chunk was programmed at least once
    pub chunk_used: bool,
    /// Page status marker is programmed
    pub chunk_deleted: bool,
    /// Never set by a successful read
    pub block_bad: bool,
    /// Data ECC outcome of the read
    pub ecc_result: EccResult,
    /// Tag ECC outcome, when tags were decoded
    pub tags_ecc: Option<TagsEccOutcome>,

    pub object_id: u32,
    pub chunk_id: u32,
    pub byte_count: u32,
    pub serial_number: u8,
}

impl ExtendedTags {
    /// Tags for a live chunk
    pub fn new(object_id: u32, chunk_id: u32, byte_count: u32, serial_number: u8) -> Self {
        Self {
            object_id,
            chunk_id,
            byte_count,
            serial_number,
            ..Default::default()
        }
    }

    /// Tags that delete a chunk
    pub fn deleted() -> Self {
        Self {
            chunk_deleted: true,
            ..Default::default()
        }
    }
}

// =============================================================================
// Block Query
// =============================================================================

/// State of a block as far as the spare markers tell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockState {
    /// Bad block marker present
    Dead,
    /// First chunk never written
    Empty,
    /// Holds data; contents must be recovered by a scan
    NeedsScanning,
}

impl std::fmt::Display for BlockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockState::Dead => write!(f, "dead"),
            BlockState::Empty => write!(f, "empty"),
            BlockState::NeedsScanning => write!(f, "needs-scanning"),
        }
    }
}

/// Result of [`Device::query_block`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockQuery {
    pub state: BlockState,
    /// Always 0: this format stores no block sequence number
    pub sequence_number: u32,
}

// =============================================================================
// Tags Handler Port
// =============================================================================

/// Chunk tag operations consumed by the filesystem core.
pub trait TagsHandler {
    /// Write a chunk together with its tags
    fn write_chunk_tags(&mut self, chunk: u32, data: Option<&[u8]>, tags: &ExtendedTags)
        -> Result<()>;

    /// Read a chunk; fills `tags` when given
    fn read_chunk_tags(
        &mut self,
        chunk: u32,
        data: Option<&mut [u8]>,
        tags: Option<&mut ExtendedTags>,
    ) -> Result<()>;

    /// Mark a block bad
    fn mark_bad(&mut self, block: u32) -> Result<()>;

    /// Classify a block
    fn query_block(&mut self, block: u32) -> Result<BlockQuery>;
}

// =============================================================================
// Operations
// =============================================================================

impl<D: NandDriver, E: DataEcc> Device<D, E> {
    /// Write a chunk with tags.
    ///
    /// A deleted chunk only gets its page status programmed; tags and data
    /// ECC stay erased.
    #[instrument(skip(self, data, tags), fields(deleted = tags.chunk_deleted))]
    pub fn write_chunk_tags(
        &mut self,
        chunk: u32,
        data: Option<&[u8]>,
        tags: &ExtendedTags,
    ) -> Result<()> {
        let mut spare = Spare::ERASED;

        if tags.chunk_deleted {
            spare.page_status = PAGE_STATUS_DELETED;
        } else {
            let byte_count_msb = if self.config.stores_byte_count_msb() {
                ((tags.byte_count >> BYTE_COUNT_MSB_SHIFT) & 0b11) as u8
            } else {
                BYTE_COUNT_MSB_LEGACY
            };
            let mut record = Tags {
                chunk_id: tags.chunk_id,
                serial_number: tags.serial_number,
                byte_count_lsb: (tags.byte_count & BYTE_COUNT_LSB_MASK) as u16,
                object_id: tags.object_id,
                ecc: 0,
                byte_count_msb,
            };

            if let (false, Some(buf)) = (self.config.use_nand_ecc, data) {
                self.calc_data_ecc(buf, &mut spare)?;
            }

            spare.load_tags(&mut record);
        }

        self.write_nand(chunk, data, &spare)
    }

    /// Read a chunk with tags.
    ///
    /// Succeeds whenever the driver read succeeds, whatever the tag or data
    /// ECC outcome; those are reported through `tags` and the counters.
    #[instrument(skip(self, data, tags))]
    pub fn read_chunk_tags(
        &mut self,
        chunk: u32,
        data: Option<&mut [u8]>,
        tags: Option<&mut ExtendedTags>,
    ) -> Result<()> {
        let mut spare = Spare::ERASED;
        let ecc_result = self.read_nand(chunk, data, &mut spare, true)?;

        let Some(tags) = tags else {
            return Ok(());
        };

        tags.chunk_deleted = is_programmed(spare.page_status);
        tags.block_bad = false;
        tags.ecc_result = ecc_result;
        tags.chunk_used = !spare.is_erased();
        tags.tags_ecc = None;

        if tags.chunk_used {
            let (record, outcome) = tags_from_spare(&spare, &mut self.stats);
            if outcome == TagsEccOutcome::Unrecoverable {
                warn!(chunk, "tag ecc unrecoverable, tags reported as read");
            }

            tags.object_id = record.object_id;
            tags.chunk_id = record.chunk_id;
            tags.byte_count = u32::from(record.byte_count_lsb);
            if self.config.stores_byte_count_msb() {
                tags.byte_count |= u32::from(record.byte_count_msb) << BYTE_COUNT_MSB_SHIFT;
            }
            tags.serial_number = record.serial_number;
            tags.tags_ecc = Some(outcome);
        }

        Ok(())
    }

    /// Program the bad block marker into the first two chunks of `block`.
    ///
    /// Failures of the individual writes are logged and otherwise ignored.
    /// A block with no chunk address is an error.
    #[instrument(skip(self))]
    pub fn mark_bad(&mut self, block: u32) -> Result<()> {
        let mut spare = Spare::ERASED;
        spare.block_status = BLOCK_STATUS_BAD;

        let (first, second) = self.marker_chunks(block)?;
        for chunk in [first, second] {
            if let Err(e) = self.write_nand(chunk, None, &spare) {
                warn!(block, chunk, error = %e, "bad block marker write failed");
            }
        }
        Ok(())
    }

    /// Classify a block from the spares of its first two chunks.
    #[instrument(skip(self))]
    pub fn query_block(&mut self, block: u32) -> Result<BlockQuery> {
        let (first, second) = self.marker_chunks(block)?;
        let mut spare0 = Spare::ERASED;
        let mut spare1 = Spare::ERASED;

        self.read_nand(first, None, &mut spare0, true)?;
        self.read_nand(second, None, &mut spare1, true)?;

        // a bit cleared in either copy counts
        let state = if count_bits(spare0.block_status & spare1.block_status) < MARKER_THRESHOLD {
            BlockState::Dead
        } else if spare0.is_erased() {
            BlockState::Empty
        } else {
            BlockState::NeedsScanning
        };

        Ok(BlockQuery {
            state,
            sequence_number: 0,
        })
    }

    /// The two chunks of `block` carrying its bad block marker
    fn marker_chunks(&self, block: u32) -> Result<(u32, u32)> {
        let first = self
            .config
            .block_first_chunk(block)
            .ok_or(Error::BlockOutOfRange { block })?;
        let second = first
            .checked_add(1)
            .ok_or(Error::BlockOutOfRange { block })?;
        Ok((first, second))
    }
}

impl<D: NandDriver, E: DataEcc> TagsHandler for Device<D, E> {
    fn write_chunk_tags(
        &mut self,
        chunk: u32,
        data: Option<&[u8]>,
        tags: &ExtendedTags,
    ) -> Result<()> {
        Device::write_chunk_tags(self, chunk, data, tags)
    }

    fn read_chunk_tags(
        &mut self,
        chunk: u32,
        data: Option<&mut [u8]>,
        tags: Option<&mut ExtendedTags>,
    ) -> Result<()> {
        Device::read_chunk_tags(self, chunk, data, tags)
    }

    fn mark_bad(&mut self, block: u32) -> Result<()> {
        Device::mark_bad(self, block)
    }

    fn query_block(&mut self, block: u32) -> Result<BlockQuery> {
        Device::query_block(self, block)
    }
}
