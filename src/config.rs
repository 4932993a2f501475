//! Device Configuration
//!
//! Geometry and ECC mode of a NAND device, loadable from YAML or JSON.
//!
//! ```yaml
//! chunks_per_block: 32
//! data_bytes_per_chunk: 512
//! start_block: 1
//! end_block: 1023
//! use_nand_ecc: false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ecc::ECC_BLOCK_SIZE;
use crate::error::{Error, Result};

/// Payload size from which the two high byte-count bits are stored
pub const LARGE_CHUNK_THRESHOLD: usize = 1024;

/// Configuration for a NAND device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Chunks (pages) per erase block
    pub chunks_per_block: u32,

    /// Data bytes per chunk, excluding the spare area
    pub data_bytes_per_chunk: usize,

    /// First block the filesystem may write; blocks below it are reserved
    pub start_block: u32,

    /// Last block of the device, inclusive
    pub end_block: u32,

    /// Let the controller compute and correct data ECC
    pub use_nand_ecc: bool,

    /// Added to a device block number to index the block-info table
    pub block_offset: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            chunks_per_block: 32,
            data_bytes_per_chunk: 512,
            start_block: 0,
            end_block: 127,
            use_nand_ecc: false,
            block_offset: 0,
        }
    }
}

impl DeviceConfig {
    /// Load from a file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text)?,
            _ => serde_yaml::from_str(&text)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject geometries the tags layer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.chunks_per_block < 2 {
            return Err(Error::InvalidConfig(
                "chunks_per_block must be at least 2".to_string(),
            ));
        }
        if self.data_bytes_per_chunk < 2 * ECC_BLOCK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "data_bytes_per_chunk must be at least {}, got {}",
                2 * ECC_BLOCK_SIZE,
                self.data_bytes_per_chunk
            )));
        }
        if self.end_block < self.start_block {
            return Err(Error::InvalidConfig(format!(
                "end_block {} is below start_block {}",
                self.end_block, self.start_block
            )));
        }
        // every chunk number of the device must fit in a u32
        if self
            .end_block
            .checked_add(1)
            .and_then(|blocks| blocks.checked_mul(self.chunks_per_block))
            .is_none()
        {
            return Err(Error::InvalidConfig(format!(
                "{} blocks of {} chunks exceed the chunk address space",
                u64::from(self.end_block) + 1,
                self.chunks_per_block
            )));
        }
        if self.end_block.checked_add(self.block_offset).is_none() {
            return Err(Error::InvalidConfig(format!(
                "block_offset {} overflows block numbers up to {}",
                self.block_offset, self.end_block
            )));
        }
        Ok(())
    }

    /// Number of blocks addressed by the device
    pub fn total_blocks(&self) -> u32 {
        self.end_block.saturating_add(1)
    }

    /// First chunk outside the reserved region
    pub fn first_valid_chunk(&self) -> u32 {
        self.start_block.saturating_mul(self.chunks_per_block)
    }

    /// First chunk of `block`, or `None` when it has no chunk address
    pub fn block_first_chunk(&self, block: u32) -> Option<u32> {
        block.checked_mul(self.chunks_per_block)
    }

    /// Whether byte counts keep their two high bits
    pub fn stores_byte_count_msb(&self) -> bool {
        self.data_bytes_per_chunk >= LARGE_CHUNK_THRESHOLD
    }
}
