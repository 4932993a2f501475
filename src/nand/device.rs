//! NAND Device Context
//!
//! The [`Device`] bundles everything a chunk operation touches: the geometry
//! from [`DeviceConfig`], the [`NandDriver`] doing raw page I/O, the
//! [`DataEcc`] used in software ECC mode, the running ECC counters and the
//! block-info table where blocks get flagged for retirement.
//!
//! All operations take `&mut Device`; callers serialise access.

use serde::Serialize;
use tracing::debug;

use crate::config::DeviceConfig;
use crate::ecc::{DataEcc, HammingEcc};
use crate::error::Result;
use crate::nand::spare::{NandSpare, Spare};

// =============================================================================
// Driver Port
// =============================================================================

/// Raw chunk I/O provided by a NAND driver.
///
/// `data`, when present, covers the data area of the chunk. `spare` always
/// covers the full spare area.
pub trait NandDriver {
    /// Program a chunk
    fn write_chunk(&mut self, chunk: u32, data: Option<&[u8]>, spare: &Spare) -> Result<()>;

    /// Read a chunk without any correction
    fn read_chunk(&mut self, chunk: u32, data: Option<&mut [u8]>, spare: &mut Spare)
        -> Result<()>;

    /// Read a chunk through controller-side ECC, reporting the outcome per
    /// 256-byte half. Drivers without controller ECC report clean halves.
    fn read_chunk_hw(
        &mut self,
        chunk: u32,
        data: Option<&mut [u8]>,
        spare: &mut NandSpare,
    ) -> Result<()> {
        self.read_chunk(chunk, data, &mut spare.spare)
    }
}

// =============================================================================
// ECC Counters
// =============================================================================

/// Running ECC event counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EccStats {
    /// Data halves repaired in software
    pub ecc_fixed: u32,
    /// Data halves software ECC could not repair
    pub ecc_unfixed: u32,
    /// Tag records repaired
    pub tags_ecc_fixed: u32,
    /// Tag records with an unrecoverable syndrome
    pub tags_ecc_unfixed: u32,
}

// =============================================================================
// Block Info
// =============================================================================

/// Per-block runtime state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    /// Block saw a data error and should be collected and retired
    pub needs_retiring: bool,
}

/// Block-info side table indexed by internal block number
#[derive(Debug, Clone)]
pub struct BlockInfoTable {
    first_block: u32,
    blocks: Vec<BlockInfo>,
}

impl BlockInfoTable {
    /// Table covering `first_block..=last_block`
    pub fn new(first_block: u32, last_block: u32) -> Self {
        let len = last_block.saturating_sub(first_block) as usize + 1;
        Self {
            first_block,
            blocks: vec![BlockInfo::default(); len],
        }
    }

    fn index(&self, block: u32) -> Option<usize> {
        let idx = block.checked_sub(self.first_block)? as usize;
        (idx < self.blocks.len()).then_some(idx)
    }

    pub fn get(&self, block: u32) -> Option<&BlockInfo> {
        self.index(block).map(|i| &self.blocks[i])
    }

    pub fn get_mut(&mut self, block: u32) -> Option<&mut BlockInfo> {
        self.index(block).map(move |i| &mut self.blocks[i])
    }

    /// Blocks currently flagged for retirement
    pub fn retiring_blocks(&self) -> Vec<u32> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, info)| info.needs_retiring)
            .map(|(i, _)| self.first_block + i as u32)
            .collect()
    }
}

// =============================================================================
// Device
// =============================================================================

/// A NAND device as seen by the tags layer
#[derive(Debug)]
pub struct Device<D, E = HammingEcc> {
    pub(crate) config: DeviceConfig,
    pub(crate) driver: D,
    pub(crate) ecc: E,
    pub(crate) stats: EccStats,
    pub(crate) block_info: BlockInfoTable,
}

impl<D: NandDriver> Device<D> {
    /// Create a device using the built-in Hamming data ECC
    pub fn new(config: DeviceConfig, driver: D) -> Result<Self> {
        Self::with_ecc(config, driver, HammingEcc)
    }
}

impl<D: NandDriver, E: DataEcc> Device<D, E> {
    /// Create a device with a custom data ECC
    pub fn with_ecc(config: DeviceConfig, driver: D, ecc: E) -> Result<Self> {
        config.validate()?;
        debug!(
            chunks_per_block = config.chunks_per_block,
            data_bytes_per_chunk = config.data_bytes_per_chunk,
            use_nand_ecc = config.use_nand_ecc,
            "device configured"
        );
        let block_info = BlockInfoTable::new(
            config.start_block + config.block_offset,
            config.end_block + config.block_offset,
        );
        Ok(Self {
            config,
            driver,
            ecc,
            stats: EccStats::default(),
            block_info,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn stats(&self) -> &EccStats {
        &self.stats
    }

    pub fn block_info(&self) -> &BlockInfoTable {
        &self.block_info
    }

    pub fn block_info_mut(&mut self) -> &mut BlockInfoTable {
        &mut self.block_info
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Give back the driver, e.g. to persist a simulated device
    pub fn into_driver(self) -> D {
        self.driver
    }
}
