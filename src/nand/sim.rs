//! In-Memory NAND Simulator
//!
//! A [`NandDriver`] backed by RAM, used by the tests and the CLI. It behaves
//! like real NAND where the tags layer can tell the difference:
//!
//! - programming can only clear bits (`stored &= written`);
//! - [`MemNand::erase_block`] restores a block to all `0xFF`;
//! - in controller-ECC mode the simulator computes the data ECC itself on
//!   write, stores it in the spare ECC groups, and corrects data on read.
//!
//! Faults can be injected by flipping stored bits or by making chunks fail
//! their reads or writes.
//!
//! # Image Format
//!
//! [`MemNand::to_image`] produces one record per chunk, in chunk order:
//!
//! ```text
//! ┌──────────── data_bytes_per_chunk ────────────┬── 16 ──┐
//! │ data area                                    │ spare  │  chunk 0
//! ├──────────────────────────────────────────────┼────────┤
//! │ data area                                    │ spare  │  chunk 1
//! └──────────────────────────────────────────────┴────────┘
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info};

use crate::config::DeviceConfig;
use crate::ecc::{Correction, DataEcc, HammingEcc, ECC_BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::nand::chunk_io::ecc_halves;
use crate::nand::device::NandDriver;
use crate::nand::spare::{NandSpare, Spare, SPARE_BYTES};

/// Physical geometry of a simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NandGeometry {
    pub blocks: u32,
    pub chunks_per_block: u32,
    pub data_bytes_per_chunk: usize,
}

impl NandGeometry {
    pub fn total_chunks(&self) -> u32 {
        self.blocks * self.chunks_per_block
    }

    /// Bytes per chunk in an image file
    pub fn record_size(&self) -> usize {
        self.data_bytes_per_chunk + SPARE_BYTES
    }
}

impl From<&DeviceConfig> for NandGeometry {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            blocks: config.total_blocks(),
            chunks_per_block: config.chunks_per_block,
            data_bytes_per_chunk: config.data_bytes_per_chunk,
        }
    }
}

/// Operation counts, for tests and reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCounters {
    pub reads: u64,
    pub writes: u64,
    pub erases: u64,
}

/// RAM-backed NAND device
#[derive(Debug, Clone)]
pub struct MemNand {
    geometry: NandGeometry,
    data: Vec<u8>,
    spares: Vec<[u8; SPARE_BYTES]>,
    controller_ecc: bool,
    failing_reads: BTreeSet<u32>,
    failing_writes: BTreeSet<u32>,
    counters: SimCounters,
}

impl MemNand {
    /// Fully erased device
    pub fn new(geometry: NandGeometry) -> Self {
        let chunks = geometry.total_chunks() as usize;
        Self {
            geometry,
            data: vec![0xFF; chunks * geometry.data_bytes_per_chunk],
            spares: vec![[0xFF; SPARE_BYTES]; chunks],
            controller_ecc: false,
            failing_reads: BTreeSet::new(),
            failing_writes: BTreeSet::new(),
            counters: SimCounters::default(),
        }
    }

    /// Erased device matching a configuration, with controller ECC when the
    /// configuration asks for it
    pub fn for_config(config: &DeviceConfig) -> Self {
        let nand = Self::new(NandGeometry::from(config));
        if config.use_nand_ecc {
            nand.with_controller_ecc()
        } else {
            nand
        }
    }

    /// Emulate a controller that handles data ECC itself
    pub fn with_controller_ecc(mut self) -> Self {
        self.controller_ecc = true;
        self
    }

    pub fn geometry(&self) -> NandGeometry {
        self.geometry
    }

    pub fn counters(&self) -> SimCounters {
        self.counters
    }

    fn check_chunk(&self, chunk: u32) -> std::result::Result<usize, String> {
        if chunk < self.geometry.total_chunks() {
            Ok(chunk as usize)
        } else {
            Err(format!(
                "chunk beyond end of device ({} chunks)",
                self.geometry.total_chunks()
            ))
        }
    }

    fn data_range(&self, idx: usize) -> std::ops::Range<usize> {
        let size = self.geometry.data_bytes_per_chunk;
        idx * size..(idx + 1) * size
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Reset every chunk of `block` to the erased state
    pub fn erase_block(&mut self, block: u32) -> Result<()> {
        if block >= self.geometry.blocks {
            return Err(Error::InvalidImage(format!("block {} beyond end of device", block)));
        }
        let first = (block * self.geometry.chunks_per_block) as usize;
        let last = first + self.geometry.chunks_per_block as usize;
        let size = self.geometry.data_bytes_per_chunk;

        self.data[first * size..last * size].fill(0xFF);
        for spare in &mut self.spares[first..last] {
            *spare = [0xFF; SPARE_BYTES];
        }
        self.counters.erases += 1;
        debug!(block, "block erased");
        Ok(())
    }

    /// Stored spare of a chunk, bypassing all ECC
    pub fn raw_spare(&self, chunk: u32) -> Option<Spare> {
        self.spares.get(chunk as usize).map(Spare::from_bytes)
    }

    /// Stored data of a chunk, bypassing all ECC
    pub fn raw_data(&self, chunk: u32) -> Option<&[u8]> {
        let idx = self.check_chunk(chunk).ok()?;
        Some(&self.data[self.data_range(idx)])
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    /// Invert one stored data bit
    pub fn flip_data_bit(&mut self, chunk: u32, byte: usize, bit: u8) {
        if let Ok(idx) = self.check_chunk(chunk) {
            let offset = self.data_range(idx).start + byte;
            if byte < self.geometry.data_bytes_per_chunk {
                self.data[offset] ^= 1 << (bit & 7);
            }
        }
    }

    /// Invert one stored spare bit; `byte` is the on-media offset
    pub fn flip_spare_bit(&mut self, chunk: u32, byte: usize, bit: u8) {
        if let Some(spare) = self.spares.get_mut(chunk as usize) {
            if byte < SPARE_BYTES {
                spare[byte] ^= 1 << (bit & 7);
            }
        }
    }

    /// Make every read of `chunk` fail
    pub fn fail_reads(&mut self, chunk: u32) {
        self.failing_reads.insert(chunk);
    }

    /// Make every write of `chunk` fail
    pub fn fail_writes(&mut self, chunk: u32) {
        self.failing_writes.insert(chunk);
    }

    /// Clear all injected read/write failures
    pub fn clear_failures(&mut self) {
        self.failing_reads.clear();
        self.failing_writes.clear();
    }

    // =========================================================================
    // Image Persistence
    // =========================================================================

    /// Serialise the whole device
    pub fn to_image(&self) -> Vec<u8> {
        let mut image = Vec::with_capacity(self.spares.len() * self.geometry.record_size());
        for (idx, spare) in self.spares.iter().enumerate() {
            image.extend_from_slice(&self.data[self.data_range(idx)]);
            image.extend_from_slice(spare);
        }
        image
    }

    /// Rebuild a device from an image; the block count follows from its size
    pub fn from_image(
        image: &[u8],
        chunks_per_block: u32,
        data_bytes_per_chunk: usize,
    ) -> Result<Self> {
        let record = data_bytes_per_chunk + SPARE_BYTES;
        let block_bytes = record * chunks_per_block as usize;
        if block_bytes == 0 || image.is_empty() || image.len() % block_bytes != 0 {
            return Err(Error::InvalidImage(format!(
                "size {} is not a multiple of the block size {}",
                image.len(),
                block_bytes
            )));
        }

        let geometry = NandGeometry {
            blocks: (image.len() / block_bytes) as u32,
            chunks_per_block,
            data_bytes_per_chunk,
        };
        let mut nand = Self::new(geometry);
        for (idx, rec) in image.chunks_exact(record).enumerate() {
            let (data, spare) = rec.split_at(data_bytes_per_chunk);
            let range = nand.data_range(idx);
            nand.data[range].copy_from_slice(data);
            nand.spares[idx].copy_from_slice(spare);
        }
        Ok(nand)
    }

    /// Load an image file laid out for `config`
    pub fn load(path: impl AsRef<Path>, config: &DeviceConfig) -> Result<Self> {
        let path = path.as_ref();
        let image = std::fs::read(path)?;
        let nand = Self::from_image(&image, config.chunks_per_block, config.data_bytes_per_chunk)?;
        if nand.geometry.blocks < config.total_blocks() {
            return Err(Error::InvalidImage(format!(
                "{} holds {} blocks, configuration needs {}",
                path.display(),
                nand.geometry.blocks,
                config.total_blocks()
            )));
        }
        info!(path = %path.display(), blocks = nand.geometry.blocks, "image loaded");
        Ok(if config.use_nand_ecc {
            nand.with_controller_ecc()
        } else {
            nand
        })
    }

    /// Write the image to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_image())?;
        Ok(())
    }
}

impl NandDriver for MemNand {
    fn write_chunk(&mut self, chunk: u32, data: Option<&[u8]>, spare: &Spare) -> Result<()> {
        let idx = self
            .check_chunk(chunk)
            .map_err(|reason| Error::DriverWrite { chunk, reason })?;
        if self.failing_writes.contains(&chunk) {
            return Err(Error::DriverWrite {
                chunk,
                reason: "injected write failure".to_string(),
            });
        }

        let mut spare = *spare;
        if let Some(buf) = data {
            if buf.len() > self.geometry.data_bytes_per_chunk {
                return Err(Error::InvalidBuffer {
                    expected: self.geometry.data_bytes_per_chunk,
                    actual: buf.len(),
                });
            }
            if self.controller_ecc {
                let (first, second) = ecc_halves(buf)?;
                spare.ecc1 = HammingEcc.calc(first);
                spare.ecc2 = HammingEcc.calc(second);
            }
            let start = self.data_range(idx).start;
            for (stored, &b) in self.data[start..start + buf.len()].iter_mut().zip(buf) {
                *stored &= b;
            }
        }

        for (stored, b) in self.spares[idx].iter_mut().zip(spare.to_bytes()) {
            *stored &= b;
        }
        self.counters.writes += 1;
        Ok(())
    }

    fn read_chunk(&mut self, chunk: u32, data: Option<&mut [u8]>, spare: &mut Spare) -> Result<()> {
        let idx = self
            .check_chunk(chunk)
            .map_err(|reason| Error::DriverRead { chunk, reason })?;
        if self.failing_reads.contains(&chunk) {
            return Err(Error::DriverRead {
                chunk,
                reason: "injected read failure".to_string(),
            });
        }

        if let Some(buf) = data {
            let stored = &self.data[self.data_range(idx)];
            let n = buf.len().min(stored.len());
            buf[..n].copy_from_slice(&stored[..n]);
        }
        *spare = Spare::from_bytes(&self.spares[idx]);
        self.counters.reads += 1;
        Ok(())
    }

    fn read_chunk_hw(
        &mut self,
        chunk: u32,
        mut data: Option<&mut [u8]>,
        spare: &mut NandSpare,
    ) -> Result<()> {
        self.read_chunk(chunk, data.as_deref_mut(), &mut spare.spare)?;
        spare.eccres1 = Correction::NoError;
        spare.eccres2 = Correction::NoError;

        let Some(buf) = data else {
            return Ok(());
        };
        if !self.controller_ecc || buf.len() < 2 * ECC_BLOCK_SIZE {
            return Ok(());
        }

        let (first, rest) = buf.split_at_mut(ECC_BLOCK_SIZE);
        let halves: [(&mut [u8], [u8; 3]); 2] = [
            (first, spare.spare.ecc1),
            (&mut rest[..ECC_BLOCK_SIZE], spare.spare.ecc2),
        ];
        let mut results = [Correction::NoError; 2];
        for (result, (half, stored)) in results.iter_mut().zip(halves) {
            if let Ok(block) = <&mut [u8; ECC_BLOCK_SIZE]>::try_from(half) {
                let calc = HammingEcc.calc(block);
                let mut stored = stored;
                *result = HammingEcc.correct(block, &mut stored, &calc);
            }
        }
        spare.eccres1 = results[0];
        spare.eccres2 = results[1];
        Ok(())
    }
}
