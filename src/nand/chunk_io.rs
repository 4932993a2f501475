//! Chunk I/O
//!
//! Raw chunk reads and writes through the driver, with the data-area ECC
//! path applied on read:
//!
//! ```text
//!            ┌─────────────── use_nand_ecc = false ───────────────┐
//! read ──────┤  driver.read_chunk → HammingEcc per half → counters │──┐
//!            └────────────────────────────────────────────────────┘  │
//!            ┌─────────────── use_nand_ecc = true ────────────────┐  ├─▶ EccResult
//!            │  driver.read_chunk_hw → per-half results reported  │──┘
//!            └────────────────────────────────────────────────────┘
//!                         any half not clean ─▶ block flagged for retirement
//! ```

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::ecc::{Correction, DataEcc, ECC_BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::nand::device::{Device, NandDriver};
use crate::nand::spare::{NandSpare, Spare};

/// Data ECC outcome of a chunk read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EccResult {
    /// No correction was attempted
    #[default]
    Unknown,
    NoError,
    Fixed,
    Unfixed,
}

impl EccResult {
    /// Combine the outcomes of the two halves: unfixed wins over fixed.
    pub fn from_halves(first: Correction, second: Correction) -> Self {
        match (first, second) {
            (Correction::Unfixed, _) | (_, Correction::Unfixed) => EccResult::Unfixed,
            (Correction::Fixed, _) | (_, Correction::Fixed) => EccResult::Fixed,
            _ => EccResult::NoError,
        }
    }
}

/// Split a data area into the two ECC-protected 256-byte halves.
pub(crate) fn ecc_halves(data: &[u8]) -> Result<(&[u8; ECC_BLOCK_SIZE], &[u8; ECC_BLOCK_SIZE])> {
    let too_short = || Error::InvalidBuffer {
        expected: 2 * ECC_BLOCK_SIZE,
        actual: data.len(),
    };
    let first = data.get(..ECC_BLOCK_SIZE).ok_or_else(too_short)?;
    let second = data
        .get(ECC_BLOCK_SIZE..2 * ECC_BLOCK_SIZE)
        .ok_or_else(too_short)?;
    // lengths checked by the slicing above
    Ok((
        first.try_into().map_err(|_| too_short())?,
        second.try_into().map_err(|_| too_short())?,
    ))
}

fn ecc_halves_mut(
    data: &mut [u8],
) -> Result<(&mut [u8; ECC_BLOCK_SIZE], &mut [u8; ECC_BLOCK_SIZE])> {
    let actual = data.len();
    let too_short = || Error::InvalidBuffer {
        expected: 2 * ECC_BLOCK_SIZE,
        actual,
    };
    if actual < 2 * ECC_BLOCK_SIZE {
        return Err(too_short());
    }
    let (first, rest) = data.split_at_mut(ECC_BLOCK_SIZE);
    Ok((
        first.try_into().map_err(|_| too_short())?,
        (&mut rest[..ECC_BLOCK_SIZE])
            .try_into()
            .map_err(|_| too_short())?,
    ))
}

fn log_half(chunk: u32, half: u8, result: Correction, source: &'static str) {
    match result {
        Correction::Fixed => warn!(chunk, half, source, "data ecc error fixed"),
        Correction::Unfixed => error!(chunk, half, source, "data ecc error unfixed"),
        Correction::NoError => {}
    }
}

impl<D: NandDriver, E: DataEcc> Device<D, E> {
    /// Compute both data ECC codes of `data` into the spare.
    pub(crate) fn calc_data_ecc(&self, data: &[u8], spare: &mut Spare) -> Result<()> {
        let (first, second) = ecc_halves(data)?;
        spare.ecc1 = self.ecc.calc(first);
        spare.ecc2 = self.ecc.calc(second);
        Ok(())
    }

    /// Write a chunk, refusing chunks in the reserved region.
    pub(crate) fn write_nand(&mut self, chunk: u32, data: Option<&[u8]>, spare: &Spare) -> Result<()> {
        let first_valid = self.config.first_valid_chunk();
        if chunk < first_valid {
            error!(chunk, first_valid, "chunk is not valid");
            return Err(Error::ChunkOutOfRange { chunk, first_valid });
        }
        debug!(chunk, with_data = data.is_some(), "write chunk");
        self.driver.write_chunk(chunk, data, spare)
    }

    /// Read a chunk, optionally running the data ECC path.
    ///
    /// The outcome is `Unknown` when no data was requested or correction was
    /// not asked for.
    pub(crate) fn read_nand(
        &mut self,
        chunk: u32,
        mut data: Option<&mut [u8]>,
        spare: &mut Spare,
        correct: bool,
    ) -> Result<EccResult> {
        debug!(chunk, with_data = data.is_some(), correct, "read chunk");

        let halves = if !self.config.use_nand_ecc {
            self.driver.read_chunk(chunk, data.as_deref_mut(), spare)?;
            match data {
                Some(buf) if correct => {
                    let (r1, r2) = self.correct_halves(buf, spare)?;
                    for (half, result) in [(0u8, r1), (1u8, r2)] {
                        log_half(chunk, half, result, "software");
                        match result {
                            Correction::Fixed => self.stats.ecc_fixed += 1,
                            Correction::Unfixed => self.stats.ecc_unfixed += 1,
                            Correction::NoError => {}
                        }
                    }
                    Some((r1, r2))
                }
                _ => None,
            }
        } else {
            let mut nspare = NandSpare::default();
            let with_data = data.is_some();
            self.driver.read_chunk_hw(chunk, data, &mut nspare)?;
            *spare = nspare.spare;
            if with_data && correct {
                // the controller keeps its own accounting
                log_half(chunk, 0, nspare.eccres1, "controller");
                log_half(chunk, 1, nspare.eccres2, "controller");
                Some((nspare.eccres1, nspare.eccres2))
            } else {
                None
            }
        };

        let Some((r1, r2)) = halves else {
            return Ok(EccResult::Unknown);
        };
        if r1 != Correction::NoError || r2 != Correction::NoError {
            self.handle_read_data_error(chunk);
        }
        Ok(EccResult::from_halves(r1, r2))
    }

    fn correct_halves(&self, data: &mut [u8], spare: &mut Spare) -> Result<(Correction, Correction)> {
        let (first, second) = ecc_halves_mut(data)?;
        let calc1 = self.ecc.calc(first);
        let r1 = self.ecc.correct(first, &mut spare.ecc1, &calc1);
        let calc2 = self.ecc.calc(second);
        let r2 = self.ecc.correct(second, &mut spare.ecc2, &calc2);
        Ok((r1, r2))
    }

    /// Flag the block holding `chunk` for retirement. Collection happens
    /// later; the current read is not affected.
    pub(crate) fn handle_read_data_error(&mut self, chunk: u32) {
        let block = chunk / self.config.chunks_per_block;
        let Some(internal) = block.checked_add(self.config.block_offset) else {
            warn!(block, "data error on block with no block-info index");
            return;
        };

        match self.block_info.get_mut(internal) {
            Some(info) => {
                info.needs_retiring = true;
                info!(block, internal, "block marked for retirement");
            }
            None => warn!(block, internal, "data error on block outside block-info table"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_halves() {
        use Correction::*;
        assert_eq!(EccResult::from_halves(NoError, NoError), EccResult::NoError);
        assert_eq!(EccResult::from_halves(Fixed, NoError), EccResult::Fixed);
        assert_eq!(EccResult::from_halves(NoError, Fixed), EccResult::Fixed);
        assert_eq!(EccResult::from_halves(Fixed, Unfixed), EccResult::Unfixed);
        assert_eq!(EccResult::from_halves(Unfixed, NoError), EccResult::Unfixed);
    }

    #[test]
    fn test_ecc_halves_short_buffer() {
        let data = [0u8; 300];
        assert!(matches!(
            ecc_halves(&data),
            Err(Error::InvalidBuffer {
                expected: 512,
                actual: 300
            })
        ));
    }

    #[test]
    fn test_ecc_halves_split() {
        let mut data = vec![0u8; 2048];
        data[0] = 1;
        data[256] = 2;
        data[600] = 9;
        let (first, second) = ecc_halves(&data).unwrap();
        assert_eq!(first[0], 1);
        assert_eq!(second[0], 2);

        let (a, b) = ecc_halves_mut(&mut data).unwrap();
        a[1] = 5;
        b[1] = 6;
        assert_eq!(data[1], 5);
        assert_eq!(data[257], 6);
    }
}
