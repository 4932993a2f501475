//! NAND Device Access
//!
//! Everything between the tags layer and the raw flash:
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────────┐   ┌──────────────────┐
//! │  tagscompat  │──▶│  Device (chunk_io.rs)  │──▶│  NandDriver      │
//! │              │   │  range check, data ECC │   │  (MemNand, ...)  │
//! └──────────────┘   │  counters, retirement  │   └──────────────────┘
//!                    └───────────────────────┘
//! ```
//!
//! - `spare.rs`: the 16-byte spare layout and its markers
//! - `device.rs`: the driver port, device context and block-info table
//! - `chunk_io.rs`: chunk reads and writes with the data ECC path
//! - `sim.rs`: a RAM-backed driver with fault injection

pub mod chunk_io;
pub mod device;
pub mod sim;
pub mod spare;

pub use chunk_io::EccResult;
pub use device::{BlockInfo, BlockInfoTable, Device, EccStats, NandDriver};
pub use sim::{MemNand, NandGeometry, SimCounters};
pub use spare::{
    tags_from_spare, NandSpare, Spare, BLOCK_STATUS_BAD, PAGE_STATUS_DELETED, SPARE_BYTES,
};
